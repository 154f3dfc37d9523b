//! Core engine of a low-code page builder.
//!
//! The component tree store keeps the document, the grid layout engine pushes
//! widgets out of each other's way, and the execution tree evaluates
//! `{{ expression }}` bindings in dependency order. Every mutation goes
//! through the serialized dispatch queue in [`runtime`].

pub mod action;
pub mod config;
pub mod error;
pub mod execution;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod tree;
pub mod widget;

pub use action::{ActionNode, ActionResult, ActionStore};
pub use config::EngineConfig;
pub use error::{CommandError, EngineError, EvalError, GridError, PathError, Result};
pub use execution::{
    DefaultEvaluator, ExecutionError, ExecutionTree, ExpressionEvaluator, GLOBAL_DATA, RenameKind,
    RenamePatches, change_display_name_helper,
};
pub use geometry::{LayoutInfo, PixelRect, Rect, UNIT_HEIGHT};
pub use layout::{LayoutItem, ReflowResult, get_reflow_result};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult};
pub use metrics::{MetricSnapshot, RuntimeMetrics};
pub use registry::DisplayNameRegistry;
pub use runtime::audit::{
    BufferedRuntimeAudit, NullRuntimeAudit, RuntimeAudit, RuntimeAuditEvent,
    RuntimeAuditEventBuilder, RuntimeAuditStage,
};
pub use runtime::diagnostics::{LifecycleLoggerListener, MetricsSnapshotListener};
pub use runtime::{
    Action, CanvasCursor, DispatchReport, EditorRuntime, EditorState, Listener, ListenerContext,
    RuntimeConfig, SelectionState,
};
pub use tree::{
    ComponentNode, ComponentStore, ComponentType, ContainerType, LayoutPatch, LayoutSlice,
    MutationOutcome, PropPath, PropSlice, Props, ROOT_DISPLAY_NAME, SectionName,
};
pub use widget::{CONTROL_PROTOCOL_VERSION, CommandEnvelope, ControllableWidget, WidgetCommand};
