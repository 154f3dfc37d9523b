//! Serialized dispatch queue over the component, action and execution stores.
//!
//! Every mutation goes through [`EditorRuntime::dispatch`]. Each queued action
//! runs `before_reduce` on every listener, is reduced into the stores, brings
//! the execution tree up to date, then runs `after_reduce`. Follow-up actions
//! that listeners queue are processed in FIFO order before `dispatch` returns.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::execution::{ExecutionTree, ExpressionEvaluator};
use crate::logging::{LogLevel, Logger, RUNTIME_TARGET, event_with_fields, json_kv};
use crate::metrics::{MetricSnapshot, RuntimeMetrics};

mod action;
pub mod audit;
pub mod diagnostics;
pub mod listeners;
mod reducer;
mod selection;
mod state;

pub use action::Action;
pub use selection::{CanvasCursor, SelectionState};
pub use state::EditorState;

use audit::{NullRuntimeAudit, RuntimeAudit, RuntimeAuditEventBuilder, RuntimeAuditStage};
use reducer::ExecSync;

/// Configuration knobs for the dispatch runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    /// Optional structured logger shared with every store.
    pub logger: Option<Logger>,
    /// Metrics accumulator used for periodic snapshots.
    pub metrics: Option<Arc<Mutex<RuntimeMetrics>>>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    pub metrics_target: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(5),
            metrics_target: "builder::runtime.metrics".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_engine(engine: EngineConfig) -> Self {
        Self {
            engine,
            ..Self::default()
        }
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(RuntimeMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<RuntimeMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Read-only view handed to listeners. Follow-ups are queued, never applied inline.
pub struct ListenerContext<'a> {
    state: &'a EditorState,
    dispatched: Vec<Action>,
}

impl<'a> ListenerContext<'a> {
    fn new(state: &'a EditorState) -> Self {
        Self {
            state,
            dispatched: Vec::new(),
        }
    }

    pub fn state(&self) -> &'a EditorState {
        self.state
    }

    /// Queue a follow-up; it runs after the current action finishes.
    pub fn dispatch(&mut self, action: Action) {
        self.dispatched.push(action);
    }

    fn into_dispatched(self) -> Vec<Action> {
        self.dispatched
    }
}

/// Reaction to dispatched actions, expressed as follow-up actions.
pub trait Listener: Send {
    fn name(&self) -> &str {
        "listener"
    }

    /// Runs against the state as it was before `action` is reduced.
    fn before_reduce(&mut self, _ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        Ok(())
    }

    fn after_reduce(&mut self, _ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Before,
    After,
}

/// Summary of one settled dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Names of every processed action, the dispatched one first.
    pub processed: Vec<&'static str>,
    pub skipped: usize,
}

impl DispatchReport {
    pub fn follow_ups(&self) -> usize {
        self.processed.len().saturating_sub(1)
    }
}

pub struct EditorRuntime {
    state: EditorState,
    listeners: Vec<Box<dyn Listener>>,
    config: RuntimeConfig,
    audit: Arc<dyn RuntimeAudit>,
    started_at: Instant,
    last_metrics_emit: Option<Instant>,
}

impl EditorRuntime {
    /// A runtime with no listeners registered.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_execution(config, ExecutionTree::new())
    }

    /// A runtime with the built-in change-propagation listeners.
    pub fn with_default_listeners(config: RuntimeConfig) -> Self {
        let logger = config.logger.clone();
        let mut runtime = Self::new(config);
        for listener in listeners::default_listeners(logger) {
            runtime.push_listener(listener);
        }
        runtime
    }

    pub fn with_evaluator(config: RuntimeConfig, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        Self::with_execution(config, ExecutionTree::with_evaluator(evaluator))
    }

    fn with_execution(config: RuntimeConfig, execution: ExecutionTree) -> Self {
        let mut state = EditorState::with_execution(execution);
        state.set_logger(config.logger.clone());
        let runtime = Self {
            state,
            listeners: Vec::new(),
            config,
            audit: Arc::new(NullRuntimeAudit),
            started_at: Instant::now(),
            last_metrics_emit: None,
        };
        runtime.log_runtime_event(
            LogLevel::Info,
            "runtime_constructed",
            [json_kv("max_cascade", json!(runtime.config.engine.max_cascade))],
        );
        runtime
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.state.set_logger(logger.clone());
        self.config.logger = logger;
    }

    pub fn set_audit(&mut self, audit: Arc<dyn RuntimeAudit>) {
        self.audit = audit;
        self.audit_stage(RuntimeAuditStage::RuntimeConstructed, [
            ("listeners".to_string(), json!(self.listeners.len())),
        ]);
    }

    pub fn register_listener<L>(&mut self, listener: L)
    where
        L: Listener + 'static,
    {
        self.push_listener(Box::new(listener));
    }

    fn push_listener(&mut self, listener: Box<dyn Listener>) {
        let name = listener.name().to_string();
        self.listeners.push(listener);
        self.audit_stage(RuntimeAuditStage::ListenerRegistered, [("listener".to_string(), json!(name))]);
        self.log_runtime_event(LogLevel::Debug, "listener_registered", [json_kv("listener", json!(name))]);
    }

    pub fn listener_names(&self) -> Vec<&str> {
        self.listeners.iter().map(|listener| listener.name()).collect()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    /// Register an environment constant and re-evaluate every binding.
    pub fn set_env(&mut self, name: impl Into<String>, value: Value) {
        self.state.execution.set_env(name, value);
        self.state
            .execution
            .evaluate(&self.state.components, &self.state.actions);
    }

    /// Execution nodes whose content changed since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<String> {
        self.state.execution.take_dirty()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.config.metrics.as_ref()?;
        let guard = metrics.lock().ok()?;
        Some(guard.snapshot(self.started_at.elapsed()))
    }

    /// Apply `action` and every follow-up it causes.
    ///
    /// Fails with [`EngineError::CascadeOverflow`] once more than
    /// `max_cascade` follow-ups have been processed; everything reduced up to
    /// that point stays applied.
    pub fn dispatch(&mut self, action: Action) -> Result<DispatchReport> {
        let max_cascade = self.config.engine.max_cascade;
        let mut queue = VecDeque::from([action]);
        let mut report = DispatchReport::default();

        while let Some(action) = queue.pop_front() {
            if report.processed.len() > max_cascade {
                self.audit_stage(RuntimeAuditStage::CascadeOverflow, [
                    ("action".to_string(), json!(action.name())),
                    ("pending".to_string(), json!(queue.len() + 1)),
                ]);
                self.log_runtime_event(
                    LogLevel::Error,
                    "cascade_overflow",
                    [
                        json_kv("max_cascade", json!(max_cascade)),
                        json_kv("action", json!(action.name())),
                    ],
                );
                return Err(EngineError::CascadeOverflow(max_cascade));
            }

            self.run_listeners(Phase::Before, &action, &mut queue)?;
            let logger = self.config.logger.clone();
            let reduction = reducer::reduce(&mut self.state, &action, logger.as_ref())?;
            let evaluated = reducer::sync_execution(&mut self.state, &reduction.sync);
            self.record_reduction_metrics(&reduction, evaluated);
            self.audit_stage(RuntimeAuditStage::ActionReduced, [
                ("action".to_string(), json!(action.name())),
                ("skipped".to_string(), json!(reduction.skipped)),
            ]);
            if let Some(full) = evaluated {
                self.audit_stage(RuntimeAuditStage::ExecutionSynced, [("full".to_string(), json!(full))]);
            }
            self.run_listeners(Phase::After, &action, &mut queue)?;

            report.processed.push(action.name());
            report.skipped += reduction.skipped;
        }

        self.record_dispatch_metric(report.follow_ups());
        self.audit_stage(RuntimeAuditStage::DispatchCompleted, [
            ("processed".to_string(), json!(report.processed.len())),
            ("skipped".to_string(), json!(report.skipped)),
        ]);
        self.log_runtime_event(
            LogLevel::Debug,
            "action_dispatched",
            [
                json_kv("action", json!(report.processed.first().copied().unwrap_or_default())),
                json_kv("follow_ups", json!(report.follow_ups())),
                json_kv("skipped", json!(report.skipped)),
            ],
        );
        self.maybe_emit_metrics();
        Ok(report)
    }

    fn run_listeners(&mut self, phase: Phase, action: &Action, queue: &mut VecDeque<Action>) -> Result<()> {
        for idx in 0..self.listeners.len() {
            let (listener_name, dispatched) = {
                let listener = &mut self.listeners[idx];
                let mut ctx = ListenerContext::new(&self.state);
                match phase {
                    Phase::Before => listener.before_reduce(&mut ctx, action)?,
                    Phase::After => listener.after_reduce(&mut ctx, action)?,
                }
                (listener.name().to_string(), ctx.into_dispatched())
            };
            for follow_up in dispatched {
                self.audit_stage(RuntimeAuditStage::FollowUpQueued, [
                    ("listener".to_string(), json!(listener_name)),
                    ("action".to_string(), json!(follow_up.name())),
                ]);
                queue.push_back(follow_up);
            }
        }
        Ok(())
    }

    fn audit_stage<I>(&self, stage: RuntimeAuditStage, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut builder = RuntimeAuditEventBuilder::new(stage);
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.audit.record(builder.finish());
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, RUNTIME_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn record_reduction_metrics(&self, reduction: &reducer::Reduction, evaluated: Option<bool>) {
        let Some(metrics) = self.config.metrics.as_ref() else {
            return;
        };
        if let Ok(mut guard) = metrics.lock() {
            guard.record_skipped(reduction.skipped);
            if let Some(moved) = reduction.reflowed {
                guard.record_reflow(moved);
            }
            if let Some(full) = evaluated {
                let nodes = match &reduction.sync {
                    ExecSync::Partial(names) => names.len(),
                    _ => self.state.execution.seeds().len(),
                };
                guard.record_evaluation(full, nodes);
            }
        }
    }

    fn record_dispatch_metric(&self, follow_ups: usize) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_dispatch(follow_ups);
            }
        }
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics.is_none() || self.config.metrics_interval == Duration::from_millis(0) {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => return,
            _ => self.last_metrics_emit = Some(now),
        }

        if let (Some(logger), Some(metrics)) = (self.config.logger.as_ref(), self.config.metrics.as_ref()) {
            if let Ok(guard) = metrics.lock() {
                let event = guard
                    .snapshot(now.duration_since(self.started_at))
                    .to_log_event(&self.config.metrics_target);
                let _ = logger.log_event(event);
            }
        }
    }
}
