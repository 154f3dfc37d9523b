//! Execution tree evaluator.
//!
//! Scans every string prop for `{{ }}` bindings, builds a node-level
//! dependency graph, and evaluates it dependencies first. Results, errors and
//! layout previews are a cache rebuilt from the component and action stores.

pub mod binding;
mod core;
pub mod expr;
pub mod graph;
mod rename;

pub use binding::{GLOBAL_DATA, RenameKind, TemplateSegment};
pub use core::{ExecutionError, ExecutionTree, SeedKind, SeedNode};
pub use expr::{DefaultEvaluator, EvalResult, ExpressionEvaluator, Scope};
pub use graph::{DependencyGraph, DependencyMap, EvaluationOrder};
pub use rename::{RenamePatches, change_display_name_helper};
