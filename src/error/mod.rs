//! Error types shared across the builder core.

mod types;

pub use types::{CommandError, EngineError, EvalError, GridError, PathError, Result};
