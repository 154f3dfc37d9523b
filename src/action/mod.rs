//! Data-source actions and their last known results.

mod core;

pub use core::{ActionNode, ActionResult, ActionStore};
