use crate::action::ActionStore;
use crate::execution::ExecutionTree;
use crate::logging::Logger;
use crate::tree::ComponentStore;

use super::selection::SelectionState;

/// Everything the dispatch queue owns. Listeners only ever see it immutably.
#[derive(Debug, Default)]
pub struct EditorState {
    pub(crate) components: ComponentStore,
    pub(crate) actions: ActionStore,
    pub(crate) execution: ExecutionTree,
    pub(crate) selection: SelectionState,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_execution(execution: ExecutionTree) -> Self {
        Self {
            execution,
            ..Self::default()
        }
    }

    pub(crate) fn set_logger(&mut self, logger: Option<Logger>) {
        self.components.set_logger(logger.clone());
        self.actions.set_logger(logger.clone());
        self.execution.set_logger(logger);
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn actions(&self) -> &ActionStore {
        &self.actions
    }

    pub fn execution(&self) -> &ExecutionTree {
        &self.execution
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Evaluated props of a node, or `None` when the node is unknown.
    pub fn executed(&self, display_name: &str) -> Option<&serde_json::Value> {
        self.execution.get(display_name)
    }
}
