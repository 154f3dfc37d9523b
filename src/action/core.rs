use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::logging::{ACTION_TARGET, LogLevel, Logger, emit, json_kv};
use crate::tree::{MutationOutcome, PropSlice, Props, path};

/// Result delivered by the external action runner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(data: Value) -> Self {
        Self { data, error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            data: Value::Null,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub display_name: String,
    pub action_type: String,
    #[serde(default)]
    pub props: Props,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ActionResult>,
}

impl ActionNode {
    pub fn new(display_name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            action_type: action_type.into(),
            props: Props::new(),
            last_result: None,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = crate::tree::props_of(props);
        self
    }

    /// `data` and `error` from the last run. These are plain values: a
    /// response that happens to contain `{{ }}` is never evaluated.
    pub fn run_values(&self) -> Props {
        let mut values = Props::new();
        let result = self.last_result.clone().unwrap_or_default();
        values.insert("data".into(), result.data);
        values.insert("error".into(), json!(result.error));
        values
    }
}

/// Action list keyed by display name.
#[derive(Debug, Default)]
pub struct ActionStore {
    actions: BTreeMap<String, ActionNode>,
    logger: Option<Logger>,
}

impl ActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    pub fn get(&self, display_name: &str) -> Option<&ActionNode> {
        self.actions.get(display_name)
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.actions.contains_key(display_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionNode> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn add(&mut self, action: ActionNode) -> MutationOutcome {
        if self.actions.contains_key(&action.display_name) {
            return self.skip("add_action", format!("`{}` already exists", action.display_name));
        }
        self.actions.insert(action.display_name.clone(), action);
        MutationOutcome::Applied
    }

    pub fn remove(&mut self, display_name: &str) -> Option<ActionNode> {
        let removed = self.actions.remove(display_name);
        if removed.is_none() {
            self.skip("remove_action", format!("`{display_name}` not found"));
        }
        removed
    }

    pub fn rename(&mut self, old: &str, new: &str) -> MutationOutcome {
        if self.actions.contains_key(new) {
            return self.skip("rename_action", format!("`{new}` already exists"));
        }
        let Some(mut action) = self.actions.remove(old) else {
            return self.skip("rename_action", format!("`{old}` not found"));
        };
        action.display_name = new.to_string();
        self.actions.insert(new.to_string(), action);
        MutationOutcome::Applied
    }

    pub fn update_props(&mut self, display_name: &str, slice: &Props) -> MutationOutcome {
        let Some(action) = self.actions.get_mut(display_name) else {
            return self.skip("update_action", format!("`{display_name}` not found"));
        };
        match path::merge_update_slice(&mut action.props, slice) {
            Ok(()) => MutationOutcome::Applied,
            Err(err) => self.skip("update_action", format!("`{display_name}`: {err}")),
        }
    }

    pub fn batch_update_slice_props(&mut self, slices: &[PropSlice]) -> Vec<MutationOutcome> {
        slices
            .iter()
            .map(|slice| {
                let name = slice.display_name.as_str();
                let Some(action) = self.actions.get(name) else {
                    return self.skip("update_action_slice", format!("`{name}` not found"));
                };
                let mut next = action.props.clone();
                for (prop_path, value) in &slice.patches {
                    if let Err(err) = path::set(&mut next, prop_path, value.clone()) {
                        return self.skip("update_action_slice", format!("`{name}`: {err}"));
                    }
                }
                if let Some(action) = self.actions.get_mut(name) {
                    action.props = next;
                }
                MutationOutcome::Applied
            })
            .collect()
    }

    /// Record a finished run. Completions for actions deleted meanwhile are dropped.
    pub fn complete_run(&mut self, display_name: &str, result: ActionResult) -> MutationOutcome {
        match self.actions.get_mut(display_name) {
            Some(action) => {
                action.last_result = Some(result);
                MutationOutcome::Applied
            }
            None => self.skip("complete_run", format!("`{display_name}` no longer exists")),
        }
    }

    fn skip(&self, op: &str, reason: String) -> MutationOutcome {
        emit(
            self.logger.as_ref(),
            LogLevel::Warn,
            ACTION_TARGET,
            "mutation_skipped",
            [json_kv("op", json!(op)), json_kv("reason", json!(reason))],
        );
        MutationOutcome::Skipped(reason)
    }
}
