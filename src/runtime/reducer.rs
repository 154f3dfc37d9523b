use std::collections::BTreeSet;

use serde_json::json;

use super::action::Action;
use super::state::EditorState;
use crate::error::Result;
use crate::execution::GLOBAL_DATA;
use crate::logging::{LogLevel, Logger, RUNTIME_TARGET, emit, json_kv};
use crate::tree::{ComponentNode, LayoutPatch, MutationOutcome, PropSlice};
use crate::widget::ControllableWidget;

/// What the execution tree must do after a store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecSync {
    Nothing,
    Full,
    Partial(Vec<String>),
    Layout(Vec<String>),
}

#[derive(Debug)]
pub(crate) struct Reduction {
    pub sync: ExecSync,
    pub skipped: usize,
    /// Nodes repositioned by a reflow commit.
    pub reflowed: Option<usize>,
}

impl Reduction {
    fn new(sync: ExecSync) -> Self {
        Self {
            sync,
            skipped: 0,
            reflowed: None,
        }
    }

    fn skipping(mut self, outcomes: &[MutationOutcome]) -> Self {
        self.skipped += outcomes.iter().filter(|outcome| !outcome.is_applied()).count();
        self
    }
}

/// Apply one action to the stores.
pub(crate) fn reduce(state: &mut EditorState, action: &Action, logger: Option<&Logger>) -> Result<Reduction> {
    let reduction = match action {
        Action::InitTree(root) => {
            state.components.init_tree(root.clone())?;
            state.selection.clear();
            state.selection.reset_cursor();
            Reduction::new(ExecSync::Full)
        }
        Action::ResetComponents => {
            state.components.reset();
            state.selection.clear();
            state.selection.reset_cursor();
            Reduction::new(ExecSync::Full)
        }
        Action::AddComponent(nodes) => {
            if let Some(name) = action_name_clash(state, nodes) {
                return Ok(rejected(logger, action, format!("`{name}` is already an action")));
            }
            let outcomes = state.components.add_nodes(nodes.clone());
            Reduction::new(ExecSync::Full).skipping(&outcomes)
        }
        Action::AddPageNodes(nodes) => {
            if let Some(name) = action_name_clash(state, nodes) {
                return Ok(rejected(logger, action, format!("`{name}` is already an action")));
            }
            let outcomes = state.components.add_page_nodes_with_sort_order(nodes.clone());
            Reduction::new(ExecSync::Full).skipping(&outcomes)
        }
        Action::AddModalComponent { page, modal } => {
            if let Some(name) = action_name_clash(state, std::slice::from_ref(modal)) {
                return Ok(rejected(logger, action, format!("`{name}` is already an action")));
            }
            let outcome = state.components.add_modal_component(page, modal.clone());
            Reduction::new(ExecSync::Full).skipping(&[outcome])
        }
        Action::DeleteComponents(names) => {
            let released = state.components.delete_nodes(names);
            released_reduction(state, released)
        }
        Action::DeletePage(name) => {
            let released = state.components.delete_page_node(name);
            released_reduction(state, released)
        }
        Action::SortChildren { parent, order } => {
            let outcome = state.components.sort_children(parent, order.clone());
            Reduction::new(ExecSync::Nothing).skipping(&[outcome])
        }
        Action::UpdateProps { display_name, slice } => {
            let outcome = state.components.update_props(display_name, slice);
            state.execution.clear_override_keys(display_name, slice.keys().map(String::as_str));
            Reduction::new(partial(state, [display_name.clone()])).skipping(&[outcome])
        }
        Action::UpdateMultiProps(updates) => {
            let outcomes = state.components.update_multi_props(updates);
            for (name, slice) in updates {
                state.execution.clear_override_keys(name, slice.keys().map(String::as_str));
            }
            let names = updates.iter().map(|(name, _)| name.clone());
            Reduction::new(partial(state, names)).skipping(&outcomes)
        }
        Action::BatchUpdateSliceProps(slices) => {
            let outcomes = state.components.batch_update_slice_props(slices);
            clear_slice_overrides(state, slices);
            let names = slices.iter().map(|slice| slice.display_name.clone());
            Reduction::new(partial(state, names)).skipping(&outcomes)
        }
        Action::UpdateRootProps(props) => {
            let outcome = state.components.update_root_props(props);
            let root = root_names(state);
            for name in &root {
                state.execution.clear_override_keys(name, props.keys().map(String::as_str));
            }
            Reduction::new(partial(state, root)).skipping(&[outcome])
        }
        Action::UpdateTargetPageProps { page, props } => {
            let outcome = state.components.update_target_page_props(page, props);
            state.execution.clear_override_keys(page, props.keys().map(String::as_str));
            Reduction::new(partial(state, [page.clone()])).skipping(&[outcome])
        }
        Action::UpdateSectionViewProps { parent, props } => {
            let outcome = state.components.update_section_view_props(parent, props);
            state.execution.clear_override_keys(parent, props.keys().map(String::as_str));
            Reduction::new(partial(state, [parent.clone()])).skipping(&[outcome])
        }
        Action::UpdateContainer {
            old_parent,
            new_parent,
            slices,
        } => {
            let outcomes = state.components.reparent(old_parent, new_parent, slices);
            Reduction::new(ExecSync::Full).skipping(&outcomes)
        }
        Action::UpdateLayoutInfo { display_name, patch } => {
            let outcome = state.components.update_layout_info(display_name, *patch);
            Reduction::new(ExecSync::Layout(vec![display_name.clone()])).skipping(&[outcome])
        }
        Action::BatchUpdateLayoutInfo(patches) => layout_batch(state, patches),
        Action::BatchUpdateLayoutInfoWhenReflow(patches) => {
            let mut reduction = layout_batch(state, patches);
            reduction.reflowed = Some(patches.len());
            reduction
        }
        Action::UpdateReflow { parent, child_nodes } => {
            let outcome = state.components.update_reflow(parent, child_nodes);
            let names = child_nodes.iter().map(|slice| slice.display_name.clone()).collect();
            let mut reduction = Reduction::new(ExecSync::Layout(names)).skipping(&[outcome]);
            reduction.reflowed = Some(child_nodes.len());
            reduction
        }
        Action::UpdateNodeHeight {
            display_name, height, ..
        } => {
            let outcome = state.components.update_node_height(display_name, *height);
            Reduction::new(ExecSync::Layout(vec![display_name.clone()])).skipping(&[outcome])
        }
        Action::PreviewLayout { display_name, info } => {
            if state.components.contains(display_name) {
                state.execution.preview_layout(display_name, *info);
                Reduction::new(ExecSync::Nothing)
            } else {
                rejected(logger, action, format!("`{display_name}` not found"))
            }
        }
        Action::CommitPreview(display_name) => match state.execution.take_preview(display_name) {
            Some(rect) => {
                let outcome = state
                    .components
                    .update_layout_info(display_name, LayoutPatch::from(rect));
                Reduction::new(ExecSync::Layout(vec![display_name.clone()])).skipping(&[outcome])
            }
            None => rejected(logger, action, format!("no preview for `{display_name}`")),
        },
        Action::Rename {
            display_name,
            new_display_name,
        } => {
            if state.actions.contains(new_display_name) {
                return Ok(rejected(logger, action, format!("`{new_display_name}` is already an action")));
            }
            let outcome = state.components.rename(display_name, new_display_name);
            if outcome.is_applied() {
                state.execution.rename_entry(display_name, new_display_name);
                state.selection.rename(display_name, new_display_name);
            }
            let names = [display_name.clone(), new_display_name.clone()];
            Reduction::new(partial(state, names)).skipping(&[outcome])
        }
        Action::AddSection { page, section } => {
            let outcome = state.components.add_target_page_section(page, *section);
            Reduction::new(ExecSync::Full).skipping(&[outcome])
        }
        Action::DeleteSection { page, section } => {
            let released = state.components.delete_target_page_section(page, *section);
            released_reduction(state, released)
        }
        Action::AddSectionView { parent, section_name } => {
            let outcome = state.components.add_section_view(parent, section_name);
            Reduction::new(ExecSync::Full).skipping(&[outcome])
        }
        Action::DeleteSectionView(view) => {
            let released = state.components.delete_section_view(view);
            released_reduction(state, released)
        }
        Action::UpdateViewportSize {
            width,
            height,
            size_type,
        } => {
            let outcome = state
                .components
                .update_viewport_size(*width, *height, size_type.clone());
            let root = root_names(state);
            Reduction::new(partial(state, root)).skipping(&[outcome])
        }
        Action::SetGlobalState { key, value, old_key } => {
            let outcome = state
                .components
                .set_global_state(key, value.clone(), old_key.as_deref());
            let root = root_names(state);
            Reduction::new(partial(state, root)).skipping(&[outcome])
        }
        Action::DeleteGlobalState(key) => {
            let outcome = state.components.delete_global_state(key);
            let root = root_names(state);
            Reduction::new(partial(state, root)).skipping(&[outcome])
        }
        Action::AddAction(node) => {
            if state.components.contains(&node.display_name) {
                let reason = format!("`{}` is already a component", node.display_name);
                return Ok(rejected(logger, action, reason));
            }
            let outcome = state.actions.add(node.clone());
            Reduction::new(ExecSync::Full).skipping(&[outcome])
        }
        Action::RemoveAction(name) => match state.actions.remove(name) {
            Some(_) => Reduction::new(ExecSync::Full),
            None => rejected(logger, action, format!("action `{name}` not found")),
        },
        Action::UpdateActionProps { display_name, slice } => {
            let outcome = state.actions.update_props(display_name, slice);
            state.execution.clear_override_keys(display_name, slice.keys().map(String::as_str));
            Reduction::new(ExecSync::Partial(vec![display_name.clone()])).skipping(&[outcome])
        }
        Action::BatchUpdateActionSliceProps(slices) => {
            let outcomes = state.actions.batch_update_slice_props(slices);
            clear_slice_overrides(state, slices);
            let names = slices.iter().map(|slice| slice.display_name.clone()).collect();
            Reduction::new(ExecSync::Partial(names)).skipping(&outcomes)
        }
        Action::RenameAction {
            display_name,
            new_display_name,
        } => {
            if state.components.contains(new_display_name) {
                return Ok(rejected(logger, action, format!("`{new_display_name}` is already a component")));
            }
            let outcome = state.actions.rename(display_name, new_display_name);
            if outcome.is_applied() {
                state.execution.rename_entry(display_name, new_display_name);
            }
            let names = vec![display_name.clone(), new_display_name.clone()];
            Reduction::new(ExecSync::Partial(names)).skipping(&[outcome])
        }
        Action::ActionRunCompleted { display_name, result } => {
            let outcome = state.actions.complete_run(display_name, result.clone());
            if outcome.is_applied() {
                Reduction::new(ExecSync::Partial(vec![display_name.clone()]))
            } else {
                Reduction::new(ExecSync::Nothing).skipping(&[outcome])
            }
        }
        // Overrides are re-applied on evaluation, so dependents see them too.
        Action::UpdateExecution { display_name, values } => {
            state.execution.update_execution_by_display_name(display_name, values);
            Reduction::new(partial(state, [display_name.clone()]))
        }
        Action::WidgetCommand { display_name, command } => {
            let values = match state.components.get(display_name) {
                Some(node) => node.control(command),
                None => return Ok(rejected(logger, action, format!("`{display_name}` not found"))),
            };
            match values {
                Ok(values) => {
                    state.execution.update_execution_by_display_name(display_name, &values);
                    Reduction::new(partial(state, [display_name.clone()]))
                }
                Err(err) => rejected(logger, action, err.to_string()),
            }
        }
        Action::Select(names) => {
            let components = &state.components;
            let existing: Vec<String> = names
                .iter()
                .filter(|name| components.contains(name))
                .cloned()
                .collect();
            state.selection.select(existing);
            Reduction::new(ExecSync::Nothing)
        }
        Action::SetCursor(cursor) => {
            state.selection.set_cursor(cursor.clone());
            Reduction::new(ExecSync::Nothing)
        }
        Action::ResetCursor => {
            state.selection.reset_cursor();
            Reduction::new(ExecSync::Nothing)
        }
    };
    Ok(reduction)
}

/// Bring the execution tree in line with the stores. Returns `Some(full)`
/// when an evaluation pass ran.
pub(crate) fn sync_execution(state: &mut EditorState, sync: &ExecSync) -> Option<bool> {
    match sync {
        ExecSync::Nothing => None,
        ExecSync::Full => {
            state.execution.evaluate(&state.components, &state.actions);
            Some(true)
        }
        ExecSync::Partial(names) => {
            state.execution.update(&state.components, &state.actions, names);
            Some(false)
        }
        ExecSync::Layout(names) => {
            for name in names {
                if let Some(node) = state.components.get(name) {
                    state.execution.sync_layout(name, node.rect());
                }
            }
            None
        }
    }
}

fn released_reduction(state: &mut EditorState, released: Vec<String>) -> Reduction {
    if released.is_empty() {
        return Reduction {
            skipped: 1,
            ..Reduction::new(ExecSync::Nothing)
        };
    }
    let gone: BTreeSet<&str> = released.iter().map(String::as_str).collect();
    state.selection.retain(|name| !gone.contains(name));
    Reduction::new(ExecSync::Full)
}

/// Components and actions share one name space in bindings.
fn action_name_clash(state: &EditorState, nodes: &[ComponentNode]) -> Option<String> {
    nodes
        .iter()
        .flat_map(ComponentNode::subtree_names)
        .find(|name| state.actions.contains(name))
}

fn layout_batch(state: &mut EditorState, patches: &[(String, LayoutPatch)]) -> Reduction {
    let outcomes = state.components.batch_update_layout_info(patches);
    let names = patches.iter().map(|(name, _)| name.clone()).collect();
    Reduction::new(ExecSync::Layout(names)).skipping(&outcomes)
}

fn clear_slice_overrides(state: &mut EditorState, slices: &[PropSlice]) {
    for slice in slices {
        let keys: Vec<&str> = slice.patches.iter().map(|(path, _)| path.root_key()).collect();
        state.execution.clear_override_keys(&slice.display_name, keys);
    }
}

fn root_names(state: &EditorState) -> Vec<String> {
    state
        .components
        .root_name()
        .map(|root| vec![root.to_string()])
        .unwrap_or_default()
}

/// Incremental re-evaluation of `names`; touching the root also refreshes
/// the global data seed.
fn partial<I>(state: &EditorState, names: I) -> ExecSync
where
    I: IntoIterator<Item = String>,
{
    let root = state.components.root_name();
    let mut touched: Vec<String> = Vec::new();
    for name in names {
        if root == Some(name.as_str()) && !touched.iter().any(|n| n == GLOBAL_DATA) {
            touched.push(GLOBAL_DATA.to_string());
        }
        touched.push(name);
    }
    ExecSync::Partial(touched)
}

fn rejected(logger: Option<&Logger>, action: &Action, reason: String) -> Reduction {
    emit(
        logger,
        LogLevel::Warn,
        RUNTIME_TARGET,
        "action_rejected",
        [
            json_kv("action", json!(action.name())),
            json_kv("reason", json!(reason)),
        ],
    );
    Reduction {
        skipped: 1,
        ..Reduction::new(ExecSync::Nothing)
    }
}
