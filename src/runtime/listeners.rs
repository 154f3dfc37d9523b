//! Built-in change-propagation listeners.
//!
//! Each one reads the state it is handed and answers with follow-up actions.
//! Listeners that need the pre-mutation state capture it in `before_reduce`
//! and finish in `after_reduce`.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{Action, EditorState, Listener, ListenerContext};
use crate::error::Result;
use crate::execution::{RenameKind, RenamePatches, change_display_name_helper};
use crate::geometry::Rect;
use crate::layout::{self, LayoutItem};
use crate::logging::{LAYOUT_TARGET, LogLevel, Logger, emit, json_kv};
use crate::tree::{ContainerType, LayoutPatch, LayoutSlice, PropSlice, ROOT_DISPLAY_NAME, props_of};

/// Every built-in listener, in the order they should run.
pub fn default_listeners(logger: Option<Logger>) -> Vec<Box<dyn Listener>> {
    vec![
        Box::new(RenamePropagationListener::default()),
        Box::new(SelectRenamedListener),
        Box::new(PageDeletionListener::default()),
        Box::new(ViewDeletionListener::default()),
        Box::new(ReflowListener::new(logger)),
        Box::new(HeightReflowListener),
        Box::new(ViewportResetListener),
    ]
}

/// Index kept in the execution tree, falling back to the stored prop.
fn current_index(state: &EditorState, display_name: &str, key: &str) -> usize {
    state
        .execution()
        .get(display_name)
        .and_then(|props| props.get(key))
        .or_else(|| {
            state
                .components()
                .get(display_name)
                .and_then(|node| node.props.get(key))
        })
        .and_then(Value::as_u64)
        .map(|index| index as usize)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
enum PendingRename {
    Component { old: String, new: String, patches: RenamePatches },
    Action { old: String, new: String, patches: RenamePatches },
    GlobalKey { key: String, patches: RenamePatches },
}

/// Rewrites every binding that reads a renamed component, action or global
/// data key. Patches come from the dependency map as it stood before the
/// rename and are dispatched once the rename committed.
#[derive(Debug, Default)]
pub struct RenamePropagationListener {
    pending: Option<PendingRename>,
}

impl RenamePropagationListener {
    fn patches(state: &EditorState, old: &str, new: &str, kind: RenameKind) -> RenamePatches {
        let execution = state.execution();
        let root = state.components().root_name().unwrap_or(ROOT_DISPLAY_NAME);
        change_display_name_helper(execution.in_dependencies_map(), execution.seeds(), root, old, new, kind)
    }
}

/// A renamed reader's own slice must target its new name.
fn retarget(slices: Vec<PropSlice>, old: &str, new: &str) -> Vec<PropSlice> {
    slices
        .into_iter()
        .map(|mut slice| {
            if slice.display_name == old {
                slice.display_name = new.to_string();
            }
            slice
        })
        .collect()
}

impl Listener for RenamePropagationListener {
    fn name(&self) -> &str {
        "listeners.rename_propagation"
    }

    fn before_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        let state = ctx.state();
        self.pending = match action {
            Action::Rename {
                display_name,
                new_display_name,
            } if state.components().contains(display_name) => Some(PendingRename::Component {
                old: display_name.clone(),
                new: new_display_name.clone(),
                patches: Self::patches(state, display_name, new_display_name, RenameKind::DisplayName),
            }),
            Action::RenameAction {
                display_name,
                new_display_name,
            } if state.actions().contains(display_name) => Some(PendingRename::Action {
                old: display_name.clone(),
                new: new_display_name.clone(),
                patches: Self::patches(state, display_name, new_display_name, RenameKind::DisplayName),
            }),
            Action::SetGlobalState {
                key,
                old_key: Some(old_key),
                ..
            } if old_key != key => Some(PendingRename::GlobalKey {
                key: key.clone(),
                patches: Self::patches(state, old_key, key, RenameKind::GlobalDataKey),
            }),
            _ => None,
        };
        Ok(())
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let state = ctx.state();
        let patches = match pending {
            PendingRename::Component { old, new, patches } => {
                if state.components().contains(&old) || !state.components().contains(&new) {
                    return Ok(());
                }
                RenamePatches {
                    widget_slices: retarget(patches.widget_slices, &old, &new),
                    action_slices: patches.action_slices,
                }
            }
            PendingRename::Action { old, new, patches } => {
                if state.actions().contains(&old) || !state.actions().contains(&new) {
                    return Ok(());
                }
                RenamePatches {
                    widget_slices: patches.widget_slices,
                    action_slices: retarget(patches.action_slices, &old, &new),
                }
            }
            PendingRename::GlobalKey { key, patches } => {
                let committed = state
                    .components()
                    .global_data()
                    .is_some_and(|data| data.contains_key(&key));
                if !committed {
                    return Ok(());
                }
                patches
            }
        };
        if !patches.widget_slices.is_empty() {
            ctx.dispatch(Action::BatchUpdateSliceProps(patches.widget_slices));
        }
        if !patches.action_slices.is_empty() {
            ctx.dispatch(Action::BatchUpdateActionSliceProps(patches.action_slices));
        }
        Ok(())
    }
}

/// Selects a renamed node when it is a resizable canvas widget.
#[derive(Debug, Default)]
pub struct SelectRenamedListener;

impl Listener for SelectRenamedListener {
    fn name(&self) -> &str {
        "listeners.select_renamed"
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        if let Action::Rename { new_display_name, .. } = action {
            let scalable = ctx
                .state()
                .components()
                .get(new_display_name)
                .is_some_and(|node| node.container_type == ContainerType::EditorScaleSquare);
            if scalable {
                ctx.dispatch(Action::Select(vec![new_display_name.clone()]));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PendingPageDelete {
    deleted: String,
    active_page: Option<String>,
    was_homepage: bool,
}

/// Keeps the homepage pointer and the active page index valid after a page
/// is deleted.
#[derive(Debug, Default)]
pub struct PageDeletionListener {
    pending: Option<PendingPageDelete>,
}

impl Listener for PageDeletionListener {
    fn name(&self) -> &str {
        "listeners.page_deletion"
    }

    fn before_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        self.pending = None;
        let Action::DeletePage(deleted) = action else {
            return Ok(());
        };
        let components = ctx.state().components();
        let Some(root) = components.root_name() else {
            return Ok(());
        };
        let origin = components.page_sorted_key();
        let active = current_index(ctx.state(), root, "currentPageIndex");
        self.pending = Some(PendingPageDelete {
            deleted: deleted.clone(),
            active_page: origin.get(active).cloned(),
            was_homepage: components.homepage_display_name().as_deref() == Some(deleted.as_str()),
        });
        Ok(())
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let components = ctx.state().components();
        let Some(root) = components.root_name().map(str::to_string) else {
            return Ok(());
        };
        if components.contains(&pending.deleted) {
            return Ok(());
        }
        let sorted = components.page_sorted_key();
        let new_index = pending
            .active_page
            .as_ref()
            .and_then(|active| sorted.iter().position(|page| page == active))
            .unwrap_or(0);
        if pending.was_homepage {
            ctx.dispatch(Action::UpdateRootProps(props_of(json!({
                "currentPageIndex": 0,
                "homepageDisplayName": sorted.first().cloned().unwrap_or_default(),
            }))));
            if pending.active_page.as_deref() == Some(pending.deleted.as_str()) {
                return Ok(());
            }
        }
        ctx.dispatch(Action::UpdateExecution {
            display_name: root,
            values: props_of(json!({ "currentPageIndex": new_index })),
        });
        Ok(())
    }
}

/// Resets a parent's active view when the active view itself is deleted.
#[derive(Debug, Default)]
pub struct ViewDeletionListener {
    pending: Option<(String, String)>,
}

impl Listener for ViewDeletionListener {
    fn name(&self) -> &str {
        "listeners.view_deletion"
    }

    fn before_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        self.pending = None;
        let Action::DeleteSectionView(view) = action else {
            return Ok(());
        };
        let state = ctx.state();
        let Some(parent) = state.components().parent_of(view) else {
            return Ok(());
        };
        let origin = state.components().view_sorted_key(parent);
        let old_index = origin.iter().position(|key| key == view);
        if old_index == Some(current_index(state, parent, "currentViewIndex")) {
            self.pending = Some((parent.to_string(), view.clone()));
        }
        Ok(())
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, _action: &Action) -> Result<()> {
        let Some((parent, view)) = self.pending.take() else {
            return Ok(());
        };
        let components = ctx.state().components();
        if components.contains(&view) || !components.contains(&parent) {
            return Ok(());
        }
        ctx.dispatch(Action::UpdateExecution {
            display_name: parent,
            values: props_of(json!({ "currentViewIndex": 0 })),
        });
        Ok(())
    }
}

/// Pushes siblings out of the way of added, moved or resized nodes and
/// audits the containers a reflow commit touched.
#[derive(Debug, Default)]
pub struct ReflowListener {
    logger: Option<Logger>,
}

impl ReflowListener {
    pub fn new(logger: Option<Logger>) -> Self {
        Self { logger }
    }

    /// Names that still live in the store, grouped by their current parent.
    fn group_by_parent<'a, I>(state: &EditorState, names: I) -> BTreeMap<String, Vec<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in names {
            if let Some(parent) = state.components().parent_of(name) {
                let group = groups.entry(parent.to_string()).or_default();
                if !group.contains(name) {
                    group.push(name.clone());
                }
            }
        }
        groups
    }

    fn reflow_groups(ctx: &mut ListenerContext<'_>, groups: BTreeMap<String, Vec<String>>) {
        let state = ctx.state();
        let mut patches: Vec<(String, LayoutPatch)> = Vec::new();
        for (parent, members) in groups {
            let rects: Vec<Rect> = members
                .iter()
                .filter_map(|name| state.components().get(name).map(|node| node.rect()))
                .collect();
            let Some(square) = layout::combine_widget_infos(rects) else {
                continue;
            };
            let effects = layout::detect_crossing(state.components(), square, &parent, &members);
            patches.extend(
                effects
                    .into_iter()
                    .map(|(name, rect)| (name, LayoutPatch::from(rect))),
            );
        }
        if !patches.is_empty() {
            ctx.dispatch(Action::BatchUpdateLayoutInfoWhenReflow(patches));
        }
    }

    fn audit_overlaps<'a, I>(&self, state: &EditorState, names: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for parent in Self::group_by_parent(state, names).into_keys() {
            let overlaps = layout::container_overlaps(state.components(), &parent);
            if overlaps.is_empty() {
                continue;
            }
            let pairs: Vec<Value> = overlaps.iter().map(|(a, b)| json!([a, b])).collect();
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                LAYOUT_TARGET,
                "overlap_detected",
                [json_kv("container", json!(parent)), json_kv("pairs", Value::Array(pairs))],
            );
        }
    }
}

impl Listener for ReflowListener {
    fn name(&self) -> &str {
        "listeners.reflow"
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        let state = ctx.state();
        let groups = match action {
            Action::AddComponent(nodes) => {
                let names: Vec<String> = nodes.iter().map(|node| node.display_name.clone()).collect();
                Self::group_by_parent(state, &names)
            }
            Action::UpdateLayoutInfo { display_name, .. } | Action::CommitPreview(display_name) => {
                Self::group_by_parent(state, [display_name])
            }
            Action::BatchUpdateLayoutInfo(patches) => {
                Self::group_by_parent(state, patches.iter().map(|(name, _)| name))
            }
            Action::UpdateContainer { new_parent, slices, .. } => {
                let mut groups = Self::group_by_parent(state, slices.iter().map(|slice| &slice.display_name));
                groups.retain(|parent, _| parent == new_parent);
                groups
            }
            Action::BatchUpdateLayoutInfoWhenReflow(patches) => {
                self.audit_overlaps(state, patches.iter().map(|(name, _)| name));
                return Ok(());
            }
            Action::UpdateReflow { child_nodes, .. } => {
                self.audit_overlaps(state, child_nodes.iter().map(|slice| &slice.display_name));
                return Ok(());
            }
            _ => return Ok(()),
        };
        Self::reflow_groups(ctx, groups);
        Ok(())
    }
}

/// Applies the asymmetric grow and shrink reflow after a height change.
#[derive(Debug, Default)]
pub struct HeightReflowListener;

impl Listener for HeightReflowListener {
    fn name(&self) -> &str {
        "listeners.height_reflow"
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        let Action::UpdateNodeHeight {
            display_name,
            height,
            old_height,
        } = action
        else {
            return Ok(());
        };
        let components = ctx.state().components();
        let Some(parent) = components.parent_of(display_name).map(str::to_string) else {
            return Ok(());
        };
        let moved: Vec<LayoutItem> = layout::height_reflow(components, display_name, *old_height, *height);
        if moved.is_empty() {
            return Ok(());
        }
        ctx.dispatch(Action::UpdateReflow {
            parent,
            child_nodes: moved
                .into_iter()
                .map(|item| LayoutSlice::new(item.display_name, item.rect))
                .collect(),
        });
        Ok(())
    }
}

/// A viewport resize invalidates the canvas cursor.
#[derive(Debug, Default)]
pub struct ViewportResetListener;

impl Listener for ViewportResetListener {
    fn name(&self) -> &str {
        "listeners.viewport_reset"
    }

    fn after_reduce(&mut self, ctx: &mut ListenerContext<'_>, action: &Action) -> Result<()> {
        if matches!(action, Action::UpdateViewportSize { .. }) {
            ctx.dispatch(Action::ResetCursor);
        }
        Ok(())
    }
}
