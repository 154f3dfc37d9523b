use serde_json::Value;

use crate::action::{ActionNode, ActionResult};
use super::selection::CanvasCursor;
use crate::geometry::LayoutInfo;
use crate::tree::{ComponentNode, LayoutPatch, LayoutSlice, PropSlice, Props, SectionName};
use crate::widget::WidgetCommand;

/// Every mutation the editor can dispatch. Listeners answer with more of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    InitTree(ComponentNode),
    ResetComponents,
    AddComponent(Vec<ComponentNode>),
    AddPageNodes(Vec<ComponentNode>),
    AddModalComponent {
        page: String,
        modal: ComponentNode,
    },
    DeleteComponents(Vec<String>),
    DeletePage(String),
    SortChildren {
        parent: String,
        order: Vec<String>,
    },
    UpdateProps {
        display_name: String,
        slice: Props,
    },
    UpdateMultiProps(Vec<(String, Props)>),
    BatchUpdateSliceProps(Vec<PropSlice>),
    UpdateRootProps(Props),
    UpdateTargetPageProps {
        page: String,
        props: Props,
    },
    UpdateSectionViewProps {
        parent: String,
        props: Props,
    },
    /// Reparent the slices from `old_parent` into `new_parent`.
    UpdateContainer {
        old_parent: String,
        new_parent: String,
        slices: Vec<LayoutSlice>,
    },
    UpdateLayoutInfo {
        display_name: String,
        patch: LayoutPatch,
    },
    BatchUpdateLayoutInfo(Vec<(String, LayoutPatch)>),
    /// Geometry committed by reflow; never re-triggers reflow.
    BatchUpdateLayoutInfoWhenReflow(Vec<(String, LayoutPatch)>),
    UpdateReflow {
        parent: String,
        child_nodes: Vec<LayoutSlice>,
    },
    UpdateNodeHeight {
        display_name: String,
        height: u32,
        old_height: u32,
    },
    PreviewLayout {
        display_name: String,
        info: LayoutInfo,
    },
    CommitPreview(String),
    Rename {
        display_name: String,
        new_display_name: String,
    },
    AddSection {
        page: String,
        section: SectionName,
    },
    DeleteSection {
        page: String,
        section: SectionName,
    },
    AddSectionView {
        parent: String,
        section_name: String,
    },
    DeleteSectionView(String),
    UpdateViewportSize {
        width: Option<u32>,
        height: Option<u32>,
        size_type: Option<String>,
    },
    SetGlobalState {
        key: String,
        value: Value,
        old_key: Option<String>,
    },
    DeleteGlobalState(String),
    AddAction(ActionNode),
    RemoveAction(String),
    UpdateActionProps {
        display_name: String,
        slice: Props,
    },
    BatchUpdateActionSliceProps(Vec<PropSlice>),
    RenameAction {
        display_name: String,
        new_display_name: String,
    },
    /// Re-entry point for data-source calls completed outside the editor.
    ActionRunCompleted {
        display_name: String,
        result: ActionResult,
    },
    UpdateExecution {
        display_name: String,
        values: Props,
    },
    WidgetCommand {
        display_name: String,
        command: WidgetCommand,
    },
    Select(Vec<String>),
    SetCursor(CanvasCursor),
    ResetCursor,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitTree(_) => "init_tree",
            Self::ResetComponents => "reset_components",
            Self::AddComponent(_) => "add_component",
            Self::AddPageNodes(_) => "add_page_nodes",
            Self::AddModalComponent { .. } => "add_modal_component",
            Self::DeleteComponents(_) => "delete_components",
            Self::DeletePage(_) => "delete_page",
            Self::SortChildren { .. } => "sort_children",
            Self::UpdateProps { .. } => "update_props",
            Self::UpdateMultiProps(_) => "update_multi_props",
            Self::BatchUpdateSliceProps(_) => "batch_update_slice_props",
            Self::UpdateRootProps(_) => "update_root_props",
            Self::UpdateTargetPageProps { .. } => "update_target_page_props",
            Self::UpdateSectionViewProps { .. } => "update_section_view_props",
            Self::UpdateContainer { .. } => "update_container",
            Self::UpdateLayoutInfo { .. } => "update_layout_info",
            Self::BatchUpdateLayoutInfo(_) => "batch_update_layout_info",
            Self::BatchUpdateLayoutInfoWhenReflow(_) => "batch_update_layout_info_when_reflow",
            Self::UpdateReflow { .. } => "update_reflow",
            Self::UpdateNodeHeight { .. } => "update_node_height",
            Self::PreviewLayout { .. } => "preview_layout",
            Self::CommitPreview(_) => "commit_preview",
            Self::Rename { .. } => "rename",
            Self::AddSection { .. } => "add_section",
            Self::DeleteSection { .. } => "delete_section",
            Self::AddSectionView { .. } => "add_section_view",
            Self::DeleteSectionView(_) => "delete_section_view",
            Self::UpdateViewportSize { .. } => "update_viewport_size",
            Self::SetGlobalState { .. } => "set_global_state",
            Self::DeleteGlobalState(_) => "delete_global_state",
            Self::AddAction(_) => "add_action",
            Self::RemoveAction(_) => "remove_action",
            Self::UpdateActionProps { .. } => "update_action_props",
            Self::BatchUpdateActionSliceProps(_) => "batch_update_action_slice_props",
            Self::RenameAction { .. } => "rename_action",
            Self::ActionRunCompleted { .. } => "action_run_completed",
            Self::UpdateExecution { .. } => "update_execution",
            Self::WidgetCommand { .. } => "widget_command",
            Self::Select(_) => "select",
            Self::SetCursor(_) => "set_cursor",
            Self::ResetCursor => "reset_cursor",
        }
    }
}
