use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use super::node::{ComponentNode, ComponentType, SectionName, SectionViewConfig, props_of};
use super::path::{self, PropPath, Props};
use crate::error::{EngineError, Result};
use crate::geometry::Rect;
use crate::layout::LayoutItem;
use crate::logging::{LogLevel, Logger, TREE_TARGET, emit, json_kv};
use crate::registry::DisplayNameRegistry;

/// Result of a single tree mutation. Missing references never raise; the
/// mutation is skipped and the reason is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    Skipped(String),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// New geometry for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSlice {
    pub display_name: String,
    pub rect: Rect,
}

impl LayoutSlice {
    pub fn new(display_name: impl Into<String>, rect: Rect) -> Self {
        Self {
            display_name: display_name.into(),
            rect,
        }
    }
}

/// Partial geometry update; absent fields keep their value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutPatch {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

impl LayoutPatch {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.w.is_none() && self.h.is_none()
    }

    pub fn apply(&self, rect: Rect) -> Rect {
        Rect::new(
            self.x.unwrap_or(rect.x),
            self.y.unwrap_or(rect.y),
            self.w.unwrap_or(rect.w),
            self.h.unwrap_or(rect.h),
        )
    }
}

impl From<Rect> for LayoutPatch {
    fn from(rect: Rect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            w: Some(rect.w),
            h: Some(rect.h),
        }
    }
}

/// Path-addressed prop writes for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct PropSlice {
    pub display_name: String,
    pub patches: Vec<(PropPath, Value)>,
}

#[derive(Debug, Clone)]
struct Slot {
    node: ComponentNode,
    children: Vec<String>,
}

/// Canonical component document.
///
/// Nodes live in a flat map keyed by display name; parent and child links are
/// names, so mutations touch only the slots involved and never copy subtrees.
#[derive(Debug, Default)]
pub struct ComponentStore {
    slots: HashMap<String, Slot>,
    root: Option<String>,
    registry: DisplayNameRegistry,
    logger: Option<Logger>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(logger: Logger) -> Self {
        Self {
            logger: Some(logger),
            ..Self::default()
        }
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    /// Replace the whole document, re-registering every display name.
    pub fn init_tree(&mut self, root: ComponentNode) -> Result<()> {
        let names = root.subtree_names();
        if names.iter().any(String::is_empty) {
            return Err(EngineError::InvalidDocument("empty display name".into()));
        }
        if let Some(name) = first_duplicate(&names) {
            return Err(EngineError::InvalidDocument(format!(
                "duplicate display name `{name}`"
            )));
        }
        self.slots.clear();
        self.registry.clear();
        let root_name = root.display_name.clone();
        self.insert_subtree(root, None);
        for name in &names {
            self.registry.reserve(name);
        }
        self.root = Some(root_name);
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TREE_TARGET,
            "tree_initialized",
            [json_kv("nodes", json!(names.len()))],
        );
        Ok(())
    }

    /// Start from an empty root node.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.registry.clear();
        self.root = None;
        let root = ComponentNode::root();
        self.registry.reserve(&root.display_name);
        self.root = Some(root.display_name.clone());
        self.insert_subtree(root, None);
    }

    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn root(&self) -> Option<&ComponentNode> {
        self.root.as_deref().and_then(|name| self.get(name))
    }

    pub fn get(&self, display_name: &str) -> Option<&ComponentNode> {
        self.slots.get(display_name).map(|slot| &slot.node)
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.slots.contains_key(display_name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every display name in the tree, sorted.
    pub fn display_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn children(&self, display_name: &str) -> &[String] {
        self.slots
            .get(display_name)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_nodes(&self, display_name: &str) -> Vec<&ComponentNode> {
        self.children(display_name)
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn parent_of(&self, display_name: &str) -> Option<&str> {
        self.get(display_name)
            .and_then(|node| node.parent_node.as_deref())
    }

    /// `display_name` followed by all its descendants, preorder.
    pub fn subtree(&self, display_name: &str) -> Vec<String> {
        let mut names = Vec::new();
        if !self.contains(display_name) {
            return names;
        }
        let mut stack = vec![display_name.to_string()];
        while let Some(name) = stack.pop() {
            for child in self.children(&name).iter().rev() {
                stack.push(child.clone());
            }
            names.push(name);
        }
        names
    }

    /// Sibling geometry inside a container, in child order.
    pub fn children_layout(&self, parent: &str) -> Vec<LayoutItem> {
        self.child_nodes(parent)
            .into_iter()
            .map(|node| LayoutItem::new(node.display_name.clone(), node.rect()))
            .collect()
    }

    pub fn registry(&self) -> &DisplayNameRegistry {
        &self.registry
    }

    pub fn generate_display_name(&mut self, base: &str) -> String {
        self.registry.generate(base)
    }

    /// Rebuild the nested document for persistence.
    pub fn to_dsl(&self) -> Option<ComponentNode> {
        self.root.as_deref().and_then(|root| self.build_nested(root))
    }

    fn build_nested(&self, display_name: &str) -> Option<ComponentNode> {
        let slot = self.slots.get(display_name)?;
        let mut node = slot.node.clone();
        node.children_node = slot
            .children
            .iter()
            .filter_map(|child| self.build_nested(child))
            .collect();
        Some(node)
    }

    /// Structural problems: dangling parent links, children listed twice,
    /// unreachable nodes, unregistered names.
    pub fn integrity_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut listed: HashMap<&str, usize> = HashMap::new();
        for (name, slot) in &self.slots {
            if !self.registry.contains(name) {
                issues.push(format!("`{name}` is not registered"));
            }
            for child in &slot.children {
                *listed.entry(child.as_str()).or_default() += 1;
                match self.get(child) {
                    None => issues.push(format!("`{name}` lists missing child `{child}`")),
                    Some(node) if node.parent_node.as_deref() != Some(name.as_str()) => {
                        issues.push(format!("`{child}` does not point back to `{name}`"))
                    }
                    Some(_) => {}
                }
            }
        }
        for (name, slot) in &self.slots {
            let count = listed.get(name.as_str()).copied().unwrap_or(0);
            let is_root = self.root.as_deref() == Some(name.as_str());
            if is_root && slot.node.parent_node.is_some() {
                issues.push(format!("root `{name}` has a parent"));
            }
            if !is_root && count != 1 {
                issues.push(format!("`{name}` is listed by {count} parents"));
            }
        }
        issues.sort();
        issues
    }

    pub fn add_nodes(&mut self, nodes: Vec<ComponentNode>) -> Vec<MutationOutcome> {
        nodes.into_iter().map(|node| self.add_node(node)).collect()
    }

    fn add_node(&mut self, node: ComponentNode) -> MutationOutcome {
        let Some(parent) = node.parent_node.clone() else {
            return self.skip("add_nodes", format!("`{}` has no parent", node.display_name));
        };
        if !self.contains(&parent) {
            return self.skip("add_nodes", format!("parent `{parent}` not found"));
        }
        let names = node.subtree_names();
        if names.iter().any(String::is_empty) {
            return self.skip("add_nodes", "empty display name".to_string());
        }
        if let Some(name) = first_duplicate(&names) {
            return self.skip("add_nodes", format!("display name `{name}` appears twice"));
        }
        if let Some(taken) = names.iter().find(|name| self.contains(name)) {
            return self.skip("add_nodes", format!("display name `{taken}` already in use"));
        }
        let name = node.display_name.clone();
        self.insert_subtree(node, Some(parent.clone()));
        if let Some(slot) = self.slots.get_mut(&parent) {
            slot.children.push(name);
        }
        for name in &names {
            self.registry.reserve(name);
        }
        MutationOutcome::Applied
    }

    pub fn add_page_nodes_with_sort_order(
        &mut self,
        nodes: Vec<ComponentNode>,
    ) -> Vec<MutationOutcome> {
        nodes
            .into_iter()
            .map(|node| {
                let name = node.display_name.clone();
                if node.parent_node.as_deref() != self.root.as_deref() {
                    return self.skip("add_page", format!("page `{name}` is not under the root"));
                }
                let outcome = self.add_node(node);
                if outcome.is_applied() {
                    if let Some(root) = self.root.clone() {
                        self.with_props(&root, |props| push_key(props, "pageSortedKey", &name));
                    }
                }
                outcome
            })
            .collect()
    }

    /// Attach a modal under the page's modal section, creating the section if needed.
    pub fn add_modal_component(
        &mut self,
        current_page: &str,
        mut modal: ComponentNode,
    ) -> MutationOutcome {
        if !self.contains(current_page) {
            return self.skip("add_modal", format!("page `{current_page}` not found"));
        }
        let existing = self
            .child_nodes(current_page)
            .into_iter()
            .find(|node| node.node_type == ComponentType::ModalSectionNode)
            .map(|node| node.display_name.clone());
        let section = match existing {
            Some(section) => section,
            None => {
                let section = self.registry.generate("modalSection");
                let node = ComponentNode::new(&section, ComponentType::ModalSectionNode)
                    .with_parent(current_page);
                let outcome = self.add_node(node);
                if !outcome.is_applied() {
                    return outcome;
                }
                section
            }
        };
        modal.parent_node = Some(section);
        self.add_node(modal)
    }

    /// Delete nodes and their descendants; returns every released name.
    pub fn delete_nodes(&mut self, display_names: &[String]) -> Vec<String> {
        let mut released = Vec::new();
        for name in display_names {
            if self.root.as_deref() == Some(name.as_str()) {
                self.skip("delete_nodes", "the root cannot be deleted".to_string());
                continue;
            }
            if !self.contains(name) {
                self.skip("delete_nodes", format!("`{name}` not found"));
                continue;
            }
            released.extend(self.remove_subtree(name));
        }
        released
    }

    pub fn delete_page_node(&mut self, display_name: &str) -> Vec<String> {
        let is_page = self.parent_of(display_name).is_some()
            && self.parent_of(display_name) == self.root.as_deref();
        if !is_page {
            self.skip("delete_page", format!("page `{display_name}` not found"));
            return Vec::new();
        }
        let released = self.remove_subtree(display_name);
        if let Some(root) = self.root.clone() {
            self.with_props(&root, |props| remove_key(props, "pageSortedKey", display_name));
        }
        released
    }

    pub fn sort_children(&mut self, parent: &str, order: Vec<String>) -> MutationOutcome {
        let Some(slot) = self.slots.get(parent) else {
            return self.skip("sort_children", format!("`{parent}` not found"));
        };
        let current: HashSet<&String> = slot.children.iter().collect();
        let next: HashSet<&String> = order.iter().collect();
        if current != next || order.len() != slot.children.len() {
            return self.skip("sort_children", format!("order for `{parent}` is not a permutation"));
        }
        if let Some(slot) = self.slots.get_mut(parent) {
            slot.children = order;
        }
        MutationOutcome::Applied
    }

    pub fn update_props(&mut self, display_name: &str, slice: &Props) -> MutationOutcome {
        let Some(slot) = self.slots.get_mut(display_name) else {
            return self.skip("update_props", format!("`{display_name}` not found"));
        };
        match path::merge_update_slice(&mut slot.node.props, slice) {
            Ok(()) => MutationOutcome::Applied,
            Err(err) => self.skip("update_props", format!("`{display_name}`: {err}")),
        }
    }

    pub fn update_multi_props(&mut self, updates: &[(String, Props)]) -> Vec<MutationOutcome> {
        updates
            .iter()
            .map(|(name, slice)| self.update_props(name, slice))
            .collect()
    }

    /// Apply path-addressed writes; each slice commits fully or not at all.
    pub fn batch_update_slice_props(&mut self, slices: &[PropSlice]) -> Vec<MutationOutcome> {
        slices
            .iter()
            .map(|slice| {
                let name = slice.display_name.as_str();
                let Some(node) = self.get(name) else {
                    return self.skip("update_slice_props", format!("`{name}` not found"));
                };
                let mut next = node.props.clone();
                for (path, value) in &slice.patches {
                    if let Err(err) = path::set(&mut next, path, value.clone()) {
                        return self.skip("update_slice_props", format!("`{name}`: {err}"));
                    }
                }
                self.with_props(name, |props| *props = next);
                MutationOutcome::Applied
            })
            .collect()
    }

    /// Shallow merge into the root node's props.
    pub fn update_root_props(&mut self, slice: &Props) -> MutationOutcome {
        let Some(root) = self.root.clone() else {
            return self.skip("update_root_props", "tree has no root".to_string());
        };
        self.shallow_merge(&root, slice)
    }

    pub fn update_target_page_props(&mut self, page: &str, slice: &Props) -> MutationOutcome {
        if self.parent_of(page).is_none() || self.parent_of(page) != self.root.as_deref() {
            return self.skip("update_page_props", format!("page `{page}` not found"));
        }
        self.shallow_merge(page, slice)
    }

    pub fn update_section_view_props(&mut self, parent: &str, slice: &Props) -> MutationOutcome {
        self.shallow_merge(parent, slice)
    }

    /// Move nodes between containers. When both parents match only geometry changes.
    pub fn reparent(
        &mut self,
        old_parent: &str,
        new_parent: &str,
        slices: &[LayoutSlice],
    ) -> Vec<MutationOutcome> {
        slices
            .iter()
            .map(|slice| self.reparent_one(old_parent, new_parent, slice))
            .collect()
    }

    fn reparent_one(&mut self, old_parent: &str, new_parent: &str, slice: &LayoutSlice) -> MutationOutcome {
        let name = slice.display_name.as_str();
        if !self.contains(name) {
            return self.skip("reparent", format!("`{name}` not found"));
        }
        if !self.children(old_parent).iter().any(|child| child == name) {
            return self.skip("reparent", format!("`{name}` is not a child of `{old_parent}`"));
        }
        if old_parent == new_parent {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.node.set_rect(slice.rect);
            }
            return MutationOutcome::Applied;
        }
        if !self.contains(new_parent) {
            return self.skip("reparent", format!("parent `{new_parent}` not found"));
        }
        if self.subtree(name).iter().any(|n| n == new_parent) {
            return self.skip("reparent", format!("`{new_parent}` is inside `{name}`"));
        }
        if let Some(slot) = self.slots.get_mut(old_parent) {
            slot.children.retain(|child| child != name);
        }
        if let Some(slot) = self.slots.get_mut(new_parent) {
            slot.children.push(name.to_string());
        }
        if let Some(slot) = self.slots.get_mut(name) {
            slot.node.parent_node = Some(new_parent.to_string());
            slot.node.set_rect(slice.rect);
        }
        MutationOutcome::Applied
    }

    /// Rename a node, fixing back-references, sorted-key lists and the homepage pointer.
    pub fn rename(&mut self, old: &str, new: &str) -> MutationOutcome {
        if old.is_empty() || new.is_empty() {
            return self.skip("rename", "empty display name".to_string());
        }
        if old == new {
            return MutationOutcome::Applied;
        }
        if self.root.as_deref() == Some(old) {
            return self.skip("rename", "the root cannot be renamed".to_string());
        }
        if self.contains(new) {
            return self.skip("rename", format!("`{new}` already exists"));
        }
        let Some(mut slot) = self.slots.remove(old) else {
            return self.skip("rename", format!("`{old}` not found"));
        };
        slot.node.display_name = new.to_string();
        for child in &slot.children {
            if let Some(child_slot) = self.slots.get_mut(child) {
                child_slot.node.parent_node = Some(new.to_string());
            }
        }
        let parent = slot.node.parent_node.clone();
        self.slots.insert(new.to_string(), slot);

        if let Some(parent) = parent {
            let is_root = self.root.as_deref() == Some(parent.as_str());
            if let Some(parent_slot) = self.slots.get_mut(&parent) {
                for child in parent_slot.children.iter_mut() {
                    if child == old {
                        *child = new.to_string();
                    }
                }
                let props = &mut parent_slot.node.props;
                replace_key(props, "pageSortedKey", old, new);
                replace_key(props, "viewSortedKey", old, new);
                if let Some(Value::Array(configs)) = props.get_mut("sectionViewConfigs") {
                    for config in configs.iter_mut() {
                        if config.get("viewDisplayName").and_then(Value::as_str) == Some(old) {
                            config["viewDisplayName"] = json!(new);
                        }
                    }
                }
                if is_root {
                    let homepage = props.get("homepageDisplayName").and_then(Value::as_str);
                    if homepage == Some(old) {
                        props.insert("homepageDisplayName".into(), json!(new));
                    } else if homepage.is_none_or(str::is_empty) {
                        let first = props
                            .get("pageSortedKey")
                            .and_then(|keys| keys.get(0))
                            .cloned();
                        if let Some(first) = first {
                            props.insert("homepageDisplayName".into(), first);
                        }
                    }
                }
            }
        }
        self.registry.rename(old, new);
        MutationOutcome::Applied
    }

    pub fn update_layout_info(&mut self, display_name: &str, patch: LayoutPatch) -> MutationOutcome {
        if patch.is_empty() {
            return self.skip("update_layout", format!("empty patch for `{display_name}`"));
        }
        let Some(slot) = self.slots.get_mut(display_name) else {
            return self.skip("update_layout", format!("`{display_name}` not found"));
        };
        let next = patch.apply(slot.node.rect());
        slot.node.set_rect(next);
        MutationOutcome::Applied
    }

    pub fn batch_update_layout_info(&mut self, patches: &[(String, LayoutPatch)]) -> Vec<MutationOutcome> {
        patches
            .iter()
            .map(|(name, patch)| self.update_layout_info(name, *patch))
            .collect()
    }

    /// Overwrite geometry of the listed children of `parent`; other names are ignored.
    pub fn update_reflow(&mut self, parent: &str, child_nodes: &[LayoutSlice]) -> MutationOutcome {
        if !self.contains(parent) {
            return self.skip("update_reflow", format!("`{parent}` not found"));
        }
        let children: HashSet<String> = self.children(parent).iter().cloned().collect();
        for slice in child_nodes {
            if !children.contains(&slice.display_name) {
                continue;
            }
            if let Some(slot) = self.slots.get_mut(&slice.display_name) {
                slot.node.set_rect(slice.rect);
            }
        }
        MutationOutcome::Applied
    }

    /// Store a measured height, never below the node's `min_h`.
    pub fn update_node_height(&mut self, display_name: &str, height: u32) -> MutationOutcome {
        let Some(slot) = self.slots.get_mut(display_name) else {
            return self.skip("update_height", format!("`{display_name}` not found"));
        };
        slot.node.h = height.max(slot.node.min_h);
        MutationOutcome::Applied
    }

    pub fn add_target_page_section(&mut self, page: &str, section: SectionName) -> MutationOutcome {
        if self.parent_of(page).is_none() || self.parent_of(page) != self.root.as_deref() {
            return self.skip("add_section", format!("page `{page}` not found"));
        }
        if self.find_section(page, section).is_some() {
            return self.skip("add_section", format!("`{page}` already has {}", section.show_name()));
        }
        let config = self.section_config(page, section);
        let outcome = self.add_node(config);
        if outcome.is_applied() {
            self.shallow_merge(page, &section.options_when_added());
        }
        outcome
    }

    pub fn delete_target_page_section(&mut self, page: &str, section: SectionName) -> Vec<String> {
        let Some(target) = self.find_section(page, section) else {
            self.skip("delete_section", format!("`{page}` has no {}", section.show_name()));
            return Vec::new();
        };
        self.shallow_merge(page, &section.options_when_deleted());
        self.remove_subtree(&target)
    }

    fn find_section(&self, page: &str, section: SectionName) -> Option<String> {
        self.child_nodes(page)
            .into_iter()
            .find(|node| node.show_name.as_deref() == Some(section.show_name()))
            .map(|node| node.display_name.clone())
    }

    fn section_config(&mut self, page: &str, section: SectionName) -> ComponentNode {
        let section_name = self.registry.generate(section.show_name());
        let container = self
            .registry
            .generate(&format!("{}Container", section.show_name()));
        let view = SectionViewConfig::new("view1", container.clone());
        let mut node = ComponentNode::new(&section_name, ComponentType::SectionNode)
            .with_parent(page)
            .with_props(json!({
                "viewSortedKey": [container.clone()],
                "sectionViewConfigs": [view],
                "currentViewIndex": 0,
                "defaultViewKey": "view1",
            }))
            .with_children(vec![
                ComponentNode::new(&container, ComponentType::ContainerNode)
                    .with_parent(&section_name),
            ]);
        node.show_name = Some(section.show_name().to_string());
        node
    }

    /// Append a new view container to a multi-view parent.
    pub fn add_section_view(&mut self, parent: &str, section_name: &str) -> MutationOutcome {
        if !self.contains(parent) {
            return self.skip("add_view", format!("`{parent}` not found"));
        }
        let keys: HashSet<String> = self
            .section_view_configs(parent)
            .into_iter()
            .map(|config| config.key)
            .collect();
        let key = (1..)
            .map(|n| format!("view{n}"))
            .find(|candidate| !keys.contains(candidate))
            .unwrap_or_else(|| "view".to_string());
        let container = self.registry.generate(&format!("{section_name}Container"));
        let node = ComponentNode::new(&container, ComponentType::ContainerNode).with_parent(parent);
        let outcome = self.add_node(node);
        if !outcome.is_applied() {
            return outcome;
        }
        let config = SectionViewConfig::new(key, container.clone());
        self.with_props(parent, |props| {
            push_key(props, "viewSortedKey", &container);
            let configs = props
                .entry("sectionViewConfigs")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = configs {
                items.push(json!(config));
            }
        });
        MutationOutcome::Applied
    }

    pub fn delete_section_view(&mut self, view_display_name: &str) -> Vec<String> {
        let Some(parent) = self.parent_of(view_display_name).map(str::to_string) else {
            self.skip("delete_view", format!("view `{view_display_name}` not found"));
            return Vec::new();
        };
        let released = self.remove_subtree(view_display_name);
        self.with_props(&parent, |props| {
            remove_key(props, "viewSortedKey", view_display_name);
            if let Some(Value::Array(configs)) = props.get_mut("sectionViewConfigs") {
                configs.retain(|config| {
                    config.get("viewDisplayName").and_then(Value::as_str) != Some(view_display_name)
                });
            }
        });
        released
    }

    pub fn update_viewport_size(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        size_type: Option<String>,
    ) -> MutationOutcome {
        let slice = props_of(json!({
            "viewportWidth": width,
            "viewportHeight": height,
            "viewportSizeType": size_type,
        }));
        self.update_root_props(&slice)
    }

    /// Upsert a global data entry, dropping `old_key` when it is a rename.
    pub fn set_global_state(&mut self, key: &str, value: Value, old_key: Option<&str>) -> MutationOutcome {
        let Some(root) = self.root.clone() else {
            return self.skip("set_global_state", "tree has no root".to_string());
        };
        self.with_props(&root, |props| {
            let data = props
                .entry("globalData")
                .or_insert_with(|| Value::Object(Props::new()));
            if !data.is_object() {
                *data = Value::Object(Props::new());
            }
            if let Value::Object(map) = data {
                if let Some(old_key) = old_key {
                    map.remove(old_key);
                }
                map.insert(key.to_string(), value);
            }
        });
        MutationOutcome::Applied
    }

    pub fn delete_global_state(&mut self, key: &str) -> MutationOutcome {
        let Some(root) = self.root.clone() else {
            return self.skip("delete_global_state", "tree has no root".to_string());
        };
        let mut removed = false;
        self.with_props(&root, |props| {
            if let Some(Value::Object(map)) = props.get_mut("globalData") {
                removed = map.remove(key).is_some();
            }
        });
        if removed {
            MutationOutcome::Applied
        } else {
            self.skip("delete_global_state", format!("global key `{key}` not found"))
        }
    }

    pub fn page_sorted_key(&self) -> Vec<String> {
        self.root()
            .map(|root| string_list(&root.props, "pageSortedKey"))
            .unwrap_or_default()
    }

    pub fn homepage_display_name(&self) -> Option<String> {
        self.root()
            .and_then(|root| root.props.get("homepageDisplayName"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    pub fn current_page_index(&self) -> usize {
        self.root()
            .and_then(|root| root.props.get("currentPageIndex"))
            .and_then(Value::as_u64)
            .map(|index| index as usize)
            .unwrap_or(0)
    }

    pub fn global_data(&self) -> Option<&Props> {
        self.root()
            .and_then(|root| root.props.get("globalData"))
            .and_then(Value::as_object)
    }

    pub fn view_sorted_key(&self, display_name: &str) -> Vec<String> {
        self.get(display_name)
            .map(|node| string_list(&node.props, "viewSortedKey"))
            .unwrap_or_default()
    }

    pub fn section_view_configs(&self, display_name: &str) -> Vec<SectionViewConfig> {
        self.get(display_name)
            .and_then(|node| node.props.get("sectionViewConfigs"))
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
            .unwrap_or_default()
    }

    fn insert_subtree(&mut self, mut node: ComponentNode, parent: Option<String>) {
        let children = std::mem::take(&mut node.children_node);
        node.parent_node = parent;
        let name = node.display_name.clone();
        let child_names = children.iter().map(|c| c.display_name.clone()).collect();
        for child in children {
            self.insert_subtree(child, Some(name.clone()));
        }
        self.slots.insert(
            name,
            Slot {
                node,
                children: child_names,
            },
        );
    }

    fn remove_subtree(&mut self, display_name: &str) -> Vec<String> {
        let names = self.subtree(display_name);
        if let Some(parent) = self.parent_of(display_name).map(str::to_string) {
            if let Some(slot) = self.slots.get_mut(&parent) {
                slot.children.retain(|child| child != display_name);
            }
        }
        for name in &names {
            self.slots.remove(name);
        }
        self.registry.remove_multi(&names);
        names
    }

    fn shallow_merge(&mut self, display_name: &str, slice: &Props) -> MutationOutcome {
        let Some(slot) = self.slots.get_mut(display_name) else {
            return self.skip("merge_props", format!("`{display_name}` not found"));
        };
        for (key, value) in slice {
            slot.node.props.insert(key.clone(), value.clone());
        }
        MutationOutcome::Applied
    }

    fn with_props<F>(&mut self, display_name: &str, apply: F)
    where
        F: FnOnce(&mut Props),
    {
        if let Some(slot) = self.slots.get_mut(display_name) {
            apply(&mut slot.node.props);
        }
    }

    fn skip(&self, op: &str, reason: String) -> MutationOutcome {
        emit(
            self.logger.as_ref(),
            LogLevel::Warn,
            TREE_TARGET,
            "mutation_skipped",
            [json_kv("op", json!(op)), json_kv("reason", json!(reason))],
        );
        MutationOutcome::Skipped(reason)
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

fn string_list(props: &Props, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn push_key(props: &mut Props, key: &str, name: &str) {
    let entry = props
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        items.push(json!(name));
    }
}

fn remove_key(props: &mut Props, key: &str, name: &str) {
    if let Some(Value::Array(items)) = props.get_mut(key) {
        items.retain(|item| item.as_str() != Some(name));
    }
}

fn replace_key(props: &mut Props, key: &str, old: &str, new: &str) {
    if let Some(Value::Array(items)) = props.get_mut(key) {
        for item in items.iter_mut() {
            if item.as_str() == Some(old) {
                *item = json!(new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::tree::node::ContainerType;
    use std::sync::Arc;

    fn widget(name: &str, parent: &str, rect: Rect) -> ComponentNode {
        ComponentNode::new(name, ComponentType::TextWidget)
            .with_parent(parent)
            .with_rect(rect)
    }

    fn store_with_page() -> ComponentStore {
        let mut store = ComponentStore::new();
        let root = ComponentNode::root().with_props(json!({
            "pageSortedKey": ["page1"],
            "homepageDisplayName": "page1",
            "currentPageIndex": 0,
            "globalData": {},
        }));
        let root = root.with_children(vec![ComponentNode::page("page1")]);
        store.init_tree(root).unwrap();
        store
    }

    #[test]
    fn init_tree_rejects_duplicate_names() {
        let mut store = ComponentStore::new();
        let root = ComponentNode::root().with_children(vec![
            ComponentNode::page("page1"),
            ComponentNode::page("page1"),
        ]);
        assert!(matches!(
            store.init_tree(root),
            Err(EngineError::InvalidDocument(_))
        ));
    }

    #[test]
    fn add_and_delete_release_names() {
        let mut store = store_with_page();
        let outcomes = store.add_nodes(vec![
            ComponentNode::new("container1", ComponentType::ContainerWidget)
                .with_parent("page1")
                .with_children(vec![
                    ComponentNode::new("view1c", ComponentType::ContainerNode)
                        .with_children(vec![widget("text1", "view1c", Rect::new(0, 0, 4, 4))]),
                ]),
        ]);
        assert!(outcomes[0].is_applied());
        assert_eq!(store.parent_of("text1"), Some("view1c"));
        assert!(store.registry().contains("text1"));
        assert!(store.integrity_issues().is_empty());

        let mut released = store.delete_nodes(&["container1".to_string()]);
        released.sort();
        assert_eq!(released, vec!["container1", "text1", "view1c"]);
        assert!(!store.registry().contains("text1"));
        assert!(store.children("page1").is_empty());
        assert_eq!(store.generate_display_name("text"), "text1");
    }

    #[test]
    fn batch_add_rejects_names_repeated_inside_the_subtree() {
        let mut store = store_with_page();
        let outcomes = store.add_nodes(vec![
            ComponentNode::new("box1", ComponentType::ContainerWidget)
                .with_parent("page1")
                .with_children(vec![
                    widget("text1", "box1", Rect::new(0, 0, 4, 4)),
                    widget("text1", "box1", Rect::new(0, 4, 4, 4)),
                ]),
        ]);
        assert!(matches!(&outcomes[0], MutationOutcome::Skipped(reason) if reason.contains("twice")));
        assert!(!store.contains("box1"));
        assert!(!store.contains("text1"));
        assert!(store.children("page1").is_empty());
        assert!(store.integrity_issues().is_empty());
    }

    #[test]
    fn same_parent_reparent_requires_a_child() {
        let mut store = store_with_page();
        store.add_nodes(vec![
            ComponentNode::new("box1", ComponentType::ContainerWidget)
                .with_parent("page1")
                .with_rect(Rect::new(0, 0, 8, 8))
                .with_children(vec![widget("text1", "box1", Rect::new(0, 0, 4, 4))]),
        ]);
        let outcomes = store.reparent("page1", "page1", &[LayoutSlice::new("text1", Rect::new(9, 9, 4, 4))]);
        assert!(!outcomes[0].is_applied());
        assert_eq!(store.get("text1").unwrap().rect(), Rect::new(0, 0, 4, 4));

        let outcomes = store.reparent("box1", "box1", &[LayoutSlice::new("text1", Rect::new(2, 2, 4, 4))]);
        assert!(outcomes[0].is_applied());
        assert_eq!(store.get("text1").unwrap().rect(), Rect::new(2, 2, 4, 4));
    }

    #[test]
    fn out_of_range_prop_index_is_a_skip() {
        let mut store = store_with_page();
        store.add_nodes(vec![widget("text1", "page1", Rect::new(0, 0, 4, 4))]);
        let mut slice = Props::new();
        slice.insert(format!("list[{}]", usize::MAX), json!(1));
        let outcome = store.update_props("text1", &slice);
        assert!(matches!(outcome, MutationOutcome::Skipped(_)));
        assert!(!store.get("text1").unwrap().props.contains_key("list"));
    }

    #[test]
    fn missing_parent_is_skipped_and_logged() {
        let sink = Arc::new(MemorySink::new());
        let mut store = store_with_page();
        store.set_logger(Some(Logger::from_shared(sink.clone())));
        let outcomes = store.add_nodes(vec![widget("text1", "ghost", Rect::default())]);
        assert!(matches!(outcomes[0], MutationOutcome::Skipped(_)));
        assert!(!store.contains("text1"));
        assert_eq!(sink.messages(), vec!["mutation_skipped"]);
    }

    #[test]
    fn rename_rewires_parent_children_and_sort_keys() {
        let mut store = store_with_page();
        store.add_nodes(vec![widget("text1", "page1", Rect::new(0, 0, 4, 4))]);
        assert!(store.rename("page1", "home").is_applied());
        assert_eq!(store.page_sorted_key(), vec!["home"]);
        assert_eq!(store.homepage_display_name().as_deref(), Some("home"));
        assert_eq!(store.parent_of("text1"), Some("home"));
        assert!(store.registry().contains("home"));
        assert!(!store.registry().contains("page1"));
        assert!(store.integrity_issues().is_empty());

        assert!(!store.rename("text1", "home").is_applied());
        assert!(!store.rename("root", "other").is_applied());
    }

    #[test]
    fn reparent_moves_between_containers() {
        let mut store = store_with_page();
        store.add_nodes(vec![
            ComponentNode::new("box1", ComponentType::ContainerNode).with_parent("page1"),
            widget("text1", "page1", Rect::new(0, 0, 4, 4)),
        ]);
        let slice = LayoutSlice::new("text1", Rect::new(1, 1, 4, 4));
        let outcomes = store.reparent("page1", "box1", std::slice::from_ref(&slice));
        assert!(outcomes[0].is_applied());
        assert_eq!(store.children("box1"), ["text1".to_string()]);
        assert_eq!(store.get("text1").unwrap().rect(), Rect::new(1, 1, 4, 4));
        assert!(store.children("page1").iter().all(|child| child != "text1"));

        let stale = LayoutSlice::new("text1", Rect::default());
        assert!(!store.reparent("page1", "box1", &[stale])[0].is_applied());
        assert!(store.integrity_issues().is_empty());
    }

    #[test]
    fn reparent_into_own_subtree_is_refused() {
        let mut store = store_with_page();
        store.add_nodes(vec![
            ComponentNode::new("box1", ComponentType::ContainerNode)
                .with_parent("page1")
                .with_children(vec![ComponentNode::new("inner", ComponentType::ContainerNode)]),
        ]);
        let slice = LayoutSlice::new("box1", Rect::default());
        let outcomes = store.reparent("page1", "inner", &[slice]);
        assert!(!outcomes[0].is_applied());
        assert_eq!(store.parent_of("box1"), Some("page1"));
    }

    #[test]
    fn height_never_drops_below_min() {
        let mut store = store_with_page();
        store.add_nodes(vec![widget("text1", "page1", Rect::new(0, 0, 4, 4)).with_min_h(3)]);
        store.update_node_height("text1", 1);
        assert_eq!(store.get("text1").unwrap().h, 3);
        store.update_node_height("text1", 9);
        assert_eq!(store.get("text1").unwrap().h, 9);
    }

    #[test]
    fn layout_patch_keeps_unset_fields() {
        let mut store = store_with_page();
        store.add_nodes(vec![widget("text1", "page1", Rect::new(1, 2, 3, 4))]);
        let patch = LayoutPatch {
            y: Some(7),
            ..LayoutPatch::default()
        };
        assert!(store.update_layout_info("text1", patch).is_applied());
        assert_eq!(store.get("text1").unwrap().rect(), Rect::new(1, 7, 3, 4));
        assert!(!store.update_layout_info("text1", LayoutPatch::default()).is_applied());
    }

    #[test]
    fn slice_props_apply_atomically() {
        let mut store = store_with_page();
        store.add_nodes(vec![
            widget("text1", "page1", Rect::default()).with_props(json!({"label": "a", "n": 1})),
        ]);
        let bad = PropSlice {
            display_name: "text1".into(),
            patches: vec![
                ("label".parse().unwrap(), json!("b")),
                ("n.deep".parse().unwrap(), json!(2)),
            ],
        };
        assert!(!store.batch_update_slice_props(&[bad])[0].is_applied());
        assert_eq!(store.get("text1").unwrap().props["label"], json!("a"));

        let good = PropSlice {
            display_name: "text1".into(),
            patches: vec![("style.color".parse().unwrap(), json!("red"))],
        };
        assert!(store.batch_update_slice_props(&[good])[0].is_applied());
        assert_eq!(store.get("text1").unwrap().props["style"], json!({"color": "red"}));
    }

    #[test]
    fn sections_toggle_page_flags() {
        let mut store = store_with_page();
        assert!(store.add_target_page_section("page1", SectionName::Header).is_applied());
        let page = store.get("page1").unwrap();
        assert_eq!(page.props["hasHeader"], json!(true));
        let section = store
            .child_nodes("page1")
            .into_iter()
            .find(|node| node.show_name.as_deref() == Some("headerSection"))
            .map(|node| node.display_name.clone())
            .unwrap();
        assert_eq!(store.view_sorted_key(&section), vec!["headerSectionContainer1"]);
        assert_eq!(store.section_view_configs(&section)[0].key, "view1");
        assert!(!store.add_target_page_section("page1", SectionName::Header).is_applied());

        let released = store.delete_target_page_section("page1", SectionName::Header);
        assert_eq!(released.len(), 2);
        assert_eq!(store.get("page1").unwrap().props["hasHeader"], json!(false));
        assert!(store.children("page1").is_empty());
    }

    #[test]
    fn section_views_pick_the_next_free_key() {
        let mut store = store_with_page();
        store.add_target_page_section("page1", SectionName::Left);
        let section = store.children("page1")[0].clone();
        assert!(store.add_section_view(&section, "leftSection").is_applied());
        let configs = store.section_view_configs(&section);
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].key, "view2");
        assert_eq!(configs[1].view_display_name, "leftSectionContainer2");

        store.delete_section_view("leftSectionContainer1");
        assert_eq!(store.view_sorted_key(&section), vec!["leftSectionContainer2"]);
        assert!(store.add_section_view(&section, "leftSection").is_applied());
        let configs = store.section_view_configs(&section);
        assert_eq!(configs[1].key, "view1");
    }

    #[test]
    fn modal_components_land_in_a_modal_section() {
        let mut store = store_with_page();
        let modal = ComponentNode::new("modal1", ComponentType::ModalWidget)
            .with_container_type(ContainerType::EditorScaleSquare);
        assert!(store.add_modal_component("page1", modal).is_applied());
        let section = store.parent_of("modal1").unwrap().to_string();
        assert_eq!(store.get(&section).unwrap().node_type, ComponentType::ModalSectionNode);

        let second = ComponentNode::new("modal2", ComponentType::ModalWidget);
        store.add_modal_component("page1", second);
        assert_eq!(store.parent_of("modal2"), Some(section.as_str()));
    }

    #[test]
    fn page_delete_updates_sort_order() {
        let mut store = store_with_page();
        store.add_page_nodes_with_sort_order(vec![ComponentNode::page("page2")]);
        assert_eq!(store.page_sorted_key(), vec!["page1", "page2"]);
        store.delete_page_node("page1");
        assert_eq!(store.page_sorted_key(), vec!["page2"]);
        assert!(!store.contains("page1"));
    }

    #[test]
    fn global_state_renames_and_deletes() {
        let mut store = store_with_page();
        store.set_global_state("count", json!(1), None);
        store.set_global_state("total", json!(2), Some("count"));
        let data = store.global_data().unwrap();
        assert_eq!(data.get("total"), Some(&json!(2)));
        assert!(data.get("count").is_none());
        assert!(store.delete_global_state("total").is_applied());
        assert!(!store.delete_global_state("total").is_applied());
    }

    #[test]
    fn dsl_export_nests_children() {
        let mut store = store_with_page();
        store.add_nodes(vec![
            widget("text2", "page1", Rect::default()),
            widget("text1", "page1", Rect::default()),
        ]);
        store.sort_children("page1", vec!["text1".into(), "text2".into()]);
        let dsl = store.to_dsl().unwrap();
        let page = &dsl.children_node[0];
        let names: Vec<&str> = page.children_node.iter().map(|n| n.display_name.as_str()).collect();
        assert_eq!(names, vec!["text1", "text2"]);
        assert!(!store.sort_children("page1", vec!["text1".into()]).is_applied());
    }
}
