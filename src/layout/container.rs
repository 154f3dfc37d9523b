//! Reflow entry points that read sibling geometry straight from the store.

use std::collections::BTreeMap;

use super::core::{self, LayoutItem};
use crate::geometry::Rect;
use crate::tree::ComponentStore;

/// New rectangles for the siblings in `container` displaced by a group
/// occupying `square`. Group members are passed in `excluded`.
pub fn detect_crossing(
    store: &ComponentStore,
    square: Rect,
    container: &str,
    excluded: &[String],
) -> BTreeMap<String, Rect> {
    let siblings = store.children_layout(container);
    core::crossing_effects(square, &siblings, excluded)
        .into_iter()
        .map(|item| (item.display_name, item.rect))
        .collect()
}

/// Siblings to move after `display_name` changed height from `old_height`.
/// Empty when the node or its parent is unknown.
pub fn height_reflow(
    store: &ComponentStore,
    display_name: &str,
    old_height: u32,
    requested: u32,
) -> Vec<LayoutItem> {
    let Some(node) = store.get(display_name) else {
        return Vec::new();
    };
    let Some(parent) = node.parent_node.as_deref() else {
        return Vec::new();
    };
    let item = LayoutItem::new(display_name, node.rect());
    let siblings = store.children_layout(parent);
    core::height_effects(&item, old_height, requested, &siblings)
}

/// Crossing pairs among the children of `container`.
pub fn container_overlaps(store: &ComponentStore, container: &str) -> Vec<(String, String)> {
    core::find_overlaps(&store.children_layout(container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ComponentNode, ComponentType};

    fn store() -> ComponentStore {
        let mut store = ComponentStore::new();
        let text = |name: &str, rect| {
            ComponentNode::new(name, ComponentType::TextWidget)
                .with_parent("page1")
                .with_rect(rect)
        };
        let root = ComponentNode::root().with_children(vec![ComponentNode::page("page1").with_children(vec![
            text("a", Rect::new(0, 0, 8, 8)),
            text("b", Rect::new(0, 4, 8, 4)),
        ])]);
        store.init_tree(root).unwrap();
        store
    }

    #[test]
    fn crossing_reads_siblings_from_the_container() {
        let store = store();
        let moved = detect_crossing(&store, Rect::new(0, 0, 8, 8), "page1", &["a".to_string()]);
        assert_eq!(moved.get("b"), Some(&Rect::new(0, 8, 8, 4)));
        assert_eq!(container_overlaps(&store, "page1"), vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn unknown_nodes_have_no_height_effects() {
        let store = store();
        assert!(height_reflow(&store, "ghost", 4, 8).is_empty());
        assert_eq!(height_reflow(&store, "a", 4, 8), vec![LayoutItem::new("b", Rect::new(0, 8, 8, 4))]);
    }
}
