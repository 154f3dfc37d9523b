use std::collections::BTreeMap;

use serde_json::json;

use super::binding::{self, GLOBAL_DATA, RenameKind};
use super::core::{SeedKind, SeedNode};
use super::graph::DependencyMap;
use crate::tree::{PropPath, PropSlice, path};

/// Prop patches that carry a rename into every dependent binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenamePatches {
    pub widget_slices: Vec<PropSlice>,
    pub action_slices: Vec<PropSlice>,
}

impl RenamePatches {
    pub fn is_empty(&self) -> bool {
        self.widget_slices.is_empty() && self.action_slices.is_empty()
    }
}

/// Compute the binding rewrites for renaming `old` to `new`.
///
/// Reads the dependency map as it stands before the rename; the patches are
/// applied once the rename itself is committed. For
/// [`RenameKind::GlobalDataKey`], `old` and `new` are keys of the global data
/// map and only readers of `globalData` are inspected. Patches to global data
/// itself target `root`, the node holding the `globalData` prop.
pub fn change_display_name_helper(
    in_dependencies: &DependencyMap,
    seeds: &BTreeMap<String, SeedNode>,
    root: &str,
    old: &str,
    new: &str,
    kind: RenameKind,
) -> RenamePatches {
    let source = match kind {
        RenameKind::DisplayName => old,
        RenameKind::GlobalDataKey => GLOBAL_DATA,
    };
    let mut patches = RenamePatches::default();
    let Some(readers) = in_dependencies.get(source) else {
        return patches;
    };
    for reader in readers {
        let Some(seed) = seeds.get(reader) else {
            continue;
        };
        let mut rewrites = Vec::new();
        path::for_each_string(&seed.props, |prop_path, raw| {
            if !binding::is_dynamic(raw) {
                return;
            }
            let renamed = binding::rename_references(raw, old, new, kind);
            if renamed != raw {
                rewrites.push((prop_path, json!(renamed)));
            }
        });
        if rewrites.is_empty() {
            continue;
        }
        match seed.kind {
            SeedKind::Widget => patches.widget_slices.push(PropSlice {
                display_name: reader.clone(),
                patches: rewrites,
            }),
            SeedKind::Action => patches.action_slices.push(PropSlice {
                display_name: reader.clone(),
                patches: rewrites,
            }),
            // Global data lives under the root node's `globalData` prop. A
            // renamed key's own entry is written under its new name.
            SeedKind::GlobalData => patches.widget_slices.push(PropSlice {
                display_name: root.to_string(),
                patches: rewrites
                    .into_iter()
                    .map(|(prop_path, value)| {
                        let moved = kind == RenameKind::GlobalDataKey
                            && prop_path.root_key() == old;
                        (under_global_data(&prop_path, moved.then_some(new)), value)
                    })
                    .collect(),
            }),
        }
    }
    patches
}

fn under_global_data(prop_path: &PropPath, root_key: Option<&str>) -> PropPath {
    let mut prefixed = PropPath::field(GLOBAL_DATA);
    for (position, segment) in prop_path.segments().iter().enumerate() {
        prefixed = match (segment, root_key) {
            (path::PathSegment::Field(_), Some(key)) if position == 0 => prefixed.child_field(key),
            (path::PathSegment::Field(name), _) => prefixed.child_field(name.clone()),
            (path::PathSegment::Index(index), _) => prefixed.child_index(*index),
        };
    }
    prefixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::props_of;
    use serde_json::Value;
    use std::collections::BTreeSet;

    fn seed(kind: SeedKind, props: Value) -> SeedNode {
        SeedNode::new(kind, props_of(props))
    }

    #[test]
    fn rewrites_widget_and_action_readers() {
        let mut seeds = BTreeMap::new();
        seeds.insert("input1".to_string(), seed(SeedKind::Widget, json!({"value": "x"})));
        seeds.insert(
            "button1".to_string(),
            seed(SeedKind::Widget, json!({"onClick": "{{input1.value}}", "label": "input1"})),
        );
        seeds.insert(
            "query1".to_string(),
            seed(SeedKind::Action, json!({"body": {"q": "{{ input1.value }}"}})),
        );
        let mut in_deps = DependencyMap::new();
        in_deps.insert(
            "input1".to_string(),
            BTreeSet::from(["button1".to_string(), "query1".to_string()]),
        );

        let patches = change_display_name_helper(&in_deps, &seeds, "root", "input1", "input2", RenameKind::DisplayName);
        assert_eq!(patches.widget_slices.len(), 1);
        assert_eq!(patches.widget_slices[0].display_name, "button1");
        assert_eq!(patches.widget_slices[0].patches, vec![(PropPath::field("onClick"), json!("{{input2.value}}"))]);
        assert_eq!(patches.action_slices[0].patches[0].0.to_string(), "body.q");
        assert_eq!(patches.action_slices[0].patches[0].1, json!("{{ input2.value }}"));
    }

    #[test]
    fn global_key_patches_target_the_named_root() {
        let mut seeds = BTreeMap::new();
        seeds.insert(
            "text1".to_string(),
            seed(SeedKind::Widget, json!({"v": "{{ globalData.count }}"})),
        );
        seeds.insert(
            GLOBAL_DATA.to_string(),
            seed(SeedKind::GlobalData, json!({"count": 1, "double": "{{ globalData.count * 2 }}"})),
        );
        let mut in_deps = DependencyMap::new();
        in_deps.insert(
            GLOBAL_DATA.to_string(),
            BTreeSet::from(["text1".to_string(), GLOBAL_DATA.to_string()]),
        );

        let patches = change_display_name_helper(&in_deps, &seeds, "app", "count", "total", RenameKind::GlobalDataKey);
        let root = patches
            .widget_slices
            .iter()
            .find(|slice| slice.display_name == "app")
            .unwrap();
        assert_eq!(root.patches[0].0.to_string(), "globalData.double");
        assert_eq!(root.patches[0].1, json!("{{ globalData.total * 2 }}"));
    }

    #[test]
    fn no_readers_means_no_patches() {
        let patches = change_display_name_helper(
            &DependencyMap::new(),
            &BTreeMap::new(),
            "root",
            "a",
            "b",
            RenameKind::DisplayName,
        );
        assert!(patches.is_empty());
    }
}
