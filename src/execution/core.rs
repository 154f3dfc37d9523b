use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

use super::binding::{self, GLOBAL_DATA};
use super::expr::{DefaultEvaluator, ExpressionEvaluator, Scope};
use super::graph::{DependencyGraph, DependencyMap, EvaluationOrder};
use crate::action::{ActionNode, ActionStore};
use crate::error::EvalError;
use crate::geometry::{LayoutInfo, PixelRect, Rect};
use crate::logging::{EXECUTION_TARGET, LogLevel, Logger, emit, json_kv};
use crate::tree::{ComponentStore, PropPath, Props, path};

/// Where an execution seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    Widget,
    Action,
    GlobalData,
}

/// Raw, unevaluated props of one node plus the bindings found in them.
///
/// `values` are layered over the evaluated props as-is and never scanned for
/// bindings; action run results live there.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedNode {
    pub kind: SeedKind,
    pub props: Props,
    pub values: Props,
    pub dynamic: Vec<(PropPath, String)>,
    pub references: BTreeSet<String>,
}

impl SeedNode {
    pub fn new(kind: SeedKind, props: Props) -> Self {
        let mut dynamic = Vec::new();
        let mut references = BTreeSet::new();
        path::for_each_string(&props, |prop_path, raw| {
            if binding::is_dynamic(raw) {
                references.extend(binding::extract_references(raw));
                dynamic.push((prop_path, raw.to_string()));
            }
        });
        Self {
            kind,
            props,
            values: Props::new(),
            dynamic,
            references,
        }
    }

    pub fn with_values(mut self, values: Props) -> Self {
        self.values = values;
        self
    }
}

/// One failed binding of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub path: String,
    pub kind: EvalError,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Derived, evaluated mirror of the component and action stores.
pub struct ExecutionTree {
    seeds: BTreeMap<String, SeedNode>,
    env: BTreeMap<String, Value>,
    graph: DependencyGraph,
    order: EvaluationOrder,
    result: BTreeMap<String, Value>,
    errors: BTreeMap<String, Vec<ExecutionError>>,
    overrides: BTreeMap<String, Props>,
    layout_info: HashMap<String, LayoutInfo>,
    previews: HashMap<String, LayoutInfo>,
    hashes: HashMap<String, blake3::Hash>,
    dirty: BTreeSet<String>,
    evaluator: Box<dyn ExpressionEvaluator>,
    logger: Option<Logger>,
}

impl fmt::Debug for ExecutionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTree")
            .field("nodes", &self.result.len())
            .field("errors", &self.errors.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl Default for ExecutionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(DefaultEvaluator))
    }

    pub fn with_evaluator(evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        Self {
            seeds: BTreeMap::new(),
            env: BTreeMap::new(),
            graph: DependencyGraph::default(),
            order: EvaluationOrder::default(),
            result: BTreeMap::new(),
            errors: BTreeMap::new(),
            overrides: BTreeMap::new(),
            layout_info: HashMap::new(),
            previews: HashMap::new(),
            hashes: HashMap::new(),
            dirty: BTreeSet::new(),
            evaluator,
            logger: None,
        }
    }

    pub fn set_logger(&mut self, logger: Option<Logger>) {
        self.logger = logger;
    }

    /// Register an environment constant visible to every binding. Components
    /// and actions with the same name shadow it. Takes effect on the next
    /// evaluation pass.
    pub fn set_env(&mut self, name: impl Into<String>, value: Value) {
        self.env.insert(name.into(), value);
    }

    /// Rebuild every seed and evaluate the whole graph.
    pub fn evaluate(&mut self, components: &ComponentStore, actions: &ActionStore) {
        let mut seeds = BTreeMap::new();
        for name in components.display_names() {
            if let Some(seed) = component_seed(components, &name) {
                seeds.insert(name, seed);
            }
        }
        for action in actions.iter() {
            seeds.insert(
                action.display_name.clone(),
                action_seed(action),
            );
        }
        if let Some(seed) = global_seed(components) {
            seeds.insert(GLOBAL_DATA.to_string(), seed);
        }

        let stale: Vec<String> = self
            .result
            .keys()
            .filter(|name| !seeds.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            self.forget(&name);
        }
        self.seeds = seeds;
        self.layout_info.clear();
        for name in components.display_names() {
            if let Some(node) = components.get(&name) {
                self.layout_info.insert(name, LayoutInfo::from(node.rect()));
            }
        }
        self.rebuild_graph();
        let all: BTreeSet<String> = self.seeds.keys().cloned().collect();
        self.evaluate_set(&all);
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            EXECUTION_TARGET,
            "full_evaluation",
            [
                json_kv("nodes", json!(all.len())),
                json_kv("cycles", json!(self.order.cycles.len())),
            ],
        );
    }

    /// Refresh the seeds of `changed` and re-evaluate them together with
    /// everything that depends on them.
    pub fn update(&mut self, components: &ComponentStore, actions: &ActionStore, changed: &[String]) {
        let mut touched: BTreeSet<String> = BTreeSet::new();
        for name in changed {
            let seed = if name == GLOBAL_DATA {
                global_seed(components)
            } else if let Some(seed) = component_seed(components, name) {
                Some(seed)
            } else {
                actions
                    .get(name)
                    .map(action_seed)
            };
            match seed {
                Some(seed) => {
                    self.seeds.insert(name.clone(), seed);
                    if let Some(node) = components.get(name) {
                        self.layout_info
                            .insert(name.clone(), LayoutInfo::from(node.rect()));
                    }
                }
                None => {
                    self.seeds.remove(name);
                    self.forget(name);
                }
            }
            touched.insert(name.clone());
        }
        // Readers of a removed node must be found before its edges go away.
        let mut pending = self.graph.transitive_dependents(touched.iter());
        self.rebuild_graph();
        pending.extend(self.graph.transitive_dependents(touched.iter()));
        pending.extend(touched);
        let pending: BTreeSet<String> = pending
            .into_iter()
            .filter(|name| self.seeds.contains_key(name))
            .collect();
        self.evaluate_set(&pending);
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            EXECUTION_TARGET,
            "incremental_evaluation",
            [
                json_kv("changed", json!(changed)),
                json_kv("evaluated", json!(pending.len())),
            ],
        );
    }

    fn rebuild_graph(&mut self) {
        self.graph = DependencyGraph::build(
            self.seeds
                .iter()
                .map(|(name, seed)| (name, &seed.references)),
        );
        self.order = self.graph.evaluation_order();
    }

    fn evaluate_set(&mut self, names: &BTreeSet<String>) {
        let order: Vec<String> = self
            .order
            .order
            .iter()
            .filter(|name| names.contains(*name))
            .cloned()
            .collect();
        for name in order {
            self.evaluate_node(&name);
        }
    }

    fn evaluate_node(&mut self, name: &str) {
        let Some(seed) = self.seeds.get(name) else {
            return;
        };
        let mut props = seed.props.clone();
        let mut errors = Vec::new();
        let cycle = self.order.cycle_of(name).map(<[String]>::to_vec);
        for (prop_path, raw) in &seed.dynamic {
            let outcome = match &cycle {
                Some(members) if binding::extract_references(raw).iter().any(|r| members.contains(r)) => {
                    Err(EvalError::Cycle(members.clone()))
                }
                _ => {
                    let scope = EvalScope {
                        result: &self.result,
                        env: &self.env,
                    };
                    binding::evaluate_template(raw, self.evaluator.as_ref(), &scope)
                }
            };
            let value = match outcome {
                Ok(value) => value,
                Err(kind) => {
                    errors.push(ExecutionError {
                        path: prop_path.to_string(),
                        kind,
                    });
                    Value::Null
                }
            };
            // Paths come from walking these very props, so they always resolve.
            let _ = path::set(&mut props, prop_path, value);
        }
        for (key, value) in &seed.values {
            props.insert(key.clone(), value.clone());
        }
        if let Some(extra) = self.overrides.get(name) {
            for (key, value) in extra {
                props.insert(key.clone(), value.clone());
            }
        }
        if !errors.is_empty() {
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                EXECUTION_TARGET,
                "binding_failed",
                [
                    json_kv("node", json!(name)),
                    json_kv(
                        "errors",
                        json!(errors.iter().map(ToString::to_string).collect::<Vec<_>>()),
                    ),
                ],
            );
            self.errors.insert(name.to_string(), errors);
        } else {
            self.errors.remove(name);
        }
        self.store_result(name, Value::Object(props));
    }

    fn store_result(&mut self, name: &str, value: Value) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(value.to_string().as_bytes());
        if let Some(errors) = self.errors.get(name) {
            for error in errors {
                hasher.update(error.to_string().as_bytes());
            }
        }
        let hash = hasher.finalize();
        if self.hashes.get(name) != Some(&hash) {
            self.hashes.insert(name.to_string(), hash);
            self.dirty.insert(name.to_string());
        }
        self.result.insert(name.to_string(), value);
    }

    fn forget(&mut self, name: &str) {
        let existed = self.result.remove(name).is_some();
        self.errors.remove(name);
        self.hashes.remove(name);
        self.overrides.remove(name);
        self.layout_info.remove(name);
        self.previews.remove(name);
        if existed {
            self.dirty.insert(name.to_string());
        }
    }

    /// Move every per-node entry from `old` to `new` ahead of a rename commit.
    pub fn rename_entry(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(seed) = self.seeds.remove(old) {
            self.seeds.insert(new.to_string(), seed);
        }
        if let Some(value) = self.result.remove(old) {
            self.result.insert(new.to_string(), value);
        }
        if let Some(errors) = self.errors.remove(old) {
            self.errors.insert(new.to_string(), errors);
        }
        if let Some(extra) = self.overrides.remove(old) {
            self.overrides.insert(new.to_string(), extra);
        }
        if let Some(info) = self.layout_info.remove(old) {
            self.layout_info.insert(new.to_string(), info);
        }
        if let Some(info) = self.previews.remove(old) {
            self.previews.insert(new.to_string(), info);
        }
        self.hashes.remove(old);
        self.hashes.remove(new);
        self.dirty.insert(old.to_string());
        self.dirty.insert(new.to_string());
    }

    /// Layer runtime-only values over a node's evaluated props.
    pub fn update_execution_by_display_name(&mut self, name: &str, values: &Props) {
        let entry = self.overrides.entry(name.to_string()).or_default();
        for (key, value) in values {
            entry.insert(key.clone(), value.clone());
        }
        if let Some(Value::Object(current)) = self.result.get(name).cloned() {
            let mut next = current;
            for (key, value) in values {
                next.insert(key.clone(), value.clone());
            }
            self.store_result(name, Value::Object(next));
        }
    }

    /// Drop overrides for keys the document now sets itself.
    pub fn clear_override_keys<'a, I>(&mut self, name: &str, keys: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(extra) = self.overrides.get_mut(name) {
            for key in keys {
                extra.remove(key);
            }
            if extra.is_empty() {
                self.overrides.remove(name);
            }
        }
    }

    pub fn overrides(&self, name: &str) -> Option<&Props> {
        self.overrides.get(name)
    }

    /// Record a committed rectangle for `name` and drop any preview.
    pub fn sync_layout(&mut self, name: &str, rect: Rect) {
        self.previews.remove(name);
        self.layout_info.insert(name.to_string(), LayoutInfo::from(rect));
    }

    /// Transient drag or resize geometry; never touches the document.
    pub fn preview_layout(&mut self, name: &str, info: LayoutInfo) {
        self.previews.insert(name.to_string(), info);
    }

    /// End a preview, returning the snapped rectangle to commit.
    pub fn take_preview(&mut self, name: &str) -> Option<Rect> {
        self.previews.remove(name).map(|info| info.snap())
    }

    pub fn layout_info(&self, name: &str) -> Option<LayoutInfo> {
        self.previews
            .get(name)
            .or_else(|| self.layout_info.get(name))
            .copied()
    }

    /// Pixel box of a node, `None` when the node is unknown.
    pub fn real_shape_and_position(&self, name: &str, unit_w: f64) -> Option<PixelRect> {
        self.layout_info(name).map(|info| info.to_pixels(unit_w))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.result.get(name)
    }

    pub fn result(&self) -> &BTreeMap<String, Value> {
        &self.result
    }

    pub fn errors(&self, name: &str) -> &[ExecutionError] {
        self.errors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_errors(&self) -> &BTreeMap<String, Vec<ExecutionError>> {
        &self.errors
    }

    pub fn seeds(&self) -> &BTreeMap<String, SeedNode> {
        &self.seeds
    }

    pub fn dependencies_map(&self) -> &DependencyMap {
        self.graph.dependencies_map()
    }

    pub fn in_dependencies_map(&self) -> &DependencyMap {
        self.graph.in_dependencies_map()
    }

    pub fn evaluation_order(&self) -> &EvaluationOrder {
        &self.order
    }

    /// Names whose evaluated content changed since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty)
    }
}

struct EvalScope<'a> {
    result: &'a BTreeMap<String, Value>,
    env: &'a BTreeMap<String, Value>,
}

impl Scope for EvalScope<'_> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.result.get(name).or_else(|| self.env.get(name))
    }
}

fn component_seed(components: &ComponentStore, name: &str) -> Option<SeedNode> {
    let node = components.get(name)?;
    let mut props = node.props.clone();
    // Global data gets its own seed, so widgets do not read it through the root.
    if components.root_name() == Some(name) {
        props.remove(GLOBAL_DATA);
    }
    props.insert("displayName".into(), json!(node.display_name));
    Some(SeedNode::new(SeedKind::Widget, props))
}

fn action_seed(action: &ActionNode) -> SeedNode {
    SeedNode::new(SeedKind::Action, action.props.clone()).with_values(action.run_values())
}

fn global_seed(components: &ComponentStore) -> Option<SeedNode> {
    components
        .global_data()
        .map(|data| SeedNode::new(SeedKind::GlobalData, data.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionResult;
    use crate::tree::{ComponentNode, ComponentType, props_of};

    fn widget(name: &str, props: Value) -> ComponentNode {
        ComponentNode::new(name, ComponentType::TextWidget)
            .with_parent("page1")
            .with_rect(Rect::new(0, 0, 4, 4))
            .with_props(props)
    }

    fn stores(widgets: Vec<ComponentNode>) -> (ComponentStore, ActionStore) {
        let mut components = ComponentStore::new();
        let root = ComponentNode::root()
            .with_children(vec![ComponentNode::page("page1").with_children(widgets)]);
        components.init_tree(root).unwrap();
        (components, ActionStore::new())
    }

    #[test]
    fn bindings_resolve_across_widgets() {
        let (components, actions) = stores(vec![
            widget("input1", json!({"value": "ada"})),
            widget("text1", json!({"text": "Hi {{ input1.value }}", "raw": "{{ input1.value }}"})),
        ]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        assert_eq!(tree.get("text1").unwrap()["text"], json!("Hi ada"));
        assert!(tree.in_dependencies_map()["input1"].contains("text1"));
        assert!(tree.errors("text1").is_empty());
    }

    #[test]
    fn cycle_marks_members_and_spares_others() {
        let (components, actions) = stores(vec![
            widget("a", json!({"v": "{{ b.v }}"})),
            widget("b", json!({"v": "{{ a.v }}"})),
            widget("c", json!({"v": "{{ 1 + 1 }}"})),
        ]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        assert!(matches!(tree.errors("a")[0].kind, EvalError::Cycle(_)));
        assert!(matches!(tree.errors("b")[0].kind, EvalError::Cycle(_)));
        assert_eq!(tree.get("a").unwrap()["v"], Value::Null);
        assert!(tree.errors("c").is_empty());
        assert_eq!(tree.get("c").unwrap()["v"], json!(2));
    }

    #[test]
    fn failing_binding_records_an_error() {
        let (components, actions) = stores(vec![widget("text1", json!({"a": "{{ ghost.value }}", "b": "ok"}))]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        let errors = tree.errors("text1");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "a");
        assert_eq!(errors[0].kind, EvalError::UnresolvedReference("ghost".into()));
        assert_eq!(tree.get("text1").unwrap()["b"], json!("ok"));
    }

    #[test]
    fn update_only_touches_dependents() {
        let (mut components, actions) = stores(vec![
            widget("input1", json!({"value": 1})),
            widget("text1", json!({"v": "{{ input1.value * 2 }}"})),
            widget("other", json!({"v": "static"})),
        ]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        tree.take_dirty();

        components.update_props("input1", &props_of(json!({"value": 5})));
        tree.update(&components, &actions, &["input1".to_string()]);
        assert_eq!(tree.get("text1").unwrap()["v"], json!(10));
        let dirty: Vec<String> = tree.take_dirty().into_iter().collect();
        assert_eq!(dirty, vec!["input1", "text1"]);
    }

    #[test]
    fn actions_and_global_data_feed_bindings() {
        let (mut components, mut actions) = stores(vec![widget(
            "list1",
            json!({"rows": "{{ query1.data }}", "title": "{{ globalData.title }}"}),
        )]);
        components.set_global_state("title", json!("Users"), None);
        actions.add(ActionNode::new("query1", "restapi"));
        actions.complete_run("query1", ActionResult::ok(json!([1, 2])));
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        assert_eq!(tree.get("list1").unwrap()["rows"], json!([1, 2]));
        assert_eq!(tree.get("list1").unwrap()["title"], json!("Users"));
    }

    #[test]
    fn action_results_are_values_not_bindings() {
        let (components, mut actions) = stores(vec![
            widget("input1", json!({"value": "x"})),
            widget("text1", json!({"v": "{{ query1.data.msg }}"})),
        ]);
        actions.add(ActionNode::new("query1", "restapi"));
        actions.complete_run(
            "query1",
            ActionResult::ok(json!({"msg": "{{ 1 + 1 }}", "echo": "{{ input1.value }}"})),
        );
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        assert_eq!(tree.get("text1").unwrap()["v"], json!("{{ 1 + 1 }}"));
        assert_eq!(tree.get("query1").unwrap()["data"]["echo"], json!("{{ input1.value }}"));
        assert!(tree.dependencies_map()["query1"].is_empty());
        assert!(!tree.in_dependencies_map().contains_key("input1"));
    }

    #[test]
    fn env_constants_are_visible() {
        let (components, actions) = stores(vec![widget("text1", json!({"v": "{{ builderInfo.version }}"}))]);
        let mut tree = ExecutionTree::new();
        tree.set_env("builderInfo", json!({"version": "2.0"}));
        tree.evaluate(&components, &actions);
        assert_eq!(tree.get("text1").unwrap()["v"], json!("2.0"));
    }

    #[test]
    fn overrides_layer_over_evaluated_props() {
        let (components, actions) = stores(vec![widget("tabs1", json!({"currentIndex": 0}))]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        tree.update_execution_by_display_name("tabs1", &props_of(json!({"currentIndex": 2})));
        assert_eq!(tree.get("tabs1").unwrap()["currentIndex"], json!(2));
        tree.update(&components, &actions, &["tabs1".to_string()]);
        assert_eq!(tree.get("tabs1").unwrap()["currentIndex"], json!(2));
        tree.clear_override_keys("tabs1", ["currentIndex"]);
        tree.update(&components, &actions, &["tabs1".to_string()]);
        assert_eq!(tree.get("tabs1").unwrap()["currentIndex"], json!(0));
        assert!(tree.overrides("tabs1").is_none());
    }

    #[test]
    fn previews_do_not_touch_the_document() {
        let (components, actions) = stores(vec![widget("text1", json!({}))]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        tree.preview_layout("text1", LayoutInfo::new(1.6, 2.2, 4.0, 4.0));
        let px = tree.real_shape_and_position("text1", 10.0).unwrap();
        assert_eq!(px.left, 16.0);
        assert_eq!(components.get("text1").unwrap().rect(), Rect::new(0, 0, 4, 4));
        assert_eq!(tree.take_preview("text1"), Some(Rect::new(2, 2, 4, 4)));
        assert_eq!(tree.layout_info("text1"), Some(LayoutInfo::new(0.0, 0.0, 4.0, 4.0)));
        assert!(tree.real_shape_and_position("ghost", 10.0).is_none());
    }

    #[test]
    fn removed_nodes_leave_the_result() {
        let (mut components, actions) = stores(vec![widget("text1", json!({}))]);
        let mut tree = ExecutionTree::new();
        tree.evaluate(&components, &actions);
        tree.take_dirty();
        components.delete_nodes(&["text1".to_string()]);
        tree.update(&components, &actions, &["text1".to_string()]);
        assert!(tree.get("text1").is_none());
        assert!(tree.take_dirty().contains("text1"));
    }
}
