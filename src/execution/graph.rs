use std::collections::{BTreeMap, BTreeSet};

pub type DependencyMap = BTreeMap<String, BTreeSet<String>>;

/// Evaluation schedule derived from the dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationOrder {
    /// Every node, dependencies before dependents.
    pub order: Vec<String>,
    /// Strongly connected groups that form cycles, each sorted.
    pub cycles: Vec<Vec<String>>,
}

impl EvaluationOrder {
    pub fn cycle_of(&self, name: &str) -> Option<&[String]> {
        self.cycles
            .iter()
            .find(|cycle| cycle.iter().any(|member| member == name))
            .map(Vec::as_slice)
    }
}

/// Node-level dependency edges between execution seeds.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: DependencyMap,
    in_dependencies: DependencyMap,
}

impl DependencyGraph {
    /// Build from each node's referenced names. References to unknown nodes
    /// are dropped; they fail at evaluation as unresolved.
    pub fn build<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a BTreeSet<String>)>,
    {
        let nodes: Vec<(&String, &BTreeSet<String>)> = nodes.into_iter().collect();
        let known: BTreeSet<&str> = nodes.iter().map(|(name, _)| name.as_str()).collect();
        let mut graph = Self::default();
        for (name, references) in &nodes {
            let edges: BTreeSet<String> = references
                .iter()
                .filter(|reference| known.contains(reference.as_str()))
                .cloned()
                .collect();
            for target in &edges {
                graph
                    .in_dependencies
                    .entry(target.clone())
                    .or_default()
                    .insert((*name).clone());
            }
            graph.dependencies.insert((*name).clone(), edges);
        }
        graph
    }

    pub fn dependencies_map(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn in_dependencies_map(&self) -> &DependencyMap {
        &self.in_dependencies
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// Every node that reads `start`, directly or transitively.
    pub fn transitive_dependents<'a, I>(&self, start: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = start.into_iter().cloned().collect();
        while let Some(name) = stack.pop() {
            if let Some(readers) = self.in_dependencies.get(&name) {
                for reader in readers {
                    if seen.insert(reader.clone()) {
                        stack.push(reader.clone());
                    }
                }
            }
        }
        seen
    }

    /// Tarjan's strongly connected components over name-sorted nodes. With
    /// edges pointing at dependencies, components come out dependencies first.
    pub fn evaluation_order(&self) -> EvaluationOrder {
        let mut state = Tarjan {
            graph: self,
            index: 0,
            indices: BTreeMap::new(),
            low: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            result: EvaluationOrder::default(),
        };
        for name in self.dependencies.keys() {
            if !state.indices.contains_key(name.as_str()) {
                state.connect(name);
            }
        }
        state.result
    }
}

struct Tarjan<'g> {
    graph: &'g DependencyGraph,
    index: usize,
    indices: BTreeMap<&'g str, usize>,
    low: BTreeMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: BTreeSet<&'g str>,
    result: EvaluationOrder,
}

impl<'g> Tarjan<'g> {
    /// Depth-first from `start` on an explicit frame stack.
    fn connect(&mut self, start: &'g str) {
        let mut frames: Vec<(&'g str, Vec<&'g str>)> = Vec::new();
        self.visit(start);
        frames.push((start, self.edges(start)));
        while let Some(frame) = frames.last_mut() {
            let name = frame.0;
            if let Some(target) = frame.1.pop() {
                if !self.indices.contains_key(target) {
                    self.visit(target);
                    frames.push((target, self.edges(target)));
                } else if self.on_stack.contains(target) {
                    let low = self.low[name].min(self.indices[target]);
                    self.low.insert(name, low);
                }
                continue;
            }
            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                let low = self.low[parent].min(self.low[name]);
                self.low.insert(parent, low);
            }
            if self.low[name] == self.indices[name] {
                self.close(name);
            }
        }
    }

    fn visit(&mut self, name: &'g str) {
        self.indices.insert(name, self.index);
        self.low.insert(name, self.index);
        self.index += 1;
        self.stack.push(name);
        self.on_stack.insert(name);
    }

    /// Outgoing edges, reversed so popping walks them in name order.
    fn edges(&self, name: &str) -> Vec<&'g str> {
        let graph = self.graph;
        graph
            .dependencies
            .get(name)
            .map(|edges| edges.iter().rev().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn close(&mut self, name: &'g str) {
        let graph = self.graph;
        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack.remove(member);
            component.push(member.to_string());
            if member == name {
                break;
            }
        }
        component.sort();
        let self_loop = graph
            .dependencies
            .get(name)
            .is_some_and(|edges| edges.contains(name));
        if component.len() > 1 || self_loop {
            self.result.cycles.push(component.clone());
        }
        self.result.order.extend(component);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let nodes: BTreeMap<String, BTreeSet<String>> = edges
            .iter()
            .map(|(name, refs)| {
                (
                    name.to_string(),
                    refs.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect();
        DependencyGraph::build(&nodes)
    }

    fn position(order: &EvaluationOrder, name: &str) -> usize {
        order.order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let graph = graph(&[("button1", &["input1"]), ("input1", &[]), ("text1", &["button1", "input1"])]);
        let order = graph.evaluation_order();
        assert!(position(&order, "input1") < position(&order, "button1"));
        assert!(position(&order, "button1") < position(&order, "text1"));
        assert!(order.cycles.is_empty());
    }

    #[test]
    fn cycles_are_reported_without_dropping_nodes() {
        let graph = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[]), ("d", &["d"])]);
        let order = graph.evaluation_order();
        assert_eq!(order.order.len(), 4);
        assert_eq!(order.cycles, vec![vec!["a".to_string(), "b".to_string()], vec!["d".to_string()]]);
        assert_eq!(order.cycle_of("b").map(<[String]>::len), Some(2));
        assert!(order.cycle_of("c").is_none());
    }

    #[test]
    fn unknown_references_add_no_edges() {
        let graph = graph(&[("a", &["ghost", "b"]), ("b", &[])]);
        assert_eq!(graph.dependencies_of("a").unwrap().len(), 1);
        assert!(graph.in_dependencies_map()["b"].contains("a"));
    }

    #[test]
    fn dependents_are_transitive() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let dependents = graph.transitive_dependents([&"a".to_string()]);
        assert_eq!(dependents.into_iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn long_chains_order_without_recursion() {
        let names: Vec<String> = (0..20_000).map(|i| format!("n{i:05}")).collect();
        let nodes: BTreeMap<String, BTreeSet<String>> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let refs = names.get(i + 1).cloned().into_iter().collect();
                (name.clone(), refs)
            })
            .collect();
        let order = DependencyGraph::build(&nodes).evaluation_order();
        assert!(order.cycles.is_empty());
        assert_eq!(order.order.len(), names.len());
        assert_eq!(order.order.first().map(String::as_str), Some("n19999"));
        assert_eq!(order.order.last().map(String::as_str), Some("n00000"));
    }
}
