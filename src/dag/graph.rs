// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::api::PipelineSpec;
use crate::resolve::results::node_result_refs;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate pipeline task name '{0}'")]
    DuplicateTask(String),

    #[error("pipeline task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("cycle detected in pipeline graph involving task '{0}'")]
    Cycle(String),
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<String>,
    dependents: Vec<String>,
}

/// Immutable dependency graph of a pipeline, keyed by node name.
///
/// Rebuilt from the pipeline spec on every reconciliation pass. Edges come
/// from `run_after`, resource `from` links and `$(tasks.X.results.Y)`
/// references in node and condition parameters.
#[derive(Debug, Clone)]
pub struct DagGraph {
    /// Node names in definition order.
    order: Vec<String>,
    nodes: BTreeMap<String, DagNode>,
}

impl DagGraph {
    pub fn build(spec: &PipelineSpec) -> Result<Self, GraphError> {
        let mut order = Vec::with_capacity(spec.tasks.len());
        let mut nodes: BTreeMap<String, DagNode> = BTreeMap::new();

        for task in &spec.tasks {
            if nodes.insert(task.name.clone(), DagNode::default()).is_some() {
                return Err(GraphError::DuplicateTask(task.name.clone()));
            }
            order.push(task.name.clone());
        }

        for task in &spec.tasks {
            let mut deps: Vec<String> = Vec::new();
            let mut push = |dep: &str| {
                if !deps.iter().any(|d| d == dep) {
                    deps.push(dep.to_string());
                }
            };

            task.run_after.iter().for_each(|d| push(d));
            for input in &task.resources.inputs {
                input.from.iter().for_each(|d| push(d));
            }
            for cond in &task.conditions {
                for input in &cond.resources {
                    input.from.iter().for_each(|d| push(d));
                }
            }
            for r in node_result_refs(task) {
                push(&r.task);
            }

            for dep in &deps {
                if dep == &task.name {
                    return Err(GraphError::Cycle(task.name.clone()));
                }
                if !nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            for dep in &deps {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(task.name.clone());
                }
            }
            if let Some(node) = nodes.get_mut(&task.name) {
                node.deps = deps;
            }
        }

        let graph = Self { order, nodes };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in &self.order {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(GraphError::Cycle(cycle.node_id().to_string())),
        }
    }

    /// All node names, in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Direct predecessors of a node.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Direct successors of a node.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes without predecessors.
    pub fn roots(&self) -> Vec<&str> {
        self.tasks()
            .filter(|name| self.dependencies_of(name).is_empty())
            .collect()
    }

    /// Topological order, ties broken by definition order.
    ///
    /// Kahn's algorithm over a ready set keyed by definition position.
    /// `petgraph::algo::toposort` gives no ordering among independent nodes,
    /// and dry-run output must be stable.
    pub fn topological_order(&self) -> Vec<String> {
        let position: BTreeMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(name, node)| (name.as_str(), node.deps.len()))
            .collect();

        let mut ready: BTreeSet<(usize, &str)> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| (position[name], *name))
            .collect();
        let mut out = Vec::with_capacity(self.order.len());

        while let Some((_, name)) = ready.pop_first() {
            out.push(name.to_string());
            for dependent in self.dependents_of(name) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((position[dependent.as_str()], dependent.as_str()));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Param, PipelineTask, PipelineTaskInputResource, TaskReference};

    fn node(name: &str) -> PipelineTask {
        PipelineTask::new(name, TaskReference::named("t"))
    }

    fn spec(tasks: Vec<PipelineTask>) -> PipelineSpec {
        PipelineSpec {
            tasks,
            ..Default::default()
        }
    }

    #[test]
    fn edges_come_from_run_after_from_and_results() {
        let a = node("a");
        let mut b = node("b");
        b.run_after = vec!["a".to_string()];
        let mut c = node("c");
        c.resources.inputs.push(PipelineTaskInputResource {
            name: "src".to_string(),
            resource: "repo".to_string(),
            from: vec!["b".to_string()],
        });
        let mut d = node("d");
        d.params.push(Param::new("x", "$(tasks.a.results.out)-$(tasks.c.results.y)"));

        let g = DagGraph::build(&spec(vec![a, b, c, d])).unwrap();
        assert_eq!(g.dependencies_of("b"), ["a".to_string()]);
        assert_eq!(g.dependencies_of("c"), ["b".to_string()]);
        assert_eq!(g.dependencies_of("d"), ["a".to_string(), "c".to_string()]);
        assert_eq!(g.dependents_of("a"), ["b".to_string(), "d".to_string()]);
        assert_eq!(g.roots(), vec!["a"]);
        assert_eq!(g.topological_order(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_is_reported() {
        let mut a = node("a");
        a.run_after = vec!["b".to_string()];
        let mut b = node("b");
        b.run_after = vec!["a".to_string()];

        let err = DagGraph::build(&spec(vec![a, b])).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut a = node("a");
        a.params.push(Param::new("x", "$(tasks.a.results.r)"));
        let err = DagGraph::build(&spec(vec![a])).unwrap_err();
        assert_eq!(err, GraphError::Cycle("a".to_string()));
    }

    #[test]
    fn unknown_and_duplicate_names_are_rejected() {
        let mut a = node("a");
        a.run_after = vec!["missing".to_string()];
        assert!(matches!(
            DagGraph::build(&spec(vec![a])),
            Err(GraphError::UnknownDependency { .. })
        ));

        assert_eq!(
            DagGraph::build(&spec(vec![node("a"), node("a")])).unwrap_err(),
            GraphError::DuplicateTask("a".to_string())
        );
    }

    #[test]
    fn topological_order_prefers_definition_order() {
        let a = node("a");
        let b = node("b");
        let mut c = node("c");
        c.run_after = vec!["b".to_string(), "a".to_string()];
        let g = DagGraph::build(&spec(vec![c.clone(), b, a])).unwrap();
        assert_eq!(g.topological_order(), vec!["b", "a", "c"]);
    }
}
