use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rundag::api::PipelineSpec;
use rundag::dag::{DagGraph, NodeState, Readiness};
use rundag::resolve::validate::validate_pipeline_spec;
use rundag_test_utils::builders::{NodeBuilder, PipelineBuilder};

// Acyclic by construction: node N may only run after nodes 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = PipelineSpec> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            move |raw| {
                let mut builder = PipelineBuilder::new("prop");
                for (i, picks) in raw.into_iter().enumerate() {
                    let mut node = NodeBuilder::new(&format!("task-{i}"), "t");
                    let deps: BTreeSet<usize> = picks
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|p| p % i)
                        .collect();
                    for d in deps {
                        node = node.after(&format!("task-{d}"));
                    }
                    builder = builder.task(node.build());
                }
                builder.spec()
            },
        )
    })
}

fn state_strategy() -> impl Strategy<Value = NodeState> {
    prop_oneof![
        Just(NodeState::Pending),
        Just(NodeState::Running),
        Just(NodeState::Succeeded),
        Just(NodeState::Failed),
        Just(NodeState::Cancelled),
        Just(NodeState::ConditionFailed),
    ]
}

proptest! {
    #[test]
    fn generated_pipelines_pass_validation(spec in dag_strategy(12)) {
        prop_assert!(validate_pipeline_spec(&spec).is_ok());
        prop_assert!(DagGraph::build(&spec).is_ok());
    }

    #[test]
    fn topological_order_respects_dependencies(spec in dag_strategy(12)) {
        let graph = DagGraph::build(&spec).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let order = graph.topological_order();
        prop_assert_eq!(order.len(), spec.tasks.len());

        let position: BTreeMap<&str, usize> =
            order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        for task in &spec.tasks {
            for dep in graph.dependencies_of(&task.name) {
                prop_assert!(position[dep.as_str()] < position[task.name.as_str()]);
            }
        }
    }

    #[test]
    fn schedulable_nodes_have_succeeded_predecessors(
        spec in dag_strategy(10),
        states in proptest::collection::vec(state_strategy(), 10),
    ) {
        let graph = DagGraph::build(&spec).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let observed: BTreeMap<String, NodeState> = spec
            .tasks
            .iter()
            .zip(states)
            .map(|(t, s)| (t.name.clone(), s))
            .collect();
        let readiness = Readiness::new(&graph, &observed);

        for name in readiness.schedulable() {
            prop_assert_eq!(readiness.state_of(&name), NodeState::Pending);
            prop_assert!(!readiness.is_skipped(&name));
            for dep in graph.dependencies_of(&name) {
                prop_assert_eq!(readiness.state_of(dep), NodeState::Succeeded);
            }
        }

        let summary = readiness.summary();
        prop_assert_eq!(
            summary.succeeded + summary.failed + summary.cancelled + summary.skipped + summary.incomplete,
            spec.tasks.len()
        );
    }

    #[test]
    fn succeeding_every_schedulable_node_finishes_the_graph(spec in dag_strategy(12)) {
        let graph = DagGraph::build(&spec).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut observed: BTreeMap<String, NodeState> = BTreeMap::new();

        let mut rounds = 0;
        loop {
            let next = Readiness::new(&graph, &observed).schedulable();
            if next.is_empty() {
                break;
            }
            for name in next {
                prop_assert!(observed.insert(name, NodeState::Succeeded).is_none());
            }
            rounds += 1;
            prop_assert!(rounds <= spec.tasks.len());
        }

        let readiness = Readiness::new(&graph, &observed);
        prop_assert!(readiness.all_terminal());
        prop_assert_eq!(readiness.summary().succeeded, spec.tasks.len());
    }

    #[test]
    fn failure_skips_exactly_the_unstarted_descendants(
        spec in dag_strategy(10),
        failing in 0usize..10,
    ) {
        let graph = DagGraph::build(&spec).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let failing = format!("task-{}", failing % spec.tasks.len());
        let observed = BTreeMap::from([(failing.clone(), NodeState::Failed)]);
        let readiness = Readiness::new(&graph, &observed);

        let mut descendants = BTreeSet::new();
        let mut frontier = vec![failing.clone()];
        while let Some(n) = frontier.pop() {
            for d in graph.dependents_of(&n) {
                if descendants.insert(d.clone()) {
                    frontier.push(d.clone());
                }
            }
        }

        for task in &spec.tasks {
            let name = task.name.as_str();
            prop_assert_eq!(readiness.is_skipped(name), descendants.contains(name));
        }
    }
}
