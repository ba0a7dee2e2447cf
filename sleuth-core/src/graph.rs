//! Investigation graph construction.
//!
//! Turns a flat, classified step sequence into nodes and typed edges. The
//! producer never emits explicit structure; the edge policy is derived from
//! each step's role and its position:
//!
//! - the first node is the root and has no incoming edge;
//! - `Sequential` and `Inference` nodes hang off the previous node;
//! - `Branch` nodes hang off the latest main-chain node, one level deeper;
//! - `CrossValidate` nodes get a back-reference to the node
//!   `cross_validate_lookback` positions earlier (clamped to the root) in
//!   addition to the ordinary edge from the previous node.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{StepClassifier, classify_all};
use crate::types::{ClassifiedStep, Edge, EdgeId, EdgeKind, Node, NodeId, Step, StepRole};

pub const DEFAULT_CROSS_VALIDATE_LOOKBACK: usize = 2;

/// Nodes plus edges, fully built before any reveal starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl InvestigationGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn incoming(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn role_counts(&self) -> HashMap<StepRole, usize> {
        let mut counts = HashMap::new();
        for node in &self.nodes {
            *counts.entry(node.role).or_insert(0) += 1;
        }
        counts
    }

    /// Project onto a `petgraph` digraph. Node weights are node ids, edge
    /// weights are edge kinds; `petgraph` indices follow build order.
    pub fn to_digraph(&self) -> DiGraph<NodeId, EdgeKind> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut index: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            index.insert(node.id, graph.add_node(node.id));
        }
        for edge in &self.edges {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(s, t, edge.kind);
            }
        }
        graph
    }

    /// Check the structural invariants, returning every violation found.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for edge in &self.edges {
            match (self.node(edge.source), self.node(edge.target)) {
                (Some(s), Some(t)) if s.step_index < t.step_index => {}
                (Some(_), Some(_)) => problems.push(format!(
                    "edge {} ({} -> {}) does not point forward in build order",
                    edge.id, edge.source, edge.target
                )),
                _ => problems.push(format!("edge {} has a dangling endpoint", edge.id)),
            }
        }

        let digraph = self.to_digraph();
        if petgraph::algo::is_cyclic_directed(&digraph) {
            problems.push("graph contains a cycle".to_string());
        }

        if let Some(root) = digraph.node_indices().next() {
            if digraph
                .neighbors_directed(root, petgraph::Direction::Incoming)
                .next()
                .is_some()
            {
                problems.push("root node has an incoming edge".to_string());
            }
            let mut dfs = petgraph::visit::Dfs::new(&digraph, root);
            let mut reached = 0;
            while dfs.next(&digraph).is_some() {
                reached += 1;
            }
            if reached != digraph.node_count() {
                problems.push(format!(
                    "{} of {} nodes unreachable from the root",
                    digraph.node_count() - reached,
                    digraph.node_count()
                ));
            }
        }

        problems
    }
}

/// Builds an [`InvestigationGraph`] from classified steps.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    cross_validate_lookback: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CROSS_VALIDATE_LOOKBACK)
    }
}

impl GraphBuilder {
    /// A lookback of 0 would make a node validate itself; it is raised to 1.
    pub fn new(cross_validate_lookback: usize) -> Self {
        Self {
            cross_validate_lookback: cross_validate_lookback.max(1),
        }
    }

    pub fn cross_validate_lookback(&self) -> usize {
        self.cross_validate_lookback
    }

    /// Classify `steps` with `classifier`, then build.
    pub fn build_steps(
        &self,
        steps: &[Step],
        classifier: &dyn StepClassifier,
    ) -> InvestigationGraph {
        self.build(&classify_all(steps, classifier))
    }

    pub fn build(&self, steps: &[ClassifiedStep]) -> InvestigationGraph {
        let mut graph = InvestigationGraph {
            nodes: Vec::with_capacity(steps.len()),
            edges: Vec::with_capacity(steps.len() + steps.len() / 2),
        };
        // Latest node with branch_depth == 0.
        let mut main_chain_tip: Option<usize> = None;

        for (i, classified) in steps.iter().enumerate() {
            let role = classified.role;
            let mut branch_depth = 0;

            if i > 0 {
                let previous = NodeId(i - 1);
                match role {
                    StepRole::Sequential | StepRole::Inference => {
                        push_edge(&mut graph, previous, NodeId(i), EdgeKind::Sequential);
                    }
                    StepRole::Branch => {
                        let parent = main_chain_tip.unwrap_or(0);
                        branch_depth = graph.nodes[parent].branch_depth + 1;
                        push_edge(&mut graph, NodeId(parent), NodeId(i), EdgeKind::Branch);
                    }
                    StepRole::CrossValidate => {
                        let earlier = i.saturating_sub(self.cross_validate_lookback);
                        push_edge(
                            &mut graph,
                            NodeId(earlier),
                            NodeId(i),
                            EdgeKind::CrossValidate,
                        );
                        push_edge(&mut graph, previous, NodeId(i), EdgeKind::Sequential);
                    }
                }
            }

            if branch_depth == 0 {
                main_chain_tip = Some(i);
            }

            graph.nodes.push(Node {
                id: NodeId(i),
                step_index: i,
                role,
                branch_depth,
                label: classified.step.label.clone(),
                description: classified.step.description.clone(),
            });
        }

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Investigation graph built"
        );
        for problem in graph.check_invariants() {
            warn!(%problem, "Investigation graph invariant violated");
        }
        graph
    }
}

fn push_edge(graph: &mut InvestigationGraph, source: NodeId, target: NodeId, kind: EdgeKind) {
    let id = EdgeId(graph.edges.len());
    graph.edges.push(Edge {
        id,
        source,
        target,
        kind,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordClassifier;

    fn classified(roles: &[StepRole]) -> Vec<ClassifiedStep> {
        roles
            .iter()
            .enumerate()
            .map(|(i, &role)| ClassifiedStep {
                step: Step::new(format!("step {i}"), ""),
                role,
            })
            .collect()
    }

    fn edge_triples(graph: &InvestigationGraph) -> Vec<(usize, usize, EdgeKind)> {
        graph
            .edges
            .iter()
            .map(|e| (e.source.0, e.target.0, e.kind))
            .collect()
    }

    #[test]
    fn scenario_fetch_branch_cross_validate() {
        let steps = vec![
            Step::new("Fetch Price Data", "x"),
            Step::new("Spawn Sub-Investigation", "y"),
            Step::new("Cross-validate Data", "z"),
        ];
        let graph = GraphBuilder::default().build_steps(&steps, &KeywordClassifier::default());

        assert_eq!(graph.len(), 3);
        assert_eq!(
            edge_triples(&graph),
            vec![
                (0, 1, EdgeKind::Branch),
                (0, 2, EdgeKind::CrossValidate),
                (1, 2, EdgeKind::Sequential),
            ]
        );
        assert_eq!(graph.nodes[1].branch_depth, 1);
        assert_eq!(graph.nodes[2].branch_depth, 0);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn empty_input_builds_empty_graph() {
        let graph = GraphBuilder::default().build(&[]);
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn root_never_gets_an_edge_whatever_its_role() {
        for role in StepRole::ALL {
            let graph = GraphBuilder::default().build(&classified(&[role]));
            assert!(graph.edges.is_empty());
            assert_eq!(graph.nodes[0].branch_depth, 0);
            assert_eq!(graph.nodes[0].role, role);
        }
    }

    #[test]
    fn sequential_chain() {
        use StepRole::{Inference, Sequential};
        let graph =
            GraphBuilder::default().build(&classified(&[Sequential, Sequential, Inference]));
        assert_eq!(
            edge_triples(&graph),
            vec![(0, 1, EdgeKind::Sequential), (1, 2, EdgeKind::Sequential)]
        );
    }

    #[test]
    fn branches_attach_to_latest_main_chain_node() {
        use StepRole::{Branch, Sequential};
        let graph = GraphBuilder::default().build(&classified(&[
            Sequential, Sequential, Branch, Branch, Sequential, Branch,
        ]));
        assert_eq!(
            edge_triples(&graph),
            vec![
                (0, 1, EdgeKind::Sequential),
                (1, 2, EdgeKind::Branch),
                (1, 3, EdgeKind::Branch),
                (3, 4, EdgeKind::Sequential),
                (4, 5, EdgeKind::Branch),
            ]
        );
        let depths: Vec<_> = graph.nodes.iter().map(|n| n.branch_depth).collect();
        assert_eq!(depths, [0, 0, 1, 1, 0, 1]);
    }

    #[test]
    fn cross_validate_lookback_is_clamped_and_tunable() {
        use StepRole::{CrossValidate, Sequential};
        let roles = [Sequential, CrossValidate, Sequential, Sequential, CrossValidate];

        let graph = GraphBuilder::default().build(&classified(&roles));
        let cross: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::CrossValidate)
            .map(|e| (e.source.0, e.target.0))
            .collect();
        assert_eq!(cross, [(0, 1), (2, 4)]);
        // Both back-reference and predecessor edge exist for node 1.
        assert_eq!(graph.incoming(NodeId(1)).count(), 2);

        let graph = GraphBuilder::new(3).build(&classified(&roles));
        let sources: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::CrossValidate)
            .map(|e| e.source.0)
            .collect();
        assert_eq!(sources, [0, 1]);

        assert_eq!(GraphBuilder::new(0).cross_validate_lookback(), 1);
    }

    #[test]
    fn digraph_projection_matches() {
        use StepRole::{Branch, CrossValidate, Inference, Sequential};
        let graph = GraphBuilder::default()
            .build(&classified(&[Sequential, Branch, Sequential, CrossValidate, Inference]));
        let digraph = graph.to_digraph();
        assert_eq!(digraph.node_count(), graph.len());
        assert_eq!(digraph.edge_count(), graph.edges.len());
        assert_eq!(graph.outgoing(NodeId(1)).count(), 2);
        assert_eq!(graph.role_counts()[&Sequential], 2);
        assert_eq!(graph.node(NodeId(3)).map(|n| n.role), Some(CrossValidate));
        assert!(graph.node(NodeId(9)).is_none());
    }

    #[test]
    fn invariant_checker_flags_backward_edges() {
        let mut graph = GraphBuilder::default().build(&classified(&[StepRole::Sequential; 3]));
        graph.edges.push(Edge {
            id: EdgeId(99),
            source: NodeId(2),
            target: NodeId(0),
            kind: EdgeKind::CrossValidate,
        });
        let problems = graph.check_invariants();
        assert!(problems.iter().any(|p| p.contains("does not point forward")));
        assert!(problems.iter().any(|p| p.contains("cycle")));
    }

    #[test]
    fn invariant_checker_flags_dangling_edges() {
        let mut graph = GraphBuilder::default().build(&classified(&[StepRole::Sequential; 2]));
        graph.edges.push(Edge {
            id: EdgeId(7),
            source: NodeId(1),
            target: NodeId(5),
            kind: EdgeKind::Sequential,
        });
        let problems = graph.check_invariants();
        assert_eq!(problems, ["edge 7 has a dangling endpoint"]);
    }

    mod prop {
        use super::super::*;
        use proptest::prelude::*;

        fn arb_role() -> impl Strategy<Value = StepRole> {
            prop_oneof![
                Just(StepRole::Sequential),
                Just(StepRole::Branch),
                Just(StepRole::CrossValidate),
                Just(StepRole::Inference),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn built_graphs_hold_invariants(
                roles in proptest::collection::vec(arb_role(), 0..40),
                lookback in 1usize..6,
            ) {
                let steps: Vec<ClassifiedStep> = roles
                    .iter()
                    .map(|&role| ClassifiedStep { step: Step::new("s", ""), role })
                    .collect();
                let graph = GraphBuilder::new(lookback).build(&steps);

                prop_assert_eq!(graph.len(), roles.len());
                if !graph.is_empty() {
                    prop_assert_eq!(graph.incoming(NodeId(0)).count(), 0);
                }
                for node in graph.nodes.iter().skip(1) {
                    prop_assert!(graph.incoming(node.id).count() >= 1);
                }
                for edge in &graph.edges {
                    prop_assert!(edge.source < edge.target);
                }
                prop_assert!(graph.check_invariants().is_empty());
            }
        }
    }
}
