//! Text, JSON, Graphviz DOT and Mermaid renderings of a graph or of the
//! visible part of a reveal.

use std::fmt::Write;
use std::str::FromStr;

use serde_json::{Value, json};

use crate::graph::InvestigationGraph;
use crate::reveal::RevealState;
use crate::types::{Edge, EdgeKind, Node, Position, StepRole};

/// Horizontal and vertical distance between laid-out nodes.
pub const NODE_SPACING: (f64, f64) = (250.0, 150.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
    Dot,
    Mermaid,
}

impl Format {
    pub const ALL: [Self; 4] = [Self::Text, Self::Json, Self::Dot, Self::Mermaid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Dot => "dot",
            Self::Mermaid => "mermaid",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown format {s:?}, expected text, json, dot or mermaid"))
    }
}

pub fn render_graph(graph: &InvestigationGraph, format: Format) -> String {
    render_parts(&graph.nodes, &graph.edges, format, None)
}

/// Only what is currently visible. JSON output also carries phase and cursor.
pub fn render_state(state: &RevealState, format: Format) -> String {
    render_parts(&state.visible_nodes, &state.visible_edges, format, Some(state))
}

fn render_parts(
    nodes: &[Node],
    edges: &[Edge],
    format: Format,
    state: Option<&RevealState>,
) -> String {
    match format {
        Format::Text => text(nodes, edges),
        Format::Json => {
            let mut doc = json!({
                "nodes": nodes.iter().map(node_json).collect::<Vec<_>>(),
                "edges": edges,
            });
            if let (Some(state), Value::Object(map)) = (state, &mut doc) {
                map.insert("phase".into(), json!(state.phase));
                map.insert("cursor".into(), json!(state.cursor));
            }
            format!("{doc:#}")
        }
        Format::Dot => dot(nodes, edges),
        Format::Mermaid => mermaid(nodes, edges),
    }
}

fn node_json(node: &Node) -> Value {
    json!({
        "id": node.id,
        "step_index": node.step_index,
        "role": node.role,
        "branch_depth": node.branch_depth,
        "label": node.label,
        "description": node.description,
        "position": Position::for_node(node, NODE_SPACING),
    })
}

fn text(nodes: &[Node], edges: &[Edge]) -> String {
    let mut out = String::new();
    for node in nodes {
        let indent = "  ".repeat(node.branch_depth as usize);
        let _ = writeln!(out, "{indent}[{}] {} ({})", node.id, node.label, node.role);
        for line in node.description.lines().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "{indent}    {}", line.trim());
        }
    }
    if !edges.is_empty() {
        out.push('\n');
        for edge in edges {
            let _ = writeln!(out, "{} -> {} {}", edge.source, edge.target, edge.kind);
        }
    }
    out
}

fn dot(nodes: &[Node], edges: &[Edge]) -> String {
    let mut out = String::from("digraph investigation {\n  rankdir=LR;\n  node [shape=box];\n");
    for node in nodes {
        let shape = match node.role {
            StepRole::Inference => ", shape=doubleoctagon",
            StepRole::CrossValidate => ", shape=diamond",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  n{} [label=\"{}\"{shape}];",
            node.id,
            escape_dot(&node.label)
        );
    }
    for edge in edges {
        let style = match edge.kind {
            EdgeKind::Sequential => "solid",
            EdgeKind::Branch => "dashed",
            EdgeKind::CrossValidate => "dotted",
        };
        let _ = writeln!(
            out,
            "  n{} -> n{} [label=\"{}\", style={style}];",
            edge.source, edge.target, edge.kind
        );
    }
    out.push_str("}\n");
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn mermaid(nodes: &[Node], edges: &[Edge]) -> String {
    let mut out = String::from("flowchart LR\n");
    for node in nodes {
        let label = node.label.replace('"', "#quot;").replace('\n', " ");
        let _ = writeln!(out, "  n{}[\"{label}\"]", node.id);
    }
    for edge in edges {
        let arrow = match edge.kind {
            EdgeKind::Sequential => "-->",
            EdgeKind::Branch => "==>",
            EdgeKind::CrossValidate => "-.->",
        };
        let _ = writeln!(
            out,
            "  n{} {arrow}|{}| n{}",
            edge.source, edge.kind, edge.target
        );
    }
    out
}
