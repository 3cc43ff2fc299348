//! Directed-graph document shared by the capabilities and dependencies IRs.

use serde::Serialize;

/// A graph node.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A directed edge. `source` depends on `target`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl GraphEdge {
    pub fn depends_on(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: "depends_on".to_string(),
        }
    }
}

/// A cluster of node ids.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeGroup {
    pub id: String,
    pub label: String,
    pub nodes: Vec<String>,
}

/// Nodes, edges and clusters of a directed graph.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub groups: Vec<NodeGroup>,
}

impl GraphDocument {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
