//! Service/module dependency graph.

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::resolved::ResolvedSpec;
use crate::ir::error::{IrError, IrResult};
use crate::ir::graph::{GraphDocument, GraphEdge, GraphNode, NodeGroup};
use crate::ir::section::{entries, Entry};

/// Sections lowered into nodes, with the node type each produces.
const SECTIONS: &[(&str, &str)] = &[("services", "service"), ("modules", "module")];

const LABEL_KEYS: &[&str] = &["label", "name", "title"];
const DEPENDENCY_KEYS: &[&str] = &["depends_on", "dependencies", "uses"];

/// Lower `services` and `modules` into one dependency graph.
///
/// Edges to ids declared in neither section are dropped.
pub fn lower_dependencies(spec: &ResolvedSpec) -> IrResult<GraphDocument> {
    let mut declared: Vec<(&str, &str, Entry<'_>)> = Vec::new();
    let mut known: BTreeSet<String> = BTreeSet::new();

    for &(section, node_type) in SECTIONS {
        for entry in entries(section, spec.section(section))? {
            if !known.insert(entry.id.clone()) {
                return Err(IrError::MalformedEntry {
                    section: section.to_string(),
                    entry: entry.id,
                    reason: "id already declared by another service or module".to_string(),
                });
            }
            declared.push((section, node_type, entry));
        }
    }

    let mut doc = GraphDocument::default();
    for (section, node_type, entry) in &declared {
        doc.nodes.push(GraphNode {
            id: entry.id.clone(),
            label: entry.text(LABEL_KEYS).unwrap_or(&entry.id).to_string(),
            node_type: (*node_type).to_string(),
            domain: entry.text(&["domain", "layer"]).map(str::to_string),
        });

        for target in entry.id_list(DEPENDENCY_KEYS) {
            if known.contains(&target) {
                doc.edges.push(GraphEdge::depends_on(&entry.id, target));
            } else {
                debug!(
                    section = %section,
                    node = %entry.id,
                    target = %target,
                    "Dropping edge to undeclared node"
                );
            }
        }
    }

    for &(section, node_type) in SECTIONS {
        let nodes: Vec<String> = doc
            .nodes
            .iter()
            .filter(|n| n.node_type == node_type)
            .map(|n| n.id.clone())
            .collect();
        if !nodes.is_empty() {
            doc.groups.push(NodeGroup {
                id: section.to_string(),
                label: section.to_string(),
                nodes,
            });
        }
    }

    Ok(doc)
}
