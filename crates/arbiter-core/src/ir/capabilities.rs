//! Capability map: one node per declared capability, clustered by domain.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::resolved::ResolvedSpec;
use crate::ir::error::IrResult;
use crate::ir::graph::{GraphDocument, GraphEdge, GraphNode, NodeGroup};
use crate::ir::section::entries;

pub const SECTION: &str = "capabilities";

/// Domain assigned to capabilities that do not declare one.
pub const DEFAULT_DOMAIN: &str = "default";

const LABEL_KEYS: &[&str] = &["label", "name", "title"];
const DEPENDENCY_KEYS: &[&str] = &["depends_on", "dependencies", "requires"];

/// Lower the `capabilities` section into a graph grouped by `domain`.
pub fn lower_capabilities(spec: &ResolvedSpec) -> IrResult<GraphDocument> {
    let declared = entries(SECTION, spec.section(SECTION))?;
    let known: BTreeSet<&str> = declared.iter().map(|e| e.id.as_str()).collect();

    let mut doc = GraphDocument::default();
    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in &declared {
        let label = entry.text(LABEL_KEYS).unwrap_or(&entry.id).to_string();
        let domain = entry.text(&["domain"]).unwrap_or(DEFAULT_DOMAIN).to_string();

        by_domain
            .entry(domain.clone())
            .or_default()
            .push(entry.id.clone());

        doc.nodes.push(GraphNode {
            id: entry.id.clone(),
            label,
            node_type: "capability".to_string(),
            domain: Some(domain),
        });

        for target in entry.id_list(DEPENDENCY_KEYS) {
            if known.contains(target.as_str()) {
                doc.edges.push(GraphEdge::depends_on(&entry.id, target));
            } else {
                debug!(
                    capability = %entry.id,
                    target = %target,
                    "Dropping edge to undeclared capability"
                );
            }
        }
    }

    doc.groups = by_domain
        .into_iter()
        .map(|(domain, nodes)| NodeGroup {
            id: domain.clone(),
            label: domain,
            nodes,
        })
        .collect();

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> ResolvedSpec {
        ResolvedSpec::from_value(value).unwrap()
    }

    #[test]
    fn test_three_capabilities_two_domains() {
        let doc = lower_capabilities(&spec(json!({
            "capabilities": {
                "login": { "name": "User login", "domain": "identity" },
                "signup": { "name": "User signup", "domain": "identity", "depends_on": ["login"] },
                "invoice": { "name": "Invoicing", "domain": "billing", "requires": "login" }
            }
        })))
        .unwrap();

        assert_eq!(doc.nodes.len(), 3);
        let domains: BTreeSet<_> = doc.nodes.iter().filter_map(|n| n.domain.clone()).collect();
        assert_eq!(domains.len(), 2);
        assert_eq!(doc.groups.len(), 2);
        assert_eq!(doc.edges.len(), 2);
        assert!(doc.nodes.iter().all(|n| !n.id.is_empty() && !n.label.is_empty()));
        assert!(doc.nodes.iter().all(|n| n.node_type == "capability"));
    }

    #[test]
    fn test_label_falls_back_to_id_and_default_domain() {
        let doc = lower_capabilities(&spec(json!({ "capabilities": ["export"] }))).unwrap();
        let node = doc.node("export").unwrap();
        assert_eq!(node.label, "export");
        assert_eq!(node.domain.as_deref(), Some(DEFAULT_DOMAIN));
    }

    #[test]
    fn test_edges_to_undeclared_capabilities_dropped() {
        let doc = lower_capabilities(&spec(json!({
            "capabilities": { "a": { "depends_on": ["ghost"] } }
        })))
        .unwrap();
        assert!(doc.edges.is_empty());
    }

    #[test]
    fn test_no_capabilities_yields_empty_graph() {
        let doc = lower_capabilities(&spec(json!({}))).unwrap();
        assert!(doc.nodes.is_empty());
        assert!(doc.groups.is_empty());
    }
}
