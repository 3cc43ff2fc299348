//! Flowchart IR: process and decision nodes for every declared behavior.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::resolved::{json_type_name, ResolvedSpec};
use crate::ir::error::{IrError, IrResult};
use crate::ir::section::{entries, text, Entry};

/// Preferred behavior section; `flows` is read when it is absent.
pub const SECTION: &str = "behaviors";
pub const FALLBACK_SECTION: &str = "flows";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    Process,
    Decision,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlowNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: FlowNodeType,
    /// Id of the behavior this node belongs to.
    pub flow: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One entry per declared behavior.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlowSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FlowDocument {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub flows: Vec<FlowSummary>,
}

struct Branch {
    label: Option<String>,
    target: Option<String>,
}

struct Step {
    key: String,
    label: String,
    next: Option<String>,
    terminal: bool,
    branches: Vec<Branch>,
}

/// Lower the `behaviors` (or `flows`) section into a flowchart document.
///
/// A step with `branches` becomes a decision node. Transitions to undeclared
/// steps are dropped.
pub fn lower_flows(spec: &ResolvedSpec) -> IrResult<FlowDocument> {
    let (section, value) = match spec.section(SECTION) {
        Some(v) => (SECTION, Some(v)),
        None => (FALLBACK_SECTION, spec.section(FALLBACK_SECTION)),
    };

    let mut doc = FlowDocument::default();
    let mut seen = BTreeSet::new();
    for behavior in entries(section, value)? {
        lower_behavior(section, &behavior, &mut doc, &mut seen)?;
    }
    Ok(doc)
}

/// Node ids are `<behavior>.<step>`; `seen` holds every id emitted so far
/// across all behaviors.
fn lower_behavior(
    section: &str,
    behavior: &Entry<'_>,
    doc: &mut FlowDocument,
    seen: &mut BTreeSet<String>,
) -> IrResult<()> {
    let steps = read_steps(section, behavior)?;
    let node_id = |key: &str| format!("{}.{}", behavior.id, key);

    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, step) in steps.iter().enumerate() {
        if index.insert(step.key.as_str(), i).is_some() {
            return Err(IrError::MalformedEntry {
                section: section.to_string(),
                entry: behavior.id.clone(),
                reason: format!("duplicate step id '{}'", step.key),
            });
        }
    }

    let mut ids = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let id = node_id(&step.key);
        if !seen.insert(id.clone()) {
            return Err(IrError::MalformedEntry {
                section: section.to_string(),
                entry: behavior.id.clone(),
                reason: format!("step '{}' collides with node id '{id}'", step.key),
            });
        }
        let node_type = if step.branches.is_empty() {
            FlowNodeType::Process
        } else {
            FlowNodeType::Decision
        };
        doc.nodes.push(FlowNode {
            id: id.clone(),
            label: step.label.clone(),
            node_type,
            flow: behavior.id.clone(),
        });

        let mut link = |target: &str, label: Option<String>| {
            if index.contains_key(target) {
                doc.edges.push(FlowEdge {
                    source: id.clone(),
                    target: node_id(target),
                    label,
                });
            } else {
                debug!(
                    flow = %behavior.id,
                    step = %step.key,
                    target = %target,
                    "Dropping transition to undeclared step"
                );
            }
        };

        if node_type == FlowNodeType::Decision {
            for branch in &step.branches {
                if let Some(target) = &branch.target {
                    link(target, branch.label.clone());
                }
            }
        } else if let Some(next) = &step.next {
            link(next, None);
        } else if !step.terminal {
            if let Some(following) = steps.get(i + 1) {
                link(&following.key, None);
            }
        }

        ids.push(id);
    }

    doc.flows.push(FlowSummary {
        id: behavior.id.clone(),
        name: behavior
            .text(&["name", "title", "label"])
            .unwrap_or(&behavior.id)
            .to_string(),
        entry: ids.first().cloned(),
        nodes: ids,
    });
    Ok(())
}

fn read_steps(section: &str, behavior: &Entry<'_>) -> IrResult<Vec<Step>> {
    let malformed = |reason: String| IrError::MalformedEntry {
        section: section.to_string(),
        entry: behavior.id.clone(),
        reason,
    };

    let items = match behavior.field("steps") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(malformed(format!(
                "steps must be an array, got {}",
                json_type_name(other)
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(Step {
                key: i.to_string(),
                label: s.clone(),
                next: None,
                terminal: false,
                branches: Vec::new(),
            }),
            Value::Object(obj) => Ok(read_step(i, obj)),
            other => Err(malformed(format!(
                "step {i} must be a string or object, got {}",
                json_type_name(other)
            ))),
        })
        .collect()
}

fn read_step(i: usize, obj: &Map<String, Value>) -> Step {
    let key = text(Some(obj), &["id"])
        .map(str::to_string)
        .unwrap_or_else(|| i.to_string());
    let label = text(Some(obj), &["name", "action", "label", "description"])
        .unwrap_or(&key)
        .to_string();
    let branches = obj
        .get("branches")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|b| Branch {
                    label: text(Some(b), &["when", "condition", "label"]).map(str::to_string),
                    target: text(Some(b), &["goto", "next", "target"]).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Step {
        next: text(Some(obj), &["next"]).map(str::to_string),
        terminal: ["end", "terminal"]
            .iter()
            .any(|k| obj.get(*k).and_then(Value::as_bool).unwrap_or(false)),
        key,
        label,
        branches,
    }
}
