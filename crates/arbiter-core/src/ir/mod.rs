//! IR lowering: pure projections of a resolved tree into graph documents.
//!
//! Each [`IrKind`] reads only its own sections of the tree, so a malformed
//! section fails the kinds that read it and nothing else. Documents are
//! regenerated on every call; nothing here caches or performs I/O.
//!
//! # Modules
//!
//! - [`capabilities`]: capability nodes clustered by domain
//! - [`flows`]: process/decision flowchart per behavior
//! - [`dependencies`]: service/module dependency graph
//! - [`coverage`]: weighted coverage summary
//! - [`graph`]: shared node/edge/group types

pub mod capabilities;
pub mod coverage;
pub mod dependencies;
pub mod error;
pub mod flows;
pub mod graph;
mod section;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::ArbiterError;
use crate::domain::resolved::ResolvedSpec;
use crate::obs::emit_ir_lowered;

pub use capabilities::lower_capabilities;
pub use coverage::{lower_coverage, CoverageDocument, CoverageItem, CoverageStatus, CoverageSummary};
pub use dependencies::lower_dependencies;
pub use error::{IrError, IrResult};
pub use flows::{lower_flows, FlowDocument, FlowEdge, FlowNode, FlowNodeType, FlowSummary};
pub use graph::{GraphDocument, GraphEdge, GraphNode, NodeGroup};

/// The IR kinds a resolved tree can be lowered into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IrKind {
    Capabilities,
    Flows,
    Dependencies,
    Coverage,
}

impl IrKind {
    pub const ALL: [IrKind; 4] = [
        IrKind::Capabilities,
        IrKind::Flows,
        IrKind::Dependencies,
        IrKind::Coverage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IrKind::Capabilities => "capabilities",
            IrKind::Flows => "flows",
            IrKind::Dependencies => "dependencies",
            IrKind::Coverage => "coverage",
        }
    }
}

impl std::fmt::Display for IrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IrKind {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IrKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ArbiterError::UnknownIrKind(s.to_string()))
    }
}

/// Kind-specific payload of an [`IrDocument`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum IrData {
    Graph(GraphDocument),
    Flows(FlowDocument),
    Coverage(CoverageDocument),
}

/// A lowered IR document: `{kind, data}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IrDocument {
    pub kind: IrKind,
    pub data: IrData,
}

impl IrDocument {
    /// Graph payload of a `capabilities` or `dependencies` document.
    pub fn graph(&self) -> Option<&GraphDocument> {
        match &self.data {
            IrData::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn flows(&self) -> Option<&FlowDocument> {
        match &self.data {
            IrData::Flows(f) => Some(f),
            _ => None,
        }
    }

    pub fn coverage(&self) -> Option<&CoverageDocument> {
        match &self.data {
            IrData::Coverage(c) => Some(c),
            _ => None,
        }
    }

    fn element_count(&self) -> usize {
        match &self.data {
            IrData::Graph(g) => g.nodes.len() + g.edges.len(),
            IrData::Flows(f) => f.nodes.len() + f.edges.len(),
            IrData::Coverage(c) => c.coverage.details.len(),
        }
    }
}

/// Lower a resolved tree into one IR kind.
pub fn lower(kind: IrKind, spec: &ResolvedSpec) -> IrResult<IrDocument> {
    let data = match kind {
        IrKind::Capabilities => IrData::Graph(lower_capabilities(spec)?),
        IrKind::Flows => IrData::Flows(lower_flows(spec)?),
        IrKind::Dependencies => IrData::Graph(lower_dependencies(spec)?),
        IrKind::Coverage => IrData::Coverage(lower_coverage(spec)?),
    };
    let doc = IrDocument { kind, data };
    emit_ir_lowered(kind.name(), doc.element_count());
    Ok(doc)
}

/// Lower every kind independently; one kind's failure never masks another.
pub fn lower_all(spec: &ResolvedSpec) -> BTreeMap<IrKind, IrResult<IrDocument>> {
    IrKind::ALL
        .into_iter()
        .map(|kind| (kind, lower(kind, spec)))
        .collect()
}
