//! Directed lineage edges between assets, referenced weakly by MRN.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::mrn::Mrn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineageType {
    Direct,
    Transform,
}

impl Default for LineageType {
    fn default() -> Self {
        LineageType::Direct
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    pub id: Uuid,
    pub source_mrn: Mrn,
    pub target_mrn: Mrn,
    #[serde(rename = "type", default)]
    pub edge_type: LineageType,
    pub job_mrn: Option<Mrn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-item result of a batch lineage upsert (§4.5, §8 S1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Created,
    Duplicate,
    Existing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEdgeResult {
    pub edge: LineageEdge,
    pub status: EdgeStatus,
}

/// One node in a traversed lineage subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageNode {
    pub mrn: Mrn,
    pub is_stub: bool,
}

/// Reachable subgraph returned by `lineage(mrn, depth)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageGraph {
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
    /// Edges whose expansion would have revisited an ancestor; pruned
    /// from further traversal but reported so callers can render a cycle
    /// marker.
    pub cycle_edges: Vec<Uuid>,
}
