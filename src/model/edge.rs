//! Typed edges between graph nodes (spec §3, plus the supplemental edges
//! adopted from the original `graph_schema.py`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    MadeIn,
    ImplementedIn,
    TriggeredBy,
    ResultedIn,
    Triggered,
    Caused,
    Prevented,
    SimilarTo,
    UsesDocshot,
    Includes,
    GeneratedFrom,
    BasedOn,
    WarnsAgainst,
    VersionOf,
    /// Decision -> CodeChange: a second code change after a negative outcome.
    ReworkedBy,
    /// Engram -> SessionContext.
    HasContext,
    /// Decision -> CalibrationProfile active at capture time.
    MeasuredBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub src_id: String,
    pub dst_id: String,
    pub rel_type: RelType,
    pub data: Option<serde_json::Value>,
}

impl Edge {
    pub fn new(id: impl Into<String>, src_id: impl Into<String>, dst_id: impl Into<String>, rel_type: RelType) -> Self {
        Self {
            id: id.into(),
            src_id: src_id.into(),
            dst_id: dst_id.into(),
            rel_type,
            data: None,
        }
    }
}
