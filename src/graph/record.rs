//! The polymorphic row shape every node and edge is stored as (spec §4.A /
//! SPEC_FULL.md §A: "a single polymorphic `nodes` table").

use crate::model::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Decision,
    Outcome,
    NegativeKnowledge,
    AntiPattern,
    CalibrationProfile,
    Skill,
    Engram,
    SessionContext,
    DocShot,
    Document,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Decision => "decision",
            NodeType::Outcome => "outcome",
            NodeType::NegativeKnowledge => "negative_knowledge",
            NodeType::AntiPattern => "antipattern",
            NodeType::CalibrationProfile => "calibration_profile",
            NodeType::Skill => "skill",
            NodeType::Engram => "engram",
            NodeType::SessionContext => "session_context",
            NodeType::DocShot => "docshot",
            NodeType::Document => "document",
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "decision" => NodeType::Decision,
            "outcome" => NodeType::Outcome,
            "negative_knowledge" => NodeType::NegativeKnowledge,
            "antipattern" => NodeType::AntiPattern,
            "calibration_profile" => NodeType::CalibrationProfile,
            "skill" => NodeType::Skill,
            "engram" => NodeType::Engram,
            "session_context" => NodeType::SessionContext,
            "docshot" => NodeType::DocShot,
            "document" => NodeType::Document,
            other => return Err(crate::error::Error::Internal(format!("unknown node_type '{other}'"))),
        })
    }
}

/// The row shape behind every node type. Type-specific fields live in
/// `data` as JSON; callers deserialize into the model type they expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub node_type: NodeType,
    pub tenant_id: String,
    pub team_id: String,
    pub project_id: String,
    pub is_active: bool,
    pub ttl_days: i64,
    pub last_verified_at: DateTime<Utc>,
    pub deprecated_reason: Option<String>,
    pub memory_type: Option<String>,
    pub memory_subject: Option<String>,
    pub data: serde_json::Value,
}

impl NodeRecord {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.tenant_id.clone(), self.team_id.clone(), self.project_id.clone())
    }
}

/// A filter-and-project query against the node table — the implementation
/// of spec §4.A's `query(cypher-like, params) -> rows` escape hatch. Typed
/// accessors on [`crate::graph::GraphStore`] cover the common paths; this
/// exists for the cases none of them name (ad hoc domain scans, admin
/// tooling).
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub node_type: Option<NodeType>,
    pub namespace: Option<Namespace>,
    pub active_only: bool,
    pub data_equals: Vec<(String, serde_json::Value)>,
    pub limit: Option<u32>,
}

impl QuerySpec {
    pub fn for_type(node_type: NodeType) -> Self {
        Self {
            node_type: Some(node_type),
            active_only: true,
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_data_eq(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.data_equals.push((field.into(), value));
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
