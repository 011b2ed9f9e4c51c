//! Ambient fields carried by every node in the graph.

use serde::{Deserialize, Serialize};

/// Mandatory query-filter keys. Every write stamps these; every read filters
/// by them unless the caller explicitly asks for cross-namespace scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub tenant_id: String,
    pub team_id: String,
    pub project_id: String,
}

impl Namespace {
    pub fn new(tenant_id: impl Into<String>, team_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            team_id: team_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// Memory-lifecycle fields shared by every memory-bearing node (
/// §4.B). `memory_type` drives the TTL table; `last_verified_at` is
/// stamped by every mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lifecycle {
    pub is_active: bool,
    pub ttl_days: i64,
    pub last_verified_at: chrono::DateTime<chrono::Utc>,
    pub deprecated_reason: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub memory_subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
}

impl MemoryType {
    /// Default TTL in days for this memory type.
    pub fn default_ttl_days(self) -> i64 {
        match self {
            MemoryType::Episodic => 180,
            MemoryType::Semantic => 365,
            MemoryType::Procedural => 720,
        }
    }
}

impl Lifecycle {
    pub fn new(now: chrono::DateTime<chrono::Utc>, memory_type: Option<MemoryType>) -> Self {
        let ttl_days = memory_type.map(MemoryType::default_ttl_days).unwrap_or(365);
        Self {
            is_active: true,
            ttl_days,
            last_verified_at: now,
            deprecated_reason: None,
            memory_type,
            memory_subject: None,
        }
    }

    pub fn touch(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.last_verified_at = now;
    }

    pub fn soft_forget(&mut self, reason: impl Into<String>, now: chrono::DateTime<chrono::Utc>) {
        self.is_active = false;
        self.deprecated_reason = Some(reason.into());
        self.last_verified_at = now;
    }
}
