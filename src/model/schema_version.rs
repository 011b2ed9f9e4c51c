//! `SchemaVersion` — a record of one applied migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// SemVer string, e.g. `"1.1.0"`.
    pub version: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: MigrationStatus,
    pub description: String,
    pub error: Option<String>,
}
