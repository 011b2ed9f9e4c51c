//! `Document` and `DocShot` — immutable knowledge-base snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_path: String,
    pub content: String,
    pub doc_type: String,
    pub embedding: Option<Vec<f32>>,
    pub chunk_index: u32,
    pub chunk_total: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of a set of [`Document`] chunks, referenced by
/// Decisions via `USES_DOCSHOT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocShot {
    pub id: String,
    pub document_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
