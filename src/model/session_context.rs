//! `SessionContext` — short-lived hint state for the next decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub task: Option<String>,
    pub focus: Option<String>,
    pub current_plan: Option<String>,
    pub constraints: Vec<String>,
    pub doc_shot_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, ttl_days: i64, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            task: None,
            focus: None,
            current_plan: None,
            constraints: Vec::new(),
            doc_shot_id: None,
            created_at: now,
            expires_at: now + chrono::Duration::days(ttl_days),
            is_active: true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
