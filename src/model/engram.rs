//! `Engram` — an atomic session checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tool_calls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_type: Option<String>,
    pub model: Option<String>,
    pub duration_ms: Option<u64>,
    pub tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engram {
    pub id: String,
    pub session_id: String,
    pub commit_sha: Option<String>,
    pub branch: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub agent: AgentInfo,
    pub transcript: Vec<TranscriptMessage>,
    pub files_changed: Vec<FileChange>,
    pub decisions_extracted: Vec<String>,
    pub context_injected: bool,
    pub antipatterns_triggered: Vec<String>,
    pub reasoning_trail: Option<Vec<String>>,
    pub confidence_trajectory: Option<Vec<f64>>,
    pub tool_call_graph: Option<serde_json::Value>,
}

impl Engram {
    pub fn new(id: impl Into<String>, session_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            commit_sha: None,
            branch: None,
            timestamp,
            agent: AgentInfo::default(),
            transcript: Vec::new(),
            files_changed: Vec::new(),
            decisions_extracted: Vec::new(),
            context_injected: false,
            antipatterns_triggered: Vec::new(),
            reasoning_trail: None,
            confidence_trajectory: None,
            tool_call_graph: None,
        }
    }
}
