//! `NegativeKnowledge` — a recorded failure class.

use super::namespace::{Lifecycle, Namespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeKnowledge {
    pub id: String,
    pub namespace: Namespace,
    pub lifecycle: Lifecycle,
    pub hypothesis: String,
    pub conclusion: String,
    pub domain: String,
    pub severity: Severity,
    pub recommendation: String,
    pub prevented_count: u64,
    pub discovered_at: DateTime<Utc>,
}

impl NegativeKnowledge {
    pub fn new(
        id: impl Into<String>,
        namespace: Namespace,
        hypothesis: impl Into<String>,
        conclusion: impl Into<String>,
        domain: impl Into<String>,
        severity: Severity,
        recommendation: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            lifecycle: Lifecycle::new(discovered_at, Some(super::namespace::MemoryType::Semantic)),
            namespace,
            hypothesis: hypothesis.into(),
            conclusion: conclusion.into(),
            domain: domain.into(),
            severity,
            recommendation: recommendation.into(),
            prevented_count: 0,
            discovered_at,
        }
    }

    pub fn record_prevention(&mut self) {
        self.prevented_count += 1;
    }
}
