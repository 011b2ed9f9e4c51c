//! `AntiPattern` — a regex-detectable problematic pattern.

use crate::model::negative_knowledge::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiPattern {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub severity: Severity,
    pub failure_rate: f64,
    pub regex_pattern: String,
    pub keywords: Vec<String>,
    pub removal_rate: f64,
    pub repos_affected: u64,
}

impl AntiPattern {
    /// Severity-tiered remediation copy used by the AntiPattern Guard
    /// chain.
    pub fn remediation(&self) -> &'static str {
        if self.failure_rate > 0.70 {
            "strongly reconsider"
        } else if self.failure_rate > 0.50 {
            "review carefully"
        } else {
            "verify mitigations"
        }
    }
}
