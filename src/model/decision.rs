//! `Decision` — the atomic unit of the memory graph.

use super::namespace::{Lifecycle, Namespace};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedOutcome {
    pub description: String,
    pub success_criteria: Vec<String>,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Executed,
    Completed,
    Failed,
}

impl DecisionStatus {
    /// `status` advances monotonically; `failed -> pending` is the only
    /// reset forbidden by spec §3.
    fn can_advance_to(self, next: DecisionStatus) -> bool {
        use DecisionStatus::*;
        match (self, next) {
            (Pending, Executed) | (Pending, Completed) | (Pending, Failed) => true,
            (Executed, Completed) | (Executed, Failed) => true,
            (Failed, Pending) => false,
            (a, b) => a == b,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub namespace: Namespace,
    pub lifecycle: Lifecycle,
    pub statement: String,
    pub alternatives: Vec<String>,
    pub alternatives_with_reasons: BTreeMap<String, String>,
    pub assumptions: Vec<String>,
    pub predicted_outcome: Option<PredictedOutcome>,
    pub confidence: f64,
    pub module: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    /// SHA-256 over `{statement, sorted alternatives, sorted assumptions,
    /// predicted_outcome}`, computed once at finalization and never
    /// recomputed afterward.
    pub context_hash: Option<String>,
    pub status: DecisionStatus,
    pub linked_pr: Option<String>,
    pub linked_commit: Option<String>,
}

impl Decision {
    pub fn new(
        id: impl Into<String>,
        namespace: Namespace,
        statement: impl Into<String>,
        alternatives: Vec<String>,
        confidence: f64,
        module: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidArgument(format!(
                "confidence {confidence} out of range [0,1]"
            )));
        }
        Ok(Self {
            id: id.into(),
            namespace,
            lifecycle: Lifecycle::new(now, Some(super::namespace::MemoryType::Episodic)),
            statement: statement.into(),
            alternatives,
            alternatives_with_reasons: BTreeMap::new(),
            assumptions: Vec::new(),
            predicted_outcome: None,
            confidence,
            module: module.into(),
            created_at: now,
            created_by: None,
            context_hash: None,
            status: DecisionStatus::Pending,
            linked_pr: None,
            linked_commit: None,
        })
    }

    /// Compute and lock in `context_hash`. A no-op if already set — the
    /// hash is immutable once computed.
    pub fn finalize_context_hash(&mut self) {
        if self.context_hash.is_some() {
            return;
        }
        let mut alternatives = self.alternatives.clone();
        alternatives.sort();
        let mut assumptions = self.assumptions.clone();
        assumptions.sort();
        let predicted = self
            .predicted_outcome
            .as_ref()
            .map(|p| serde_json::to_string(p).unwrap_or_default())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.statement.as_bytes());
        hasher.update(alternatives.join("\u{1}").as_bytes());
        hasher.update(assumptions.join("\u{1}").as_bytes());
        hasher.update(predicted.as_bytes());
        self.context_hash = Some(hex::encode(hasher.finalize()));
    }

    pub fn transition_status(&mut self, next: DecisionStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(Error::IllegalTransition {
                attempted: format!("{next:?}"),
                current_state: format!("{:?}", self.status),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn rejects_confidence_outside_unit_interval() {
        let err = Decision::new("d1", ns(), "use X", vec![], 1.5, "backend", Utc::now());
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn context_hash_is_stable_across_alternative_ordering() {
        let mut a = Decision::new(
            "d1",
            ns(),
            "use X over Y",
            vec!["X".into(), "Y".into()],
            0.7,
            "backend",
            Utc::now(),
        )
        .unwrap();
        let mut b = Decision::new(
            "d2",
            ns(),
            "use X over Y",
            vec!["Y".into(), "X".into()],
            0.7,
            "backend",
            Utc::now(),
        )
        .unwrap();
        a.finalize_context_hash();
        b.finalize_context_hash();
        assert_eq!(a.context_hash, b.context_hash);
    }

    #[test]
    fn context_hash_does_not_change_once_set() {
        let mut d = Decision::new("d1", ns(), "use X", vec![], 0.7, "backend", Utc::now()).unwrap();
        d.finalize_context_hash();
        let first = d.context_hash.clone();
        d.statement = "use Z".into();
        d.finalize_context_hash();
        assert_eq!(d.context_hash, first);
    }

    #[test]
    fn failed_to_pending_reset_is_forbidden() {
        let mut d = Decision::new("d1", ns(), "x", vec![], 0.5, "m", Utc::now()).unwrap();
        d.transition_status(DecisionStatus::Failed).unwrap();
        let err = d.transition_status(DecisionStatus::Pending);
        assert!(matches!(err, Err(Error::IllegalTransition { .. })));
    }

    #[test]
    fn monotonic_advance_succeeds() {
        let mut d = Decision::new("d1", ns(), "x", vec![], 0.5, "m", Utc::now()).unwrap();
        d.transition_status(DecisionStatus::Executed).unwrap();
        d.transition_status(DecisionStatus::Completed).unwrap();
        assert_eq!(d.status, DecisionStatus::Completed);
    }
}
