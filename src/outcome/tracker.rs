//! Drives the Outcome state machine from webhook/CLI signals.

use crate::calibration::CalibrationEngine;
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::model::{FinalStatus, Namespace, Outcome};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Per-`outcome_id` write serialization (spec §5: "Outcome state-machine
/// transitions for a given outcome_id are strictly serialized"). Writes to
/// different outcomes proceed independently; a concurrent writer to the
/// same outcome blocks until the first finishes, then observes the state
/// the first writer left behind and may legitimately fail with
/// `IllegalTransition`.
pub struct OutcomeTracker {
    store: Arc<dyn GraphStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OutcomeTracker {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store, locks: Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, outcome_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(outcome_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn load(&self, outcome_id: &str) -> Result<Outcome> {
        self.store
            .get_outcome(outcome_id)?
            .ok_or_else(|| Error::NotFound(format!("outcome {outcome_id}")))
    }

    fn with_outcome<F>(&self, outcome_id: &str, f: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Outcome) -> Result<()>,
    {
        let lock = self.lock_for(outcome_id);
        let _guard = lock.lock().unwrap();
        let mut outcome = self.load(outcome_id)?;
        f(&mut outcome)?;
        self.store.update_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Exposes the underlying store for components that need to share it
    /// (e.g. tests wiring a [`CalibrationEngine`] against the same backend).
    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }

    pub fn create_outcome(&self, decision_id: impl Into<String>) -> Result<Outcome> {
        let outcome = Outcome::new(format!("out_{}", Uuid::new_v4().simple()), decision_id, Utc::now());
        self.store.add_outcome(&outcome)?;
        Ok(outcome)
    }

    pub fn record_pr_created(&self, outcome_id: &str, pr_number: i64, pr_url: &str, _branch: Option<&str>) -> Result<Outcome> {
        self.with_outcome(outcome_id, |o| o.record_pr_created(pr_number, pr_url, Utc::now()))
    }

    pub fn record_pr_merged(&self, outcome_id: &str, pr_number: i64) -> Result<Outcome> {
        self.with_outcome(outcome_id, |o| o.record_pr_merged(pr_number, Utc::now()))
    }

    /// `at` should be the external event's own timestamp when the caller has
    /// one (e.g. a GitHub check/workflow run's `completed_at`), not
    /// wall-clock time — that is what lets a redelivered webhook collapse
    /// onto the same signal via `Signal::dedup_key` (spec §4.K: "processing
    /// is idempotent per (event id, outcome id, signal type)").
    pub fn record_ci_result(&self, outcome_id: &str, passed: bool, details: Option<String>, at: chrono::DateTime<Utc>) -> Result<Outcome> {
        self.with_outcome(outcome_id, |o| o.record_ci_result(passed, details, at))
    }

    pub fn record_incident(&self, outcome_id: &str, severity: &str, description: &str) -> Result<Outcome> {
        self.with_outcome(outcome_id, |o| o.record_incident(severity, description, Utc::now()))
    }

    pub fn record_performance(&self, outcome_id: &str, metrics: HashMap<String, f64>) -> Result<Outcome> {
        self.with_outcome(outcome_id, |o| o.record_performance(metrics, Utc::now()))
    }

    /// Finalizes the outcome, then best-effort updates calibration for
    /// `decision_domain` if supplied. A calibration failure is logged and
    /// never propagated.
    pub fn finalize_outcome(
        &self,
        outcome_id: &str,
        final_status: FinalStatus,
        final_score: f64,
        decision_domain: Option<(&Namespace, &str)>,
        calibration: &CalibrationEngine,
    ) -> Result<Outcome> {
        let outcome = self.with_outcome(outcome_id, |o| o.finalize(final_status, final_score, Utc::now()))?;
        if let Some((namespace, domain)) = decision_domain {
            let success = matches!(final_status, FinalStatus::Success);
            if let Err(e) = calibration.record_finalization(namespace, domain, success) {
                tracing::warn!(outcome_id, domain, error = %e, "calibration update failed during finalization");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;

    fn tracker() -> OutcomeTracker {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        OutcomeTracker::new(store)
    }

    #[test]
    fn unknown_outcome_id_is_not_found() {
        let t = tracker();
        let err = t.record_pr_merged("missing", 1);
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn finalize_twice_is_already_finalized() {
        let t = tracker();
        let outcome = t.create_outcome("d1").unwrap();
        let store: Arc<dyn GraphStore> = t.store();
        let calibration = CalibrationEngine::new(store);
        t.finalize_outcome(&outcome.id, FinalStatus::Success, 0.8, None, &calibration).unwrap();
        let err = t.finalize_outcome(&outcome.id, FinalStatus::Success, 0.8, None, &calibration);
        assert!(matches!(err, Err(Error::AlreadyFinalized(_))));
    }

    #[test]
    fn finalize_with_domain_updates_calibration() {
        let t = tracker();
        let outcome = t.create_outcome("d1").unwrap();
        let store: Arc<dyn GraphStore> = t.store();
        let calibration = CalibrationEngine::new(store);
        let ns = Namespace::new("t", "team", "proj");
        t.finalize_outcome(&outcome.id, FinalStatus::Success, 0.9, Some((&ns, "backend")), &calibration).unwrap();
        let guidance = calibration.get_confidence_guidance(&ns, "backend", None).unwrap();
        assert!(!matches!(guidance, crate::calibration::ConfidenceGuidance::NoData));
    }
}
