//! `Outcome` and its embedded `Signal` list — realization tracking for a
//! `Decision` (spec §3, state machine in §4.C).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Submitted,
    Merged,
    Completed,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    PrCreated,
    PrMerged,
    CiPassed,
    CiFailed,
    TestFailed,
    BugFound,
    Incident,
    PerformanceOk,
    PerformancePoor,
    StabilityOk,
    StabilityPoor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

impl SignalType {
    pub fn default_valence(self) -> Valence {
        use SignalType::*;
        match self {
            PrCreated | PrMerged | CiPassed | PerformanceOk | StabilityOk => Valence::Positive,
            CiFailed | TestFailed | BugFound | Incident | PerformancePoor | StabilityPoor => {
                Valence::Negative
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub valence: Valence,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub severity: Option<String>,
    pub metrics: Option<HashMap<String, f64>>,
}

impl Signal {
    pub fn new(signal_type: SignalType, description: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            signal_type,
            valence: signal_type.default_valence(),
            timestamp,
            description: description.into(),
            severity: None,
            metrics: None,
        }
    }

    /// Idempotency key per spec §4.C: `(signal_type, timestamp, description)`
    /// — the outcome id is implicit in the list this signal belongs to.
    fn dedup_key(&self) -> (SignalType, DateTime<Utc>, &str) {
        (self.signal_type, self.timestamp, &self.description)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub decision_id: String,
    pub status: OutcomeStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pr_url: Option<String>,
    pub pr_number: Option<i64>,
    pub commit_sha: Option<String>,
    pub repo: Option<String>,
    pub signals: Vec<Signal>,
    pub final_status: Option<FinalStatus>,
    pub final_score: Option<f64>,
    pub lessons_learned: Vec<String>,
    pub metrics: HashMap<String, f64>,
}

impl Outcome {
    pub fn new(id: impl Into<String>, decision_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            decision_id: decision_id.into(),
            status: OutcomeStatus::Pending,
            created_at: now,
            submitted_at: None,
            merged_at: None,
            completed_at: None,
            pr_url: None,
            pr_number: None,
            commit_sha: None,
            repo: None,
            signals: Vec::new(),
            final_status: None,
            final_score: None,
            lessons_learned: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.final_status.is_some() {
            return Err(Error::AlreadyFinalized(self.id.clone()));
        }
        Ok(())
    }

    fn require_state(&self, allowed: &[OutcomeStatus], attempted: &str) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(Error::IllegalTransition {
                attempted: attempted.into(),
                current_state: format!("{:?}", self.status),
            });
        }
        Ok(())
    }

    /// Appends a signal if it isn't already present by dedup key. Returns
    /// `true` if the signal was newly appended.
    pub fn append_signal(&mut self, signal: Signal) -> Result<bool> {
        self.ensure_mutable()?;
        let key = signal.dedup_key();
        let duplicate = self
            .signals
            .iter()
            .any(|s| s.dedup_key() == key);
        if duplicate {
            return Ok(false);
        }
        self.signals.push(signal);
        Ok(true)
    }

    pub fn record_pr_created(
        &mut self,
        pr_number: i64,
        pr_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.require_state(&[OutcomeStatus::Pending], "record_pr_created")?;
        self.status = OutcomeStatus::Submitted;
        self.pr_number = Some(pr_number);
        self.pr_url = Some(pr_url.into());
        self.submitted_at = Some(now);
        self.append_signal(Signal::new(SignalType::PrCreated, "PR created", now))?;
        Ok(())
    }

    pub fn record_pr_merged(&mut self, pr_number: i64, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        self.require_state(&[OutcomeStatus::Submitted], "record_pr_merged")?;
        self.status = OutcomeStatus::Merged;
        self.pr_number = Some(pr_number);
        self.merged_at = Some(now);
        self.append_signal(Signal::new(SignalType::PrMerged, "PR merged", now))?;
        Ok(())
    }

    pub fn record_ci_result(&mut self, passed: bool, details: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        let signal_type = if passed { SignalType::CiPassed } else { SignalType::CiFailed };
        let description = details.unwrap_or_else(|| if passed { "CI passed".into() } else { "CI failed".into() });
        self.append_signal(Signal::new(signal_type, description, now))?;
        Ok(())
    }

    pub fn record_incident(&mut self, severity: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        let mut signal = Signal::new(SignalType::Incident, description, now);
        signal.severity = Some(severity.into());
        self.append_signal(signal)?;
        Ok(())
    }

    /// "Good" heuristic per spec §4.C: `uptime >= 99`, `error_rate < 1`,
    /// `bug_count <= 2`, `incident_count == 0` — only checks present in
    /// `metrics` must pass.
    fn metrics_look_good(metrics: &HashMap<String, f64>) -> bool {
        let checks: &[(&str, fn(f64) -> bool)] = &[
            ("uptime", |v| v >= 99.0),
            ("error_rate", |v| v < 1.0),
            ("bug_count", |v| v <= 2.0),
            ("incident_count", |v| v == 0.0),
        ];
        checks.iter().all(|(key, ok)| metrics.get(*key).map(|v| ok(*v)).unwrap_or(true))
    }

    pub fn record_performance(&mut self, metrics: HashMap<String, f64>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        let good = Self::metrics_look_good(&metrics);
        let signal_type = if good { SignalType::PerformanceOk } else { SignalType::PerformancePoor };
        let description = if good { "performance within bounds" } else { "performance degraded" };
        self.metrics.extend(metrics);
        self.append_signal(Signal::new(signal_type, description, now))?;
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        self.require_state(
            &[OutcomeStatus::Pending, OutcomeStatus::Submitted, OutcomeStatus::Merged],
            "abandon",
        )?;
        self.status = OutcomeStatus::Abandoned;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        self.status = OutcomeStatus::Failed;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn finalize(&mut self, final_status: FinalStatus, final_score: f64, now: DateTime<Utc>) -> Result<()> {
        self.ensure_mutable()?;
        if !(0.0..=1.0).contains(&final_score) {
            return Err(Error::InvalidArgument(format!("final_score {final_score} out of range [0,1]")));
        }
        self.status = OutcomeStatus::Completed;
        self.final_status = Some(final_status);
        self.final_score = Some(final_score);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Pre-finalization success estimate from signals:
    /// `0.5 + 0.5 * (positive - negative) / max(1, total)`.
    pub fn success_estimate(&self) -> f64 {
        let positive = self.signals.iter().filter(|s| s.valence == Valence::Positive).count() as f64;
        let negative = self.signals.iter().filter(|s| s.valence == Valence::Negative).count() as f64;
        let total = self.signals.len() as f64;
        0.5 + 0.5 * (positive - negative) / total.max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn happy_path_transitions_in_order() {
        let mut o = Outcome::new("o1", "d1", now());
        o.record_pr_created(1, "http://pr/1", now()).unwrap();
        assert_eq!(o.status, OutcomeStatus::Submitted);
        o.record_pr_merged(1, now()).unwrap();
        assert_eq!(o.status, OutcomeStatus::Merged);
        o.finalize(FinalStatus::Success, 0.9, now()).unwrap();
        assert_eq!(o.status, OutcomeStatus::Completed);
    }

    #[test]
    fn merge_before_submit_is_illegal() {
        let mut o = Outcome::new("o1", "d1", now());
        let err = o.record_pr_merged(1, now());
        assert!(matches!(err, Err(Error::IllegalTransition { .. })));
    }

    #[test]
    fn double_finalize_is_rejected() {
        let mut o = Outcome::new("o1", "d1", now());
        o.finalize(FinalStatus::Success, 0.8, now()).unwrap();
        let err = o.finalize(FinalStatus::Success, 0.8, now());
        assert!(matches!(err, Err(Error::AlreadyFinalized(_))));
    }

    #[test]
    fn duplicate_signal_is_idempotent() {
        let mut o = Outcome::new("o1", "d1", now());
        let t = now();
        let added_first = o.append_signal(Signal::new(SignalType::CiPassed, "ci ok", t)).unwrap();
        let added_second = o.append_signal(Signal::new(SignalType::CiPassed, "ci ok", t)).unwrap();
        assert!(added_first);
        assert!(!added_second);
        assert_eq!(o.signals.len(), 1);
    }

    #[test]
    fn performance_metrics_classify_as_poor_when_any_present_check_fails() {
        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 2.5);
        let ok = Outcome::metrics_look_good(&metrics);
        assert!(!ok);
    }

    #[test]
    fn success_estimate_balances_signal_valence() {
        let mut o = Outcome::new("o1", "d1", now());
        o.append_signal(Signal::new(SignalType::CiPassed, "a", now())).unwrap();
        o.append_signal(Signal::new(SignalType::BugFound, "b", now())).unwrap();
        assert!((o.success_estimate() - 0.5).abs() < 1e-9);
    }
}
