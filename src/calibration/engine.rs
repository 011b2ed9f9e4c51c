//! Per-domain Beta(alpha, beta) calibration and confidence guidance.

use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{CalibrationProfile, Namespace, Trend};
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfidenceGuidance {
    NoData,
    Guidance {
        actual_success_rate: f64,
        confidence_gap: Option<f64>,
        adjustment: Option<f64>,
        recommendation: Option<String>,
        credible_interval_95: Option<(f64, f64)>,
        trend: Trend,
        sample_size: f64,
    },
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchUpdateResult {
    pub updated: u32,
    pub failed: u32,
    pub skipped: u32,
}

pub struct CalibrationEngine {
    store: Arc<dyn GraphStore>,
}

/// Gap-severity table: magnitude of the suggested confidence adjustment by
/// `|gap|` band, sign opposing the gap. The exact value within the ">0.25"
/// band is unspecified upstream ("0.10-0.15"); this implementation picks
/// the midpoint (0.125) and records the choice in DESIGN.md.
fn adjustment_for_gap(gap: f64) -> Option<f64> {
    let magnitude = gap.abs();
    let step = if magnitude > 0.25 {
        0.125
    } else if magnitude > 0.05 {
        0.05
    } else {
        return None;
    };
    Some(if gap > 0.0 { -step } else { step })
}

impl CalibrationEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    fn load_or_seed(&self, namespace: &Namespace, domain: &str) -> Result<CalibrationProfile> {
        match self.store.get_calibration_profile(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)? {
            Some(p) => Ok(p),
            None => Ok(CalibrationProfile::seeded(domain, Utc::now())),
        }
    }

    /// Updates the domain's Beta distribution from a finalized outcome.
    /// Errors here must be logged and never fail the outcome finalization
    /// that triggered them (spec §4.C) — callers should treat this as a
    /// best-effort side effect.
    pub fn record_finalization(&self, namespace: &Namespace, domain: &str, success: bool) -> Result<CalibrationProfile> {
        let mut profile = self.load_or_seed(namespace, domain)?;
        let now = Utc::now();
        if success {
            profile.record_success(now);
        } else {
            profile.record_failure(now);
        }
        self.store.upsert_calibration_profile(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, &profile)?;
        Ok(profile)
    }

    pub fn get_confidence_guidance(
        &self,
        namespace: &Namespace,
        domain: &str,
        user_confidence: Option<f64>,
    ) -> Result<ConfidenceGuidance> {
        let profile = match self.store.get_calibration_profile(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)? {
            Some(p) => p,
            None => return Ok(ConfidenceGuidance::NoData),
        };

        let mean = profile.mean();
        let sample_size = profile.sample_size();
        let gap = user_confidence.map(|c| c - mean);
        let adjustment = gap.and_then(adjustment_for_gap);
        let recommendation = match gap {
            Some(g) if sample_size >= 3.0 && g.abs() > 0.05 => {
                let direction = if g > 0.0 { "overconfident" } else { "underconfident" };
                Some(format!(
                    "Team is {direction} by {:.0}% in this domain (actual success rate {:.0}%)",
                    g.abs() * 100.0,
                    mean * 100.0
                ))
            }
            _ => None,
        };

        Ok(ConfidenceGuidance::Guidance {
            actual_success_rate: mean,
            confidence_gap: gap,
            adjustment,
            recommendation,
            credible_interval_95: profile.credible_interval_95(),
            trend: profile.trend(),
            sample_size,
        })
    }

    /// Batch update from a list of `(decision_id, success)` pairs plus a
    /// `decision_id -> domain` map.
    pub fn batch_update(
        &self,
        namespace: &Namespace,
        outcomes: &[(String, bool)],
        decision_domain: &std::collections::HashMap<String, String>,
    ) -> BatchUpdateResult {
        let mut result = BatchUpdateResult::default();
        for (decision_id, success) in outcomes {
            let Some(domain) = decision_domain.get(decision_id) else {
                result.skipped += 1;
                continue;
            };
            match self.record_finalization(namespace, domain, *success) {
                Ok(_) => result.updated += 1,
                Err(e) => {
                    tracing::warn!(decision_id, error = %e, "calibration batch update failed");
                    result.failed += 1;
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn no_data_before_any_finalization() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let engine = CalibrationEngine::new(store);
        let guidance = engine.get_confidence_guidance(&ns(), "backend", Some(0.9)).unwrap();
        assert!(matches!(guidance, ConfidenceGuidance::NoData));
    }

    #[test]
    fn recommendation_appears_once_sample_size_and_gap_thresholds_met() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let engine = CalibrationEngine::new(store);
        for _ in 0..5 {
            engine.record_finalization(&ns(), "backend", false).unwrap();
        }
        let guidance = engine.get_confidence_guidance(&ns(), "backend", Some(0.95)).unwrap();
        match guidance {
            ConfidenceGuidance::Guidance { recommendation, .. } => {
                assert!(recommendation.unwrap().contains("overconfident"));
            }
            _ => panic!("expected guidance"),
        }
    }

    #[test]
    fn batch_update_skips_decisions_missing_from_domain_map() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let engine = CalibrationEngine::new(store);
        let outcomes = vec![("d1".to_string(), true)];
        let map = std::collections::HashMap::new();
        let result = engine.batch_update(&ns(), &outcomes, &map);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.updated, 0);
    }
}
