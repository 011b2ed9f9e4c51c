//! Pre-decision evidence surface, grounded in
//! `examples/original_source/src/membria/decision_surface.py`'s
//! `DecisionSurface.generate_context`: similar past decisions, team
//! calibration for the domain, and negative-knowledge alerts, gathered
//! through the typed [`GraphStore`] and [`CalibrationEngine`] rather than
//! ad-hoc Cypher strings (REDESIGN FLAGS).

use crate::calibration::{CalibrationEngine, ConfidenceGuidance};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{FinalStatus, Namespace, NegativeKnowledge};
use std::sync::Arc;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SimilarDecision {
    pub decision_id: String,
    pub statement: String,
    pub outcome: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TeamCalibration {
    pub domain: String,
    pub actual_success_rate: f64,
    pub confidence_gap: Option<f64>,
    pub sample_size: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Surface {
    pub similar_decisions: Vec<SimilarDecision>,
    pub team_calibration: Option<TeamCalibration>,
    pub negative_knowledge_alerts: Vec<NegativeKnowledge>,
}

pub struct DecisionSurface {
    store: Arc<dyn GraphStore>,
    calibration: CalibrationEngine,
}

impl DecisionSurface {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { calibration: CalibrationEngine::new(store.clone()), store }
    }

    /// Assembles the surface for `module` (the decision's domain). `confidence`
    /// is the caller's current confidence, used to compute the calibration
    /// gap the same way the behavior-chain calibration warning does.
    pub fn generate(&self, namespace: &Namespace, module: &str, confidence: f64) -> Result<Surface> {
        let team_calibration = self.team_calibration(namespace, module, confidence)?;
        let similar_decisions = self.similar_decisions(namespace, module)?;
        let negative_knowledge_alerts = self
            .store
            .list_negative_knowledge_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, module, 5)?;

        Ok(Surface { similar_decisions, team_calibration, negative_knowledge_alerts })
    }

    fn team_calibration(&self, namespace: &Namespace, domain: &str, confidence: f64) -> Result<Option<TeamCalibration>> {
        let guidance = self.calibration.get_confidence_guidance(namespace, domain, Some(confidence))?;
        Ok(match guidance {
            ConfidenceGuidance::NoData => None,
            ConfidenceGuidance::Guidance { actual_success_rate, confidence_gap, sample_size, .. } => Some(TeamCalibration {
                domain: domain.to_string(),
                actual_success_rate,
                confidence_gap,
                sample_size,
            }),
        })
    }

    /// Top-5 most recent decisions in `domain`, each paired with its
    /// outcome's final status if one has been recorded.
    fn similar_decisions(&self, namespace: &Namespace, domain: &str) -> Result<Vec<SimilarDecision>> {
        let mut decisions = self
            .store
            .list_decisions_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
        decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut out = Vec::new();
        for decision in decisions.into_iter().take(5) {
            let outcome = match decision.status {
                _ => self.store.get_outcome_by_decision(&decision.id)?,
            };
            let outcome_label = outcome
                .and_then(|o| o.final_status)
                .map(|s| match s {
                    FinalStatus::Success => "success",
                    FinalStatus::Partial => "partial",
                    FinalStatus::Failure => "failure",
                })
                .unwrap_or("pending")
                .to_string();
            out.push(SimilarDecision {
                decision_id: decision.id,
                statement: decision.statement,
                outcome: outcome_label,
                confidence: decision.confidence,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::model::Decision;
    use chrono::Utc;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn empty_store_returns_no_calibration_and_no_decisions() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let surface = DecisionSurface::new(store);
        let result = surface.generate(&ns(), "backend", 0.8).unwrap();
        assert!(result.team_calibration.is_none());
        assert!(result.similar_decisions.is_empty());
    }

    #[test]
    fn similar_decisions_report_outcome_label() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let d = Decision::new("d1", ns(), "use Redis", vec![], 0.8, "backend", Utc::now()).unwrap();
        store.add_decision(&d).unwrap();
        let mut outcome = crate::model::Outcome::new("out1", "d1", Utc::now());
        outcome.finalize(FinalStatus::Success, 0.9, Utc::now()).unwrap();
        store.add_outcome(&outcome).unwrap();

        let surface = DecisionSurface::new(store);
        let result = surface.generate(&ns(), "backend", 0.8).unwrap();
        assert_eq!(result.similar_decisions.len(), 1);
        assert_eq!(result.similar_decisions[0].outcome, "success");
    }

    #[test]
    fn calibration_gap_reflects_caller_confidence() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let calibration = CalibrationEngine::new(store.clone());
        for _ in 0..5 {
            calibration.record_finalization(&ns(), "backend", false).unwrap();
        }
        let surface = DecisionSurface::new(store);
        let result = surface.generate(&ns(), "backend", 0.95).unwrap();
        let cal = result.team_calibration.unwrap();
        assert!(cal.confidence_gap.unwrap() > 0.0);
    }
}
