//! Assembles versioned `Skill`s from the pattern extractor's output
//!, grounded in `examples/original_source/src/membria/skill_models.py`
//! and `pattern_matcher.py`.

use crate::calibration::CalibrationEngine;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{Edge, Namespace, RelType, Skill, Zone};
use crate::pattern::{Pattern, PatternExtractor};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct DomainReadiness {
    pub domain: String,
    pub ready: bool,
    pub patterns: u32,
    pub has_calibration: bool,
    pub reason: Option<String>,
}

pub struct SkillGenerator {
    store: Arc<dyn GraphStore>,
    patterns: PatternExtractor,
    calibration: CalibrationEngine,
}

fn zone_statements(patterns: &[Pattern], zone: Zone) -> Vec<String> {
    patterns
        .iter()
        .filter(|p| Zone::classify(p.success_rate) == zone)
        .map(|p| p.statement.clone())
        .collect()
}

fn render_procedure(domain: &str, patterns: &[Pattern], calibration_mean: f64, negative_knowledge: &[crate::model::NegativeKnowledge]) -> String {
    let mut out = format!("# Skill: {domain}\n\n");
    out.push_str(&format!("Calibration mean success rate: {:.0}%\n\n", calibration_mean * 100.0));

    out.push_str("## Green zone (>= 75% success)\n");
    for statement in zone_statements(patterns, Zone::Green) {
        out.push_str(&format!("- {statement}\n"));
    }
    out.push_str("\n## Yellow zone (50-75% success)\n");
    for statement in zone_statements(patterns, Zone::Yellow) {
        out.push_str(&format!("- {statement}\n"));
    }
    out.push_str("\n## Red zone (< 50% success)\n");
    for statement in zone_statements(patterns, Zone::Red) {
        out.push_str(&format!("- {statement}\n"));
    }

    if !negative_knowledge.is_empty() {
        out.push_str("\n## Known failure modes\n");
        for item in negative_knowledge.iter().take(5) {
            out.push_str(&format!(
                "- {} -> {} (severity: {:?}, prevented {} times): {}\n",
                item.hypothesis, item.conclusion, item.severity, item.prevented_count, item.recommendation
            ));
        }
    }

    out
}

impl SkillGenerator {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store: store.clone(),
            patterns: PatternExtractor::new(store.clone()),
            calibration: CalibrationEngine::new(store),
        }
    }

    /// Generates a new `Skill` version for `domain` if at least `min_patterns`
    /// qualify, versioning off the previous `sk-<domain>` max and linking a
    /// `VERSION_OF` edge to the predecessor.
    pub fn generate_skill(&self, namespace: &Namespace, domain: &str, min_patterns: u32, min_sample_size: u32) -> Result<Option<Skill>> {
        let patterns = self.patterns.extract_patterns_for_domain(namespace, domain, min_sample_size)?;
        if (patterns.len() as u32) < min_patterns {
            return Ok(None);
        }

        let total_sample: u64 = patterns.iter().map(|p| p.sample_size as u64).sum();
        let weighted_success: f64 = patterns.iter().map(|p| p.success_rate * p.sample_size as f64).sum();
        let success_rate = if total_sample > 0 { weighted_success / total_sample as f64 } else { 0.0 };

        let guidance = self.calibration.get_confidence_guidance(namespace, domain, None)?;
        let calibration_mean = match guidance {
            crate::calibration::ConfidenceGuidance::Guidance { actual_success_rate, .. } => actual_success_rate,
            crate::calibration::ConfidenceGuidance::NoData => success_rate,
        };

        let negative_knowledge = self
            .store
            .list_negative_knowledge_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain, 5)?;

        let previous = self
            .store
            .get_latest_skill_version(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
        let version = previous.as_ref().map(|s| s.version + 1).unwrap_or(1);

        let quality_score = Skill::quality_score(success_rate, total_sample);
        let procedure = render_procedure(domain, &patterns, calibration_mean, &negative_knowledge);

        let conflicts = self
            .patterns
            .detect_conflicting_patterns(namespace, domain, min_sample_size)?
            .into_iter()
            .map(|c| format!("{} vs {}", c.a, c.b))
            .collect();

        let skill = Skill {
            id: Skill::skill_id(domain, version),
            domain: domain.to_string(),
            version,
            success_rate,
            confidence: calibration_mean,
            sample_size: total_sample,
            quality_score,
            procedure,
            green_zone: zone_statements(&patterns, Zone::Green),
            yellow_zone: zone_statements(&patterns, Zone::Yellow),
            red_zone: zone_statements(&patterns, Zone::Red),
            generated_from_decisions: patterns.iter().flat_map(|p| p.supporting_decisions.clone()).collect(),
            conflicts_with: conflicts,
            is_active: true,
        };

        self.store.add_skill(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, &skill)?;
        if let Some(previous) = previous {
            let edge = Edge::new(format!("edge-{}", Uuid::new_v4().simple()), &skill.id, &previous.id, RelType::VersionOf);
            self.store.add_edge(&edge)?;
        }

        Ok(Some(skill))
    }

    /// Readiness summary for each of `domains`: whether enough patterns and
    /// calibration data exist to generate a skill right now.
    pub fn get_skill_readiness(&self, namespace: &Namespace, domains: &[String], min_patterns: u32, min_sample_size: u32) -> Result<Vec<DomainReadiness>> {
        let mut out = Vec::with_capacity(domains.len());
        for domain in domains {
            let patterns = self.patterns.extract_patterns_for_domain(namespace, domain, min_sample_size)?;
            let has_calibration = self
                .store
                .get_calibration_profile(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?
                .is_some();
            let ready = patterns.len() as u32 >= min_patterns;
            let reason = if ready {
                None
            } else {
                Some(format!("only {} of {} required patterns qualify", patterns.len(), min_patterns))
            };
            out.push(DomainReadiness { domain: domain.clone(), ready, patterns: patterns.len() as u32, has_calibration, reason });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::model::{Decision, FinalStatus, Outcome};

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    fn seed(store: &Arc<dyn GraphStore>, statement: &str, domain: &str, success: bool) {
        let id = format!("d-{}", Uuid::new_v4().simple());
        let decision = Decision::new(id.clone(), ns(), statement, vec![], 0.8, domain, Utc::now()).unwrap();
        store.add_decision(&decision).unwrap();
        let mut outcome = Outcome::new(format!("out-{id}"), id, Utc::now());
        outcome.finalize(if success { FinalStatus::Success } else { FinalStatus::Failure }, if success { 0.9 } else { 0.1 }, Utc::now()).unwrap();
        store.add_outcome(&outcome).unwrap();
    }

    #[test]
    fn skill_generation_requires_min_patterns() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        for _ in 0..3 {
            seed(&store, "Use Redis for caching", "backend", true);
        }
        let generator = SkillGenerator::new(store);
        let skill = generator.generate_skill(&ns(), "backend", 3, 3).unwrap();
        assert!(skill.is_none());
    }

    #[test]
    fn skill_versions_increment_and_link_to_predecessor() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        for _ in 0..3 {
            seed(&store, "Use Redis for caching", "backend", true);
        }
        for _ in 0..3 {
            seed(&store, "Use Kafka for events", "backend", true);
        }
        for _ in 0..3 {
            seed(&store, "Use Memcached for caching", "backend", false);
        }
        let generator = SkillGenerator::new(store.clone());
        let first = generator.generate_skill(&ns(), "backend", 3, 3).unwrap().unwrap();
        assert_eq!(first.version, 1);

        seed(&store, "Use RabbitMQ for queueing", "backend", true);
        seed(&store, "Use RabbitMQ for queueing", "backend", true);
        seed(&store, "Use RabbitMQ for queueing", "backend", true);
        let second = generator.generate_skill(&ns(), "backend", 3, 3).unwrap().unwrap();
        assert_eq!(second.version, 2);

        let edges = store.edges_from(&second.id, Some(RelType::VersionOf)).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dst_id, first.id);
    }

    #[test]
    fn readiness_reports_reason_when_not_enough_patterns() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let generator = SkillGenerator::new(store);
        let readiness = generator.get_skill_readiness(&ns(), &["backend".to_string()], 3, 3).unwrap();
        assert!(!readiness[0].ready);
        assert!(readiness[0].reason.is_some());
    }
}
