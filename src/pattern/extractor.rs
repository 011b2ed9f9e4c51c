//! Mines recurring decision patterns from outcomes, grounded in
//! `examples/original_source/src/membria/pattern_extractor.py`.

use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{FinalStatus, Namespace};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

static TECH_KEYWORDS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "PostgreSQL", "MongoDB", "SQLite", "MySQL", "Redis", "DynamoDB",
        "Auth0", "JWT", "OAuth", "Firebase", "Cognito", "Keycloak",
        "REST", "GraphQL", "gRPC", "FastAPI", "Express", "Django",
        "Memcached", "Varnish", "CloudFlare",
        "RabbitMQ", "Kafka", "SQS", "Pub/Sub",
        "S3", "GCS", "Azure Blob", "MinIO",
        "Datadog", "New Relic", "Prometheus", "CloudWatch",
    ]
});

#[derive(Debug, Clone)]
pub struct Pattern {
    pub statement: String,
    pub success_rate: f64,
    pub sample_size: u32,
    pub supporting_decisions: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DomainStats {
    pub total_patterns: u32,
    pub high_confidence: u32,
    pub low_confidence: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PatternConflict {
    pub a: String,
    pub b: String,
}

pub struct PatternExtractor {
    store: Arc<dyn GraphStore>,
}

/// Pattern key extraction: (i) curated keyword catalog, case-insensitive;
/// (ii) fallback to the first capitalized word; (iii) fallback to the raw
/// statement.
fn extract_pattern_key(statement: &str) -> String {
    if statement.trim().is_empty() {
        return "unknown".to_string();
    }
    let lower = statement.to_lowercase();
    for keyword in TECH_KEYWORDS.iter() {
        if lower.contains(&keyword.to_lowercase()) {
            return keyword.to_string();
        }
    }
    for word in statement.split_whitespace() {
        if word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) {
            return word.trim_matches(|c: char| ".,;:".contains(c)).to_string();
        }
    }
    statement.trim().to_string()
}

impl PatternExtractor {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Extracts patterns for `domain`: groups decisions with a recorded
    /// outcome status by pattern key, computes per-key success rate, drops
    /// keys below `min_sample_size`, sorts descending by success rate.
    pub fn extract_patterns_for_domain(&self, namespace: &Namespace, domain: &str, min_sample_size: u32) -> Result<Vec<Pattern>> {
        let groups = self.group_by_pattern(namespace, domain)?;

        let mut patterns: Vec<Pattern> = groups
            .into_iter()
            .filter(|(_, group)| group.len() as u32 >= min_sample_size)
            .map(|(key, group)| {
                let total = group.len() as u32;
                let successes = group.iter().filter(|(_, s)| *s).count() as f64;
                Pattern {
                    statement: key,
                    success_rate: successes / total as f64,
                    sample_size: total,
                    supporting_decisions: group.into_iter().map(|(id, _)| id).collect(),
                }
            })
            .collect();

        patterns.sort_by(|a, b| b.success_rate.partial_cmp(&a.success_rate).unwrap_or(std::cmp::Ordering::Equal));
        Ok(patterns)
    }

    fn group_by_pattern(&self, namespace: &Namespace, domain: &str) -> Result<HashMap<String, Vec<(String, bool)>>> {
        let decisions = self.store.list_decisions_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
        let mut groups: HashMap<String, Vec<(String, bool)>> = HashMap::new();
        for decision in &decisions {
            let Some(outcome) = self.store.get_outcome_by_decision(&decision.id)? else {
                continue;
            };
            let Some(final_status) = outcome.final_status else {
                continue;
            };
            let key = extract_pattern_key(&decision.statement);
            let success = matches!(final_status, FinalStatus::Success);
            groups.entry(key).or_default().push((decision.id.clone(), success));
        }
        Ok(groups)
    }

    /// Bucket counts over the domain's patterns: high-confidence (>0.75),
    /// low-confidence (<0.50), everything else in between.
    pub fn get_pattern_stats(&self, namespace: &Namespace, domain: &str, min_sample_size: u32) -> Result<DomainStats> {
        let patterns = self.extract_patterns_for_domain(namespace, domain, min_sample_size)?;
        let mut stats = DomainStats { total_patterns: patterns.len() as u32, ..Default::default() };
        for pattern in &patterns {
            if pattern.success_rate > 0.75 {
                stats.high_confidence += 1;
            } else if pattern.success_rate < 0.50 {
                stats.low_confidence += 1;
            }
        }
        Ok(stats)
    }

    /// Flags pattern pairs that both report success rate >0.60 but whose
    /// statements don't contain one another — i.e. two unrelated approaches
    /// that both claim to work, worth surfacing as a contradiction.
    pub fn detect_conflicting_patterns(&self, namespace: &Namespace, domain: &str, min_sample_size: u32) -> Result<Vec<PatternConflict>> {
        let patterns = self.extract_patterns_for_domain(namespace, domain, min_sample_size)?;
        let candidates: Vec<&Pattern> = patterns.iter().filter(|p| p.success_rate > 0.60).collect();

        let mut conflicts = Vec::new();
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                let a = candidates[i].statement.to_lowercase();
                let b = candidates[j].statement.to_lowercase();
                if !a.contains(&b) && !b.contains(&a) {
                    conflicts.push(PatternConflict {
                        a: candidates[i].statement.clone(),
                        b: candidates[j].statement.clone(),
                    });
                }
            }
        }
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::model::{Decision, Outcome};
    use chrono::Utc;
    use uuid::Uuid;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    fn seed_decision_with_outcome(store: &Arc<dyn GraphStore>, statement: &str, domain: &str, success: bool) -> String {
        let id = format!("d-{}", Uuid::new_v4().simple());
        let decision = Decision::new(id.clone(), ns(), statement, vec![], 0.8, domain, Utc::now()).unwrap();
        store.add_decision(&decision).unwrap();
        let mut outcome = Outcome::new(format!("out-{id}"), id.clone(), Utc::now());
        outcome.finalize(if success { FinalStatus::Success } else { FinalStatus::Failure }, if success { 0.9 } else { 0.1 }, Utc::now()).unwrap();
        store.add_outcome(&outcome).unwrap();
        id
    }

    #[test]
    fn keyword_match_extracts_known_technology() {
        assert_eq!(extract_pattern_key("We migrated to PostgreSQL for durability"), "PostgreSQL");
    }

    #[test]
    fn capitalized_word_fallback_when_no_keyword_matches() {
        assert_eq!(extract_pattern_key("Adopted Terraform for infra."), "Terraform");
    }

    #[test]
    fn raw_statement_fallback_when_nothing_else_matches() {
        assert_eq!(extract_pattern_key("switched to a simpler approach"), "switched to a simpler approach");
    }

    #[test]
    fn patterns_below_min_sample_size_are_dropped_and_rest_sorted_descending() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        seed_decision_with_outcome(&store, "Use Redis for caching", "backend", true);
        seed_decision_with_outcome(&store, "Use Redis for sessions", "backend", true);
        seed_decision_with_outcome(&store, "Use Redis for locks", "backend", false);
        seed_decision_with_outcome(&store, "Use Kafka for events", "backend", true);

        let extractor = PatternExtractor::new(store);
        let patterns = extractor.extract_patterns_for_domain(&ns(), "backend", 3).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].statement, "Redis");
        assert_eq!(patterns[0].sample_size, 3);
        assert!((patterns[0].success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn conflicting_patterns_excludes_substring_pairs() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        for _ in 0..3 {
            seed_decision_with_outcome(&store, "Use Redis for caching", "backend", true);
        }
        for _ in 0..3 {
            seed_decision_with_outcome(&store, "Use Memcached for caching", "backend", true);
        }
        let extractor = PatternExtractor::new(store);
        let conflicts = extractor.detect_conflicting_patterns(&ns(), "backend", 3).unwrap();
        assert_eq!(conflicts.len(), 1);
    }
}
