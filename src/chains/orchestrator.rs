use crate::calibration::{CalibrationEngine, ConfidenceGuidance};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{FinalStatus, Namespace};
use regex::RegexBuilder;
use std::sync::Arc;

const PRIORITY_CALIBRATION: u8 = 1;
const PRIORITY_NEGATIVE_EVIDENCE: u8 = 2;
const PRIORITY_ANTIPATTERN: u8 = 3;
const PRIORITY_POSITIVE_PRECEDENT: u8 = 4;

#[derive(Debug, Clone)]
pub struct ChainResult {
    pub name: &'static str,
    pub priority: u8,
    pub content: String,
}

impl ChainResult {
    fn tokens(&self) -> usize {
        self.content.len() / 4
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainOutput {
    pub text: String,
    pub total_tokens: usize,
    pub truncated: bool,
    pub chains_triggered: Vec<String>,
}

pub struct ChainOrchestrator {
    store: Arc<dyn GraphStore>,
    calibration: CalibrationEngine,
}

fn calibration_warning(calibration: &CalibrationEngine, namespace: &Namespace, domain: &str, confidence: f64) -> Result<String> {
    let guidance = calibration.get_confidence_guidance(namespace, domain, Some(confidence))?;
    let ConfidenceGuidance::Guidance { confidence_gap: Some(gap), sample_size, actual_success_rate, adjustment, .. } = guidance else {
        return Ok(String::new());
    };
    if gap.abs() <= 0.10 || sample_size < 3.0 {
        return Ok(String::new());
    }
    let bias = if gap > 0.0 { "overconfident" } else { "underconfident" };
    let mut out = String::from("## Calibration Warning (Team Bias Detection)\n\n");
    out.push_str(&format!("Team is **{bias}** by {:.0}% in **{domain}** domain.\n\n", gap.abs() * 100.0));
    out.push_str(&format!("- Decisions analyzed: {sample_size:.0}\n"));
    out.push_str(&format!("- Actual success rate: {:.0}%\n", actual_success_rate * 100.0));
    out.push_str(&format!("- Your confidence: {:.0}%\n", confidence * 100.0));
    if let Some(adj) = adjustment {
        let recommended = (confidence + adj).clamp(0.0, 1.0);
        out.push_str(&format!("- Recommended confidence: {:.0}%\n", recommended * 100.0));
    }
    Ok(out)
}

fn negative_evidence(store: &Arc<dyn GraphStore>, namespace: &Namespace, domain: &str, top_n: u32) -> Result<String> {
    let items = store.list_negative_knowledge_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain, top_n)?;
    if items.is_empty() {
        return Ok(String::new());
    }
    let mut out = String::from("## Known Failures (Evidence-Based Warnings)\n\n");
    for item in items.iter().take(top_n as usize) {
        out.push_str(&format!(
            "- {} -> {} -> {:?} -> prevented {} -> {}\n",
            item.hypothesis, item.conclusion, item.severity, item.prevented_count, item.recommendation
        ));
    }
    Ok(out)
}

fn antipattern_guard(store: &Arc<dyn GraphStore>, namespace: &Namespace, domain: &str, statement: &str) -> Result<String> {
    let antipatterns = store.list_antipatterns_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
    if antipatterns.is_empty() {
        return Ok(String::new());
    }

    let mut detected = Vec::new();
    for ap in &antipatterns {
        let regex = match RegexBuilder::new(&ap.regex_pattern).case_insensitive(true).build() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(pattern = %ap.regex_pattern, error = %e, "invalid antipattern regex, skipping");
                continue;
            }
        };
        if regex.is_match(statement) {
            detected.push(ap);
        }
    }
    if detected.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::from("## AntiPattern Guard (Known Problematic Patterns)\n\n");
    for ap in detected.into_iter().take(5) {
        out.push_str(&format!(
            "- {}: failure rate {:.0}%, {:?} severity -> {}\n",
            ap.name,
            ap.failure_rate * 100.0,
            ap.severity,
            ap.remediation()
        ));
    }
    Ok(out)
}

fn positive_precedent(store: &Arc<dyn GraphStore>, namespace: &Namespace, domain: &str) -> Result<String> {
    let decisions = store.list_decisions_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
    let mut successes = Vec::new();
    for decision in &decisions {
        if let Some(outcome) = store.get_outcome_by_decision(&decision.id)? {
            if matches!(outcome.final_status, Some(FinalStatus::Success)) {
                successes.push((decision.clone(), outcome));
            }
        }
    }
    if successes.is_empty() {
        return Ok(String::new());
    }
    successes.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));

    let mut out = String::from("## Positive Precedents (Successful Decisions)\n\n");
    for (decision, outcome) in successes.into_iter().take(3) {
        out.push_str(&format!(
            "- **{}** (confidence {:.0}%, {})\n",
            decision.statement,
            decision.confidence * 100.0,
            decision.created_at.to_rfc3339()
        ));
        if let Some(score) = outcome.final_score {
            out.push_str(&format!("  - outcome score: {:.2}\n", score));
        }
    }
    Ok(out)
}

impl ChainOrchestrator {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { calibration: CalibrationEngine::new(store.clone()), store }
    }

    /// Runs all four chains in priority order (calibration first, positive
    /// precedent last), concatenates them, and truncates tail-first if the
    /// result exceeds `max_tokens`.
    pub fn build_context(&self, namespace: &Namespace, domain: &str, statement: &str, confidence: f64, max_tokens: usize) -> Result<ChainOutput> {
        let mut results = vec![
            ChainResult { name: "calibration_warning", priority: PRIORITY_CALIBRATION, content: calibration_warning(&self.calibration, namespace, domain, confidence)? },
            ChainResult { name: "negative_evidence", priority: PRIORITY_NEGATIVE_EVIDENCE, content: negative_evidence(&self.store, namespace, domain, 5)? },
            ChainResult { name: "antipattern_guard", priority: PRIORITY_ANTIPATTERN, content: antipattern_guard(&self.store, namespace, domain, statement)? },
            ChainResult { name: "positive_precedent", priority: PRIORITY_POSITIVE_PRECEDENT, content: positive_precedent(&self.store, namespace, domain)? },
        ];
        results.retain(|r| !r.content.is_empty());
        results.sort_by_key(|r| r.priority);

        let mut text = String::new();
        let mut total_tokens = 0usize;
        let mut truncated = false;
        let mut chains_triggered = Vec::new();

        for result in &results {
            let tokens = result.tokens();
            if total_tokens + tokens <= max_tokens {
                text.push_str(&result.content);
                text.push('\n');
                total_tokens += tokens;
                chains_triggered.push(result.name.to_string());
            } else {
                text.push_str("\n*[truncated]*\n");
                truncated = true;
                break;
            }
        }

        Ok(ChainOutput { text, total_tokens, truncated, chains_triggered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::model::{AntiPattern, Decision, NegativeKnowledge, Outcome, Severity};
    use chrono::Utc;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn empty_store_produces_no_chains() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let orchestrator = ChainOrchestrator::new(store);
        let output = orchestrator.build_context(&ns(), "backend", "use X", 0.8, 2000).unwrap();
        assert!(output.chains_triggered.is_empty());
        assert!(!output.truncated);
    }

    #[test]
    fn antipattern_match_is_detected_case_insensitively() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let ap = AntiPattern {
            id: "ap1".into(),
            name: "God Object".into(),
            domain: "backend".into(),
            severity: Severity::High,
            failure_rate: 0.8,
            regex_pattern: "god object".into(),
            keywords: vec![],
            removal_rate: 0.1,
            repos_affected: 3,
        };
        store.add_antipattern(&ns().tenant_id, &ns().team_id, &ns().project_id, &ap).unwrap();

        let orchestrator = ChainOrchestrator::new(store);
        let output = orchestrator.build_context(&ns(), "backend", "Build a GOD OBJECT for everything", 0.8, 2000).unwrap();
        assert!(output.text.contains("strongly reconsider"));
    }

    #[test]
    fn negative_knowledge_and_positive_precedent_both_render() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let nk = NegativeKnowledge::new("nk1", ns(), "assumed X", "caused Y", "backend", Severity::High, "avoid X", Utc::now());
        store.add_negative_knowledge(&nk).unwrap();

        let decision = Decision::new("d1", ns(), "use Redis", vec![], 0.9, "backend", Utc::now()).unwrap();
        store.add_decision(&decision).unwrap();
        let mut outcome = Outcome::new("out1", "d1", Utc::now());
        outcome.finalize(FinalStatus::Success, 0.95, Utc::now()).unwrap();
        store.add_outcome(&outcome).unwrap();

        let orchestrator = ChainOrchestrator::new(store);
        let output = orchestrator.build_context(&ns(), "backend", "use Redis again", 0.8, 2000).unwrap();
        assert!(output.text.contains("Known Failures"));
        assert!(output.text.contains("Positive Precedents"));
    }
}
