//! Context manager plug-in pipeline, grounded in
//! `examples/original_source/src/membria/context_manager.py` and
//! `decision_surface.py`.

mod surface;

pub use surface::{DecisionSurface, SimilarDecision, TeamCalibration};

use crate::chains::ChainOrchestrator;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{Namespace, NegativeKnowledge, Skill};
use std::sync::Arc;

const DEFAULT_PLUGIN_ORDER: &[&str] = &[
    "docshot",
    "session_context",
    "calibration",
    "negative_knowledge",
    "role_negative_knowledge",
    "similar_decisions",
    "role_skills",
    "behavior_chains",
];

#[derive(Debug, Clone)]
struct Section {
    name: &'static str,
    content: String,
    priority: u8,
}

impl Section {
    fn tokens(&self) -> usize {
        self.content.len() / 4
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocShotRef {
    pub doc_shot_id: String,
    pub document_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SessionContextRef {
    pub task: Option<String>,
    pub focus: Option<String>,
    pub current_plan: Option<String>,
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DecisionContextResult {
    pub compact_context: String,
    pub total_tokens: usize,
    pub truncated: bool,
    pub sections_included: Vec<SectionSummary>,
}

pub struct ContextComposer {
    store: Arc<dyn GraphStore>,
    surface: DecisionSurface,
    chains: ChainOrchestrator,
    plugin_order: Vec<String>,
}

fn sanitize(text: &str, max_len: usize) -> String {
    let sanitized = crate::kb::sanitize_text(text);
    sanitized.chars().take(max_len).collect()
}

impl ContextComposer {
    pub fn new(store: Arc<dyn GraphStore>, plugin_order: Vec<String>) -> Self {
        let mut order = plugin_order;
        if !order.iter().any(|n| n == "role_negative_knowledge") {
            order.push("role_negative_knowledge".to_string());
        }
        if !order.iter().any(|n| n == "role_skills") {
            order.push("role_skills".to_string());
        }
        Self {
            surface: DecisionSurface::new(store.clone()),
            chains: ChainOrchestrator::new(store.clone()),
            store,
            plugin_order: order,
        }
    }

    pub fn with_default_plugin_order(store: Arc<dyn GraphStore>) -> Self {
        Self::new(store, DEFAULT_PLUGIN_ORDER.iter().map(|s| s.to_string()).collect())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build_decision_context(
        &self,
        namespace: &Namespace,
        statement: &str,
        module: &str,
        confidence: f64,
        max_tokens: usize,
        include_chains: bool,
        docshot: Option<DocShotRef>,
        session_context: Option<SessionContextRef>,
        role_skills: &[Skill],
        role_negative_knowledge: &[NegativeKnowledge],
    ) -> Result<(DecisionContextResult, crate::composer::surface::Surface)> {
        let surface = self.surface.generate(namespace, module, confidence)?;

        let mut sections = Vec::new();
        if let Some(section) = docshot_section(docshot.as_ref()) {
            sections.push(section);
        }
        if let Some(section) = session_section(session_context.as_ref()) {
            sections.push(section);
        }
        if let Some(section) = calibration_section(&surface) {
            sections.push(section);
        }
        if let Some(section) = negative_knowledge_section(&surface) {
            sections.push(section);
        }
        if let Some(section) = role_negative_knowledge_section(role_negative_knowledge) {
            sections.push(section);
        }
        if let Some(section) = similar_decisions_section(&surface) {
            sections.push(section);
        }
        if let Some(section) = role_skills_section(role_skills) {
            sections.push(section);
        }
        if include_chains {
            match self.chains.build_context(namespace, module, statement, confidence, max_tokens) {
                Ok(output) if !output.text.trim().is_empty() => {
                    sections.push(Section { name: "behavior_chains", content: output.text, priority: 5 });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "behavior chains failed, skipping"),
            }
        }

        // Respect the configured plug-in order as a filter: drop any section
        // whose name isn't in `plugin_order` (unknown names are already
        // simply absent since we never produce them).
        sections.retain(|s| self.plugin_order.iter().any(|n| n == s.name));

        let result = compact_sections(sections, max_tokens);
        Ok((result, surface))
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }
}

fn docshot_section(docshot: Option<&DocShotRef>) -> Option<Section> {
    let docshot = docshot?;
    let content = format!(
        "## DocShot (Provenance)\n- DocShot ID: {}\n- Documents: {}\n",
        sanitize(&docshot.doc_shot_id, 80),
        docshot.document_count
    );
    Some(Section { name: "docshot", content, priority: 0 })
}

fn session_section(session: Option<&SessionContextRef>) -> Option<Section> {
    let session = session?;
    let mut lines = vec!["## Session Context".to_string()];
    if let Some(task) = &session.task {
        lines.push(format!("- Task: {}", sanitize(task, 200)));
    }
    if let Some(focus) = &session.focus {
        lines.push(format!("- Focus: {}", sanitize(focus, 200)));
    }
    if let Some(plan) = &session.current_plan {
        lines.push(format!("- Plan: {}", sanitize(plan, 280)));
    }
    for constraint in session.constraints.iter().take(5) {
        lines.push(format!("- Constraint: {}", sanitize(constraint, 160)));
    }
    if lines.len() == 1 {
        return None;
    }
    Some(Section { name: "session_context", content: lines.join("\n") + "\n", priority: 1 })
}

fn calibration_section(surface: &surface::Surface) -> Option<Section> {
    let cal = surface.team_calibration.as_ref()?;
    let content = format!(
        "## Team Calibration\n- Success rate: {:.0}%\n- Confidence gap: {:+.0}%\n- Sample size: {:.0}\n",
        cal.actual_success_rate * 100.0,
        cal.confidence_gap.unwrap_or(0.0) * 100.0,
        cal.sample_size
    );
    Some(Section { name: "calibration", content, priority: 2 })
}

fn negative_knowledge_section(surface: &surface::Surface) -> Option<Section> {
    if surface.negative_knowledge_alerts.is_empty() {
        return None;
    }
    let mut lines = vec!["## Negative Knowledge (Avoid)".to_string()];
    for alert in surface.negative_knowledge_alerts.iter().take(5) {
        lines.push(format!("- {}: {}", sanitize(&alert.hypothesis, 120), sanitize(&alert.recommendation, 160)));
    }
    Some(Section { name: "negative_knowledge", content: lines.join("\n") + "\n", priority: 3 })
}

fn role_negative_knowledge_section(items: &[NegativeKnowledge]) -> Option<Section> {
    if items.is_empty() {
        return None;
    }
    let mut lines = vec!["## Role Negative Knowledge (Avoid)".to_string()];
    for item in items.iter().take(5) {
        lines.push(format!("- {}: {}", sanitize(&item.hypothesis, 120), sanitize(&item.recommendation, 160)));
    }
    Some(Section { name: "role_negative_knowledge", content: lines.join("\n") + "\n", priority: 3 })
}

fn similar_decisions_section(surface: &surface::Surface) -> Option<Section> {
    if surface.similar_decisions.is_empty() {
        return None;
    }
    let mut lines = vec!["## Similar Decisions".to_string()];
    for item in surface.similar_decisions.iter().take(5) {
        lines.push(format!("- {} ({})", sanitize(&item.statement, 160), item.outcome));
    }
    Some(Section { name: "similar_decisions", content: lines.join("\n") + "\n", priority: 4 })
}

fn role_skills_section(skills: &[Skill]) -> Option<Section> {
    if skills.is_empty() {
        return None;
    }
    let mut lines = vec!["## Role Skills (Use)".to_string()];
    for skill in skills.iter().take(5) {
        lines.push(format!("- {}", sanitize(&skill.domain, 80)));
    }
    Some(Section { name: "role_skills", content: lines.join("\n") + "\n", priority: 4 })
}

/// Compaction per spec §4.H: sort ascending by priority, emit whole sections
/// while they fit, emit one truncated partial section if >=20 tokens of
/// budget remain, then stop.
fn compact_sections(mut sections: Vec<Section>, max_tokens: usize) -> DecisionContextResult {
    if sections.is_empty() {
        return DecisionContextResult { compact_context: String::new(), total_tokens: 0, truncated: false, sections_included: vec![] };
    }
    sections.sort_by_key(|s| s.priority);

    let header = "# Decision Context (Unified)\n";
    let mut text = header.to_string();
    let mut tokens_used = header.len() / 4;
    let mut included = Vec::new();
    let mut truncated = false;

    for section in &sections {
        let tokens = section.tokens();
        if tokens_used + tokens <= max_tokens {
            text.push_str(section.content.trim());
            text.push('\n');
            tokens_used += tokens;
            included.push(SectionSummary { name: section.name.to_string(), tokens });
        } else {
            let remaining = max_tokens.saturating_sub(tokens_used);
            if remaining > 20 {
                let chars = remaining * 4;
                let snippet: String = section.content.chars().take(chars).collect();
                let snippet = snippet.trim_end();
                text.push_str(snippet);
                text.push('\n');
                let snippet_tokens = snippet.len() / 4;
                tokens_used += snippet_tokens;
                included.push(SectionSummary { name: section.name.to_string(), tokens: snippet_tokens });
            }
            truncated = true;
            break;
        }
    }

    if truncated {
        text.push_str("*[Context truncated to fit token budget]*\n");
    }

    DecisionContextResult { compact_context: text, total_tokens: tokens_used, truncated, sections_included: included }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn empty_inputs_produce_empty_context() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let composer = ContextComposer::with_default_plugin_order(store);
        let (result, _surface) = composer
            .build_decision_context(&ns(), "use X", "backend", 0.8, 2000, true, None, None, &[], &[])
            .unwrap();
        assert!(result.sections_included.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn docshot_and_session_sections_appear_in_priority_order() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let composer = ContextComposer::with_default_plugin_order(store);
        let docshot = DocShotRef { doc_shot_id: "ds1".into(), document_count: 2 };
        let session = SessionContextRef { task: Some("fix bug".into()), focus: None, current_plan: None, constraints: vec![] };
        let (result, _surface) = composer
            .build_decision_context(&ns(), "use X", "backend", 0.8, 2000, false, Some(docshot), Some(session), &[], &[])
            .unwrap();
        assert_eq!(result.sections_included[0].name, "docshot");
        assert_eq!(result.sections_included[1].name, "session_context");
    }

    #[test]
    fn tiny_budget_truncates_and_marks_result() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::in_memory().unwrap());
        let composer = ContextComposer::with_default_plugin_order(store);
        let docshot = DocShotRef { doc_shot_id: "ds1".into(), document_count: 2 };
        let session = SessionContextRef { task: Some("fix bug".into()), focus: Some("auth".into()), current_plan: Some("plan".into()), constraints: vec!["c1".into()] };
        let (result, _surface) = composer
            .build_decision_context(&ns(), "use X", "backend", 0.8, 5, false, Some(docshot), Some(session), &[], &[])
            .unwrap();
        assert!(result.truncated);
    }
}
