//! The seven `membria.*` tools (spec §4.J), wired over the typed
//! components rather than re-implementing any of their logic.

use crate::calibration::{CalibrationEngine, ConfidenceGuidance};
use crate::composer::ContextComposer;
use crate::error::{Error, Result};
use crate::firewall::Firewall;
use crate::graph::GraphStore;
use crate::model::{Decision, Engram, FinalStatus, Namespace};
use crate::outcome::OutcomeTracker;
use chrono::Utc;
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct ToolContext {
    store: Arc<dyn GraphStore>,
    tracker: OutcomeTracker,
    calibration: CalibrationEngine,
    composer: ContextComposer,
    firewall: Firewall,
}

impl ToolContext {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            tracker: OutcomeTracker::new(store.clone()),
            calibration: CalibrationEngine::new(store.clone()),
            composer: ContextComposer::with_default_plugin_order(store.clone()),
            firewall: Firewall::new(),
            store,
        }
    }
}

fn namespace_from_args(args: &Value) -> Namespace {
    let get = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or("default").to_string();
    Namespace::new(get("tenant_id"), get("team_id"), get("project_id"))
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty()).ok_or_else(|| Error::InvalidArgument(format!("{key} is required")))
}

fn required_f64(args: &Value, key: &str) -> Result<f64> {
    args.get(key).and_then(|v| v.as_f64()).ok_or_else(|| Error::InvalidArgument(format!("{key} is required")))
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key).and_then(|v| v.as_array()).map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect()).unwrap_or_default()
}

/// Descriptors surfaced by `tools/list`; minimal JSON Schema, matching
/// the argument shapes each handler below actually reads.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({"name": "membria.capture_decision", "description": "Record a new decision.", "inputSchema": {"type": "object", "required": ["statement", "confidence"]}}),
        json!({"name": "membria.record_outcome", "description": "Record or finalize an outcome for a decision.", "inputSchema": {"type": "object", "required": ["decision_id", "final_status", "final_score"]}}),
        json!({"name": "membria.get_calibration", "description": "Get team calibration for a domain.", "inputSchema": {"type": "object", "required": ["domain"]}}),
        json!({"name": "membria.get_decision_context", "description": "Build evidence context for a pending decision.", "inputSchema": {"type": "object", "required": ["statement", "module", "confidence"]}}),
        json!({"name": "membria.get_plan_context", "description": "Build evidence context before planning (PRE-PLAN).", "inputSchema": {"type": "object", "required": ["domain"]}}),
        json!({"name": "membria.validate_plan", "description": "Scan plan steps for known antipatterns (MID-PLAN).", "inputSchema": {"type": "object", "required": ["steps"]}}),
        json!({"name": "membria.record_plan", "description": "Record an approved plan as decisions (POST-PLAN).", "inputSchema": {"type": "object", "required": ["plan_steps", "domain"]}}),
    ]
}

pub async fn dispatch(ctx: &ToolContext, name: &str, arguments: Value) -> Result<Value> {
    match name {
        "membria.capture_decision" => capture_decision(ctx, arguments),
        "membria.record_outcome" => record_outcome(ctx, arguments),
        "membria.get_calibration" => get_calibration(ctx, arguments),
        "membria.get_decision_context" => get_decision_context(ctx, arguments),
        "membria.get_plan_context" => get_plan_context(ctx, arguments),
        "membria.validate_plan" => validate_plan(ctx, arguments),
        "membria.record_plan" => record_plan(ctx, arguments),
        other => Err(Error::NotFound(format!("tool: {other}"))),
    }
}

/// Antipattern names whose regex matches `text`, scoped to `domain`.
/// Invalid regexes are skipped with a warning, never fatal (spec §4.G.3).
fn matched_antipattern_names(ctx: &ToolContext, namespace: &Namespace, domain: &str, text: &str) -> Result<Vec<String>> {
    let antipatterns = ctx.store.list_antipatterns_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
    let mut detected = Vec::new();
    for ap in &antipatterns {
        match RegexBuilder::new(&ap.regex_pattern).case_insensitive(true).build() {
            Ok(re) if re.is_match(text) => detected.push(ap.name.clone()),
            Ok(_) => {}
            Err(e) => tracing::warn!(pattern = %ap.regex_pattern, error = %e, "invalid antipattern regex, skipping"),
        }
    }
    Ok(detected)
}

/// §4.J `membria.capture_decision`, with the pre-decision firewall (§4.I)
/// run first: a BLOCK verdict (critical red flag, or 2+ high) rejects the
/// capture unless `override: true` is passed, matching spec §8 scenario 3.
/// A WARN verdict never blocks capture — it is only ever surfaced back to
/// the caller alongside the recorded decision.
fn capture_decision(ctx: &ToolContext, args: Value) -> Result<Value> {
    let statement = required_str(&args, "statement")?;
    let confidence = required_f64(&args, "confidence")?;
    let alternatives = string_list(&args, "alternatives");
    let module = args.get("module").and_then(|v| v.as_str()).unwrap_or("general");
    let time_pressure = args.get("time_pressure").and_then(|v| v.as_bool()).unwrap_or(false);
    let override_block = args.get("override").and_then(|v| v.as_bool()).unwrap_or(false);
    let namespace = namespace_from_args(&args);

    let detected = matched_antipattern_names(ctx, &namespace, module, statement)?;
    let firewall_result = ctx.firewall.evaluate(statement, confidence, &alternatives, &detected, time_pressure);

    if firewall_result.decision == crate::firewall::FirewallDecision::Block && !override_block {
        return Ok(json!({"status": "blocked", "firewall": firewall_result}));
    }

    let id = format!("dec_{}", Uuid::new_v4().simple());
    let decision = Decision::new(id.clone(), namespace, statement, alternatives, confidence, module, Utc::now())?;
    ctx.store.add_decision(&decision)?;

    Ok(json!({"decision_id": decision.id, "status": decision.status, "module": decision.module, "firewall": firewall_result}))
}

fn record_outcome(ctx: &ToolContext, args: Value) -> Result<Value> {
    let decision_id = required_str(&args, "decision_id")?;
    let final_status: FinalStatus = serde_json::from_value(args.get("final_status").cloned().ok_or_else(|| Error::InvalidArgument("final_status is required".to_string()))?)
        .map_err(|e| Error::InvalidArgument(format!("invalid final_status: {e}")))?;
    let final_score = required_f64(&args, "final_score")?;
    let decision_domain = args.get("decision_domain").and_then(|v| v.as_str());
    let namespace = namespace_from_args(&args);

    let outcome = match ctx.store.get_outcome_by_decision(decision_id)? {
        Some(o) => o,
        None => ctx.tracker.create_outcome(decision_id)?,
    };

    let domain_pair = decision_domain.map(|d| (&namespace, d));
    let outcome = ctx.tracker.finalize_outcome(&outcome.id, final_status, final_score, domain_pair, &ctx.calibration)?;

    Ok(json!({
        "outcome_id": outcome.id,
        "decision_id": outcome.decision_id,
        "final_status": outcome.final_status,
        "final_score": outcome.final_score,
    }))
}

fn get_calibration(ctx: &ToolContext, args: Value) -> Result<Value> {
    let domain = required_str(&args, "domain")?;
    let namespace = namespace_from_args(&args);
    let confidence = args.get("confidence").and_then(|v| v.as_f64());

    match ctx.calibration.get_confidence_guidance(&namespace, domain, confidence)? {
        ConfidenceGuidance::NoData => Ok(json!({"domain": domain, "status": "no_data"})),
        ConfidenceGuidance::Guidance { actual_success_rate, confidence_gap, adjustment, recommendation, credible_interval_95, trend, sample_size } => {
            Ok(json!({
                "domain": domain,
                "status": "ok",
                "actual_success_rate": actual_success_rate,
                "confidence_gap": confidence_gap,
                "adjustment": adjustment,
                "recommendation": recommendation,
                "credible_interval_95": credible_interval_95,
                "trend": trend,
                "sample_size": sample_size,
            }))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_context(
    ctx: &ToolContext,
    namespace: &Namespace,
    statement: &str,
    module: &str,
    confidence: f64,
    max_tokens: usize,
    include_chains: bool,
) -> Result<Value> {
    let (result, _surface) = ctx.composer.build_decision_context(namespace, statement, module, confidence, max_tokens, include_chains, None, None, &[], &[])?;
    Ok(json!({
        "decision_statement": statement,
        "module": module,
        "compact_context": result.compact_context,
        "total_tokens": result.total_tokens,
        "truncated": result.truncated,
        "sections_included": result.sections_included,
    }))
}

fn get_decision_context(ctx: &ToolContext, args: Value) -> Result<Value> {
    let statement = required_str(&args, "statement")?;
    let module = required_str(&args, "module")?;
    let confidence = required_f64(&args, "confidence")?;
    let max_tokens = args.get("max_tokens").and_then(|v| v.as_u64()).unwrap_or(2000) as usize;
    let include_chains = args.get("include_chains").and_then(|v| v.as_bool()).unwrap_or(true);
    let namespace = namespace_from_args(&args);
    build_context(ctx, &namespace, statement, module, confidence, max_tokens, include_chains)
}

/// §4.J `membria.get_plan_context` — `{domain, scope?}`. Unlike
/// `get_decision_context` this has no single statement/confidence to
/// evaluate; it surveys the domain as a whole: past plans (decisions
/// captured in this domain), failed approaches (negative knowledge),
/// successful patterns (decisions with a successful outcome), the domain's
/// calibration, and a composed markdown briefing built from the same
/// evidence. `scope`, when supplied, narrows the antipattern/chain scan
/// text; otherwise the domain name stands in for it.
fn get_plan_context(ctx: &ToolContext, args: Value) -> Result<Value> {
    let domain = required_str(&args, "domain")?;
    let scope = args.get("scope").and_then(|v| v.as_str()).unwrap_or(domain);
    let max_tokens = args.get("max_tokens").and_then(|v| v.as_u64()).unwrap_or(2000) as usize;
    let namespace = namespace_from_args(&args);

    let guidance = ctx.calibration.get_confidence_guidance(&namespace, domain, None)?;
    let scan_confidence = match &guidance {
        ConfidenceGuidance::Guidance { actual_success_rate, .. } => *actual_success_rate,
        ConfidenceGuidance::NoData => 0.5,
    };

    let (context, _surface) = ctx
        .composer
        .build_decision_context(&namespace, scope, domain, scan_confidence, max_tokens, true, None, None, &[], &[])?;

    let failed_approaches = ctx.store.list_negative_knowledge_by_domain(
        &namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain, 10,
    )?;

    let past_plans = ctx.store.list_decisions_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;
    let mut successful_patterns = Vec::new();
    for decision in &past_plans {
        if let Some(outcome) = ctx.store.get_outcome_by_decision(&decision.id)? {
            if matches!(outcome.final_status, Some(FinalStatus::Success)) {
                successful_patterns.push(json!({
                    "decision_id": decision.id,
                    "statement": decision.statement,
                    "confidence": decision.confidence,
                    "final_score": outcome.final_score,
                }));
            }
        }
    }

    let calibration_json = match &guidance {
        ConfidenceGuidance::NoData => json!({"status": "no_data"}),
        ConfidenceGuidance::Guidance { actual_success_rate, trend, sample_size, credible_interval_95, .. } => json!({
            "status": "ok",
            "actual_success_rate": actual_success_rate,
            "trend": trend,
            "sample_size": sample_size,
            "credible_interval_95": credible_interval_95,
        }),
    };

    let mut recommendations = Vec::new();
    if let ConfidenceGuidance::Guidance { recommendation: Some(r), .. } = &guidance {
        recommendations.push(r.clone());
    }

    Ok(json!({
        "domain": domain,
        "scope": scope,
        "markdown": context.compact_context,
        "total_tokens": context.total_tokens,
        "truncated": context.truncated,
        "past_plans": past_plans.iter().map(|d| json!({"decision_id": d.id, "statement": d.statement, "confidence": d.confidence})).collect::<Vec<_>>(),
        "failed_approaches": failed_approaches.iter().map(|nk| json!({
            "hypothesis": nk.hypothesis,
            "conclusion": nk.conclusion,
            "severity": nk.severity,
            "recommendation": nk.recommendation,
        })).collect::<Vec<_>>(),
        "successful_patterns": successful_patterns,
        "calibration": calibration_json,
        "constraints": Vec::<String>::new(),
        "recommendations": recommendations,
    }))
}

/// Severity tier for a step-level antipattern match, reusing the same
/// failure-rate bands as the AntiPattern Guard chain (spec §4.G.3).
fn step_severity(failure_rate: f64) -> &'static str {
    if failure_rate > 0.70 {
        "high"
    } else if failure_rate > 0.50 {
        "medium"
    } else {
        "low"
    }
}

/// §4.J `membria.validate_plan` — `{steps:[string], domain?}`. Scans each
/// step against the domain's known antipatterns (no per-step confidence or
/// alternatives are supplied, so the full red-flag firewall in §4.I does
/// not apply here; this is the plan-level antipattern sweep named in the
/// result shape: `total_steps, warnings[], high/medium/low_severity,
/// can_proceed`).
fn validate_plan(ctx: &ToolContext, args: Value) -> Result<Value> {
    let steps = string_list(&args, "steps");
    let domain = args.get("domain").and_then(|v| v.as_str()).unwrap_or("general");
    let namespace = namespace_from_args(&args);

    let antipatterns = ctx.store.list_antipatterns_by_domain(&namespace.tenant_id, &namespace.team_id, &namespace.project_id, domain)?;

    let mut warnings = Vec::new();
    let mut high_severity = 0u32;
    let mut medium_severity = 0u32;
    let mut low_severity = 0u32;

    for (index, step) in steps.iter().enumerate() {
        for ap in &antipatterns {
            let regex = match RegexBuilder::new(&ap.regex_pattern).case_insensitive(true).build() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(pattern = %ap.regex_pattern, error = %e, "invalid antipattern regex, skipping");
                    continue;
                }
            };
            if !regex.is_match(step) {
                continue;
            }
            let severity = step_severity(ap.failure_rate);
            match severity {
                "high" => high_severity += 1,
                "medium" => medium_severity += 1,
                _ => low_severity += 1,
            }
            warnings.push(json!({
                "step_index": index,
                "step": step,
                "pattern": ap.name,
                "severity": severity,
                "failure_rate": ap.failure_rate,
                "recommendation": ap.remediation(),
            }));
        }
    }

    Ok(json!({
        "total_steps": steps.len(),
        "warnings": warnings,
        "high_severity": high_severity,
        "medium_severity": medium_severity,
        "low_severity": low_severity,
        "can_proceed": high_severity == 0,
    }))
}

/// §4.J `membria.record_plan` — records each approved plan step as a
/// Decision in `domain` and the whole recording event as an Engram, the
/// atomic session-checkpoint named in spec §3's data model.
fn record_plan(ctx: &ToolContext, args: Value) -> Result<Value> {
    let plan_steps = string_list(&args, "plan_steps");
    let domain = required_str(&args, "domain")?;
    // Default confidence for a recorded plan step when the caller doesn't
    // supply one: neutral (neither under- nor over-confident) rather than
    // guessing a number the caller didn't state.
    let plan_confidence = args.get("plan_confidence").and_then(|v| v.as_f64()).unwrap_or(0.5);
    let namespace = namespace_from_args(&args);
    let now = Utc::now();

    let engram_id = format!("eng_{}", Uuid::new_v4().simple());
    let mut engram = Engram::new(engram_id.clone(), format!("plan-{}", Uuid::new_v4().simple()), now);
    engram.reasoning_trail = Some(plan_steps.clone());
    engram.confidence_trajectory = Some(vec![plan_confidence; plan_steps.len()]);

    let mut side_channel = serde_json::Map::new();
    if let Some(v) = args.get("duration_estimate") {
        side_channel.insert("duration_estimate".to_string(), v.clone());
    }
    if let Some(v) = args.get("warnings_shown") {
        side_channel.insert("warnings_shown".to_string(), v.clone());
    }
    if let Some(v) = args.get("warnings_heeded") {
        side_channel.insert("warnings_heeded".to_string(), v.clone());
    }
    if !side_channel.is_empty() {
        engram.tool_call_graph = Some(Value::Object(side_channel));
    }

    let mut decisions_recorded = Vec::new();
    for step in &plan_steps {
        let id = format!("dec_{}", Uuid::new_v4().simple());
        let decision = Decision::new(id.clone(), namespace.clone(), step, vec![], plan_confidence, domain, now)?;
        ctx.store.add_decision(&decision)?;
        engram.decisions_extracted.push(decision.id.clone());
        decisions_recorded.push(json!({"step": step, "decision_id": decision.id}));
    }

    ctx.store.add_engram(&engram)?;

    Ok(json!({
        "engram_id": engram.id,
        "decisions_recorded": decisions_recorded,
        "status": "recorded",
    }))
}
