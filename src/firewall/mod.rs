//! Anti-bias firewall, grounded in
//! `examples/original_source/src/membria/red_flags.py` and `firewall.py`:
//! pre-decision red-flag detection and an allow/warn/block verdict.

const OVERCONFIDENT_WORDS: &[&str] = &[
    "definitely", "obviously", "always", "never", "certainly", "absolutely",
    "100%", "guaranteed", "the best", "perfect", "foolproof", "unquestionably",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RedFlagSeverity {
    fn weight(self) -> f64 {
        match self {
            RedFlagSeverity::Low => 0.2,
            RedFlagSeverity::Medium => 0.4,
            RedFlagSeverity::High => 0.7,
            RedFlagSeverity::Critical => 1.0,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RedFlag {
    pub flag_id: &'static str,
    pub name: String,
    pub description: String,
    pub severity: RedFlagSeverity,
    pub evidence: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallDecision {
    Allow,
    Warn,
    Block,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FirewallResult {
    pub decision: FirewallDecision,
    pub risk_score: f64,
    pub flags: Vec<RedFlag>,
    pub message: String,
    pub override_required: bool,
}

#[derive(Debug, Default)]
pub struct RedFlagDetector;

impl RedFlagDetector {
    pub fn new() -> Self {
        Self
    }

    /// Runs all five detectors against a proposed decision.
    pub fn detect(
        &self,
        decision_statement: &str,
        confidence: f64,
        alternatives: &[String],
        antipatterns_detected: &[String],
        time_pressure: bool,
    ) -> Vec<RedFlag> {
        let mut flags = Vec::new();

        if confidence < 0.5 {
            flags.push(flag_low_confidence(confidence, alternatives));
        }
        if alternatives.len() < 2 {
            flags.push(flag_no_alternatives());
        }
        for pattern in antipatterns_detected {
            flags.push(flag_antipattern(pattern));
        }
        if confidence > 0.85 && has_overconfident_language(decision_statement) {
            flags.push(flag_overconfident_language());
        }
        if time_pressure {
            flags.push(flag_time_pressure());
        }

        flags
    }

    /// Severity-weighted risk score, capped at 1.0.
    pub fn calculate_risk_score(&self, flags: &[RedFlag]) -> f64 {
        if flags.is_empty() {
            return 0.0;
        }
        let total: f64 = flags.iter().map(|f| f.severity.weight()).sum();
        (total / 3.0).min(1.0)
    }

    /// Block on any CRITICAL flag or 2+ HIGH flags.
    pub fn should_block(&self, flags: &[RedFlag]) -> bool {
        if flags.iter().any(|f| f.severity == RedFlagSeverity::Critical) {
            return true;
        }
        flags.iter().filter(|f| f.severity == RedFlagSeverity::High).count() >= 2
    }

    /// Warn (when not already blocked) on 1+ HIGH or 2+ MEDIUM flags.
    pub fn should_warn(&self, flags: &[RedFlag]) -> bool {
        if self.should_block(flags) {
            return false;
        }
        let high = flags.iter().filter(|f| f.severity == RedFlagSeverity::High).count();
        let medium = flags.iter().filter(|f| f.severity == RedFlagSeverity::Medium).count();
        high >= 1 || medium >= 2
    }
}

fn flag_low_confidence(confidence: f64, alternatives: &[String]) -> RedFlag {
    let has_alts = alternatives.len() >= 2;
    let (severity, evidence, recommendation) = if has_alts {
        (
            RedFlagSeverity::Low,
            format!("Confidence is {}%, but alternatives exist", (confidence * 100.0) as i64),
            "Proceed carefully - consider more exploration time".to_string(),
        )
    } else {
        (
            RedFlagSeverity::Critical,
            format!("Confidence is {}% and no alternatives considered", (confidence * 100.0) as i64),
            "Blocked: generate alternatives first".to_string(),
        )
    };
    RedFlag {
        flag_id: "low_confidence",
        name: "Low Confidence Without Alternatives".to_string(),
        description: "Decision made with low confidence and no backup options".to_string(),
        severity,
        evidence,
        recommendation,
    }
}

fn flag_no_alternatives() -> RedFlag {
    RedFlag {
        flag_id: "no_alternatives",
        name: "No Alternatives Considered".to_string(),
        description: "Only one option was evaluated".to_string(),
        severity: RedFlagSeverity::Medium,
        evidence: "Zero alternatives listed".to_string(),
        recommendation: "Brainstorm at least 2-3 alternatives before deciding".to_string(),
    }
}

fn flag_antipattern(pattern_name: &str) -> RedFlag {
    RedFlag {
        flag_id: "antipattern_detected",
        name: format!("Known Antipattern: {pattern_name}"),
        description: format!("Decision mentions '{pattern_name}' which is a known problematic pattern"),
        severity: RedFlagSeverity::High,
        evidence: format!("'{pattern_name}' is removed in 80%+ of codebases"),
        recommendation: "Avoid this pattern. Use proven alternatives instead.".to_string(),
    }
}

fn flag_overconfident_language() -> RedFlag {
    RedFlag {
        flag_id: "overconfident",
        name: "Overconfident Language".to_string(),
        description: "Strong certainty claims without evidence".to_string(),
        severity: RedFlagSeverity::Medium,
        evidence: "Words like 'definitely', 'obviously', 'always' used without qualification".to_string(),
        recommendation: "Add evidence or caveats. Be more precise about what you know.".to_string(),
    }
}

fn flag_time_pressure() -> RedFlag {
    RedFlag {
        flag_id: "time_pressure",
        name: "Time Pressure Detected".to_string(),
        description: "Decision made under time constraints".to_string(),
        severity: RedFlagSeverity::Medium,
        evidence: "Quick decision without proper analysis".to_string(),
        recommendation: "Slow down if possible. Take 10 minutes to reconsider.".to_string(),
    }
}

fn has_overconfident_language(statement: &str) -> bool {
    let lower = statement.to_lowercase();
    OVERCONFIDENT_WORDS.iter().any(|word| lower.contains(word))
}

pub struct Firewall {
    detector: RedFlagDetector,
}

impl Default for Firewall {
    fn default() -> Self {
        Self::new()
    }
}

impl Firewall {
    pub fn new() -> Self {
        Self { detector: RedFlagDetector::new() }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        decision_statement: &str,
        confidence: f64,
        alternatives: &[String],
        antipatterns: &[String],
        time_pressure: bool,
    ) -> FirewallResult {
        let flags = self.detector.detect(decision_statement, confidence, alternatives, antipatterns, time_pressure);
        let risk_score = self.detector.calculate_risk_score(&flags);

        let (decision, override_required) = if self.detector.should_block(&flags) {
            (FirewallDecision::Block, true)
        } else if self.detector.should_warn(&flags) {
            (FirewallDecision::Warn, false)
        } else {
            (FirewallDecision::Allow, false)
        };

        let message = generate_message(decision, &flags, risk_score);
        FirewallResult { decision, risk_score, flags, message, override_required }
    }
}

fn generate_message(decision: FirewallDecision, flags: &[RedFlag], risk_score: f64) -> String {
    let mut lines = Vec::new();
    lines.push(match decision {
        FirewallDecision::Allow => "Decision looks good".to_string(),
        FirewallDecision::Warn => "Warning: this decision has some risks".to_string(),
        FirewallDecision::Block => "BLOCKED: this decision is too risky".to_string(),
    });
    lines.push(format!("\nRisk score: {}%", (risk_score * 100.0) as i64));

    if !flags.is_empty() {
        lines.push("\nRed flags:".to_string());
        for flag in flags {
            lines.push(format!("  [{:?}] {}", flag.severity, flag.name));
            lines.push(format!("      {}", flag.evidence));
        }
        lines.push("\nWhat to do:".to_string());
        for (i, flag) in flags.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, flag.recommendation));
        }
    }

    match decision {
        FirewallDecision::Block => lines.push("\nTo proceed anyway, use: --force --reason 'explanation'".to_string()),
        FirewallDecision::Warn => lines.push("\nYou can proceed with: --force".to_string()),
        FirewallDecision::Allow => {}
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_without_alternatives_blocks() {
        let firewall = Firewall::new();
        let result = firewall.evaluate("use X", 0.3, &[], &[], false);
        assert_eq!(result.decision, FirewallDecision::Block);
        assert!(result.override_required);
    }

    #[test]
    fn overconfident_language_with_high_confidence_warns() {
        let firewall = Firewall::new();
        let alternatives = vec!["A".to_string(), "B".to_string()];
        let result = firewall.evaluate("this is definitely the best approach", 0.9, &alternatives, &[], false);
        assert_eq!(result.decision, FirewallDecision::Warn);
    }

    #[test]
    fn two_high_flags_block_even_without_critical() {
        let firewall = Firewall::new();
        let alternatives = vec!["A".to_string(), "B".to_string()];
        let antipatterns = vec!["God Object".to_string(), "Singleton Abuse".to_string()];
        let result = firewall.evaluate("use X", 0.7, &alternatives, &antipatterns, false);
        assert_eq!(result.decision, FirewallDecision::Block);
    }

    #[test]
    fn clean_decision_is_allowed() {
        let firewall = Firewall::new();
        let alternatives = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let result = firewall.evaluate("use X after comparing tradeoffs", 0.7, &alternatives, &[], false);
        assert_eq!(result.decision, FirewallDecision::Allow);
        assert_eq!(result.risk_score, 0.0);
    }

    #[test]
    fn risk_score_is_capped_at_one() {
        let detector = RedFlagDetector::new();
        let flags = vec![
            flag_antipattern("a"),
            flag_antipattern("b"),
            flag_antipattern("c"),
            flag_antipattern("d"),
            flag_antipattern("e"),
        ];
        assert_eq!(detector.calculate_risk_score(&flags), 1.0);
    }
}
