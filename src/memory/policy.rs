//! The memory-lifecycle policy: TTL, freshness decay, and the composite
//! retrieval score. Follows the `epistemic::memory_gate::MemoryGateConfig`
//! pattern from the corpus: a small config struct with named constructors,
//! consumed by a component that applies it uniformly rather than
//! re-deriving thresholds at each call site.

use crate::model::MemoryType;

#[derive(Debug, Clone, Copy)]
pub struct MemoryPolicy {
    pub default_ttl_days: i64,
    pub half_life_days: f64,
    pub allow_hard_delete: bool,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            default_ttl_days: 365,
            half_life_days: 180.0,
            allow_hard_delete: false,
        }
    }
}

impl MemoryPolicy {
    pub fn from_config(cfg: &crate::config::MemoryConfig) -> Self {
        Self {
            default_ttl_days: cfg.default_ttl_days,
            half_life_days: cfg.half_life_days as f64,
            allow_hard_delete: cfg.allow_hard_delete,
        }
    }

    /// TTL by memory type: episodic=180d, semantic=365d,
    /// procedural=720d, default when absent = `default_ttl_days`.
    pub fn ttl_days_for(&self, memory_type: Option<MemoryType>) -> i64 {
        match memory_type {
            Some(MemoryType::Episodic) => 180,
            Some(MemoryType::Semantic) => 365,
            Some(MemoryType::Procedural) => 720,
            None => self.default_ttl_days,
        }
    }

    /// `exp(-age_days / half_life_days)`, clamped to 0 once `age_days >= ttl_days`.
    pub fn freshness(&self, age_days: f64, ttl_days: i64) -> f64 {
        if age_days >= ttl_days as f64 {
            return 0.0;
        }
        (-age_days / self.half_life_days).exp()
    }

    pub fn should_forget(&self, age_days: f64, ttl_days: i64) -> bool {
        age_days >= ttl_days as f64
    }

    /// `relevance * confidence * freshness * (0.5 + 0.5*impact)`, each
    /// factor clamped to [0,1] first.
    pub fn retrieval_score(&self, relevance: f64, confidence: f64, freshness: f64, impact: f64) -> f64 {
        let clamp = |v: f64| v.clamp(0.0, 1.0);
        clamp(relevance) * clamp(confidence) * clamp(freshness) * (0.5 + 0.5 * clamp(impact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_by_memory_type_matches_spec_table() {
        let policy = MemoryPolicy::default();
        assert_eq!(policy.ttl_days_for(Some(MemoryType::Episodic)), 180);
        assert_eq!(policy.ttl_days_for(Some(MemoryType::Semantic)), 365);
        assert_eq!(policy.ttl_days_for(Some(MemoryType::Procedural)), 720);
        assert_eq!(policy.ttl_days_for(None), 365);
    }

    #[test]
    fn freshness_clamps_to_zero_past_ttl() {
        let policy = MemoryPolicy::default();
        assert_eq!(policy.freshness(400.0, 365), 0.0);
        assert!(policy.freshness(0.0, 365) > 0.99);
    }

    #[test]
    fn retrieval_score_clamps_out_of_range_factors() {
        let policy = MemoryPolicy::default();
        let score = policy.retrieval_score(1.5, 1.0, 1.0, 1.0);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn should_forget_true_once_age_reaches_ttl() {
        let policy = MemoryPolicy::default();
        assert!(policy.should_forget(365.0, 365));
        assert!(!policy.should_forget(364.9, 365));
    }
}
