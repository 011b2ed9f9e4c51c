//! `Skill` — procedural knowledge generated from patterns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Green,
    Yellow,
    Red,
}

impl Zone {
    /// Zoning rule from spec §3: green >= 0.75, yellow in [0.5, 0.75), red < 0.5.
    pub fn classify(success_rate: f64) -> Zone {
        if success_rate >= 0.75 {
            Zone::Green
        } else if success_rate >= 0.5 {
            Zone::Yellow
        } else {
            Zone::Red
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Form `sk-<domain>-v<N>`.
    pub id: String,
    pub domain: String,
    pub version: u32,
    pub success_rate: f64,
    pub confidence: f64,
    pub sample_size: u64,
    pub quality_score: f64,
    pub procedure: String,
    pub green_zone: Vec<String>,
    pub yellow_zone: Vec<String>,
    pub red_zone: Vec<String>,
    pub generated_from_decisions: Vec<String>,
    pub conflicts_with: Vec<String>,
    pub is_active: bool,
}

impl Skill {
    pub fn skill_id(domain: &str, version: u32) -> String {
        format!("sk-{domain}-v{version}")
    }

    /// `success_rate * (1 - 1/sqrt(sample_size))`, clamped to [0,1].
    pub fn quality_score(success_rate: f64, sample_size: u64) -> f64 {
        if sample_size == 0 {
            return 0.0;
        }
        let raw = success_rate * (1.0 - 1.0 / (sample_size as f64).sqrt());
        raw.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_boundaries_match_spec() {
        assert_eq!(Zone::classify(0.75), Zone::Green);
        assert_eq!(Zone::classify(0.5), Zone::Yellow);
        assert_eq!(Zone::classify(0.49), Zone::Red);
    }

    #[test]
    fn quality_score_penalizes_small_samples() {
        let small = Skill::quality_score(0.9, 3);
        let large = Skill::quality_score(0.9, 100);
        assert!(small < large);
        assert!(small >= 0.0 && large <= 1.0);
    }
}
