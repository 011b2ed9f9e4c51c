//! `CalibrationProfile` — per-domain Beta distribution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub domain: String,
    pub alpha: f64,
    pub beta: f64,
    pub last_updated: DateTime<Utc>,
}

impl CalibrationProfile {
    /// Seeded at (1, 1): a uniform prior, per spec §3.
    pub fn seeded(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            alpha: 1.0,
            beta: 1.0,
            last_updated: now,
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.alpha += 1.0;
        self.last_updated = now;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.beta += 1.0;
        self.last_updated = now;
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Number of observations since the uniform prior.
    pub fn sample_size(&self) -> f64 {
        self.alpha + self.beta - 2.0
    }

    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0))
    }

    /// 95% credible interval via normal approximation; only meaningful once
    /// `sample_size >= 3`.
    pub fn credible_interval_95(&self) -> Option<(f64, f64)> {
        if self.sample_size() < 3.0 {
            return None;
        }
        let mean = self.mean();
        let sd = self.variance().sqrt();
        let half_width = 1.96 * sd;
        Some(((mean - half_width).max(0.0), (mean + half_width).min(1.0)))
    }

    pub fn trend(&self) -> Trend {
        let mean = self.mean();
        if mean >= 0.75 {
            Trend::Improving
        } else if mean >= 0.5 {
            Trend::Stable
        } else {
            Trend::Declining
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_prior_has_mean_one_half() {
        let c = CalibrationProfile::seeded("backend", Utc::now());
        assert_eq!(c.mean(), 0.5);
        assert_eq!(c.sample_size(), 0.0);
    }

    #[test]
    fn credible_interval_requires_minimum_sample_size() {
        let mut c = CalibrationProfile::seeded("backend", Utc::now());
        c.record_success(Utc::now());
        assert!(c.credible_interval_95().is_none());
        c.record_success(Utc::now());
        c.record_success(Utc::now());
        assert!(c.credible_interval_95().is_some());
    }

    #[test]
    fn trend_thresholds_match_spec() {
        let mut c = CalibrationProfile::seeded("x", Utc::now());
        for _ in 0..10 {
            c.record_success(Utc::now());
        }
        assert_eq!(c.trend(), Trend::Improving);
    }
}
