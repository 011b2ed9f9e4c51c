//! Calibration engine: per-domain Beta-distribution updates and
//! confidence-guidance reporting.

mod engine;

pub use engine::{BatchUpdateResult, CalibrationEngine, ConfidenceGuidance};
