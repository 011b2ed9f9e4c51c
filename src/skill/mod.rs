//! Skill generator.

mod generator;

pub use generator::{DomainReadiness, SkillGenerator};
