//! Behavior-chain composer, grounded in
//! `examples/original_source/src/membria/behavior_chains.py` and
//! `chain_builder.py`: four evidence chains run debiasing-first, aggregated
//! under a token budget.

mod orchestrator;

pub use orchestrator::{ChainOrchestrator, ChainOutput, ChainResult};
