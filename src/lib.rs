//! # membria
//!
//! A developer decision-memory engine: it records the decisions an
//! engineering team makes, tracks what happened after, and feeds that
//! history back as calibrated context before the next decision is made.
//!
//! ## Core components
//!
//! - **Graph store**: the persisted property graph (decisions, outcomes,
//!   negative knowledge, antipatterns, skills, calibration profiles).
//! - **Memory manager**: TTL, freshness decay, and composite retrieval
//!   scoring over the graph.
//! - **Outcome tracker**: the pending -> submitted -> merged -> completed
//!   state machine (or failed/abandoned), serialized per outcome id.
//! - **Calibration engine**: Beta-distribution confidence calibration per
//!   domain.
//! - **Pattern extractor** and **skill generator**: turn repeated decisions
//!   into versioned, zoned procedures.
//! - **Behavior-chain composer** and **context composer**: assemble the
//!   evidence a caller sees before making a decision, under a token budget.
//! - **Firewall**: pre-decision red-flag detection and block/warn verdicts.
//! - **Knowledge-base ingester**: sanitizes, chunks, and embeds reference
//!   documents for retrieval via DocShots.
//! - **Signal queue**, **JSON-RPC tool server**, and **webhook ingestion**:
//!   the external interfaces the daemon exposes.

pub mod calibration;
pub mod chains;
pub mod composer;
pub mod config;
pub mod error;
pub mod firewall;
pub mod graph;
pub mod kb;
pub mod memory;
pub mod model;
pub mod outcome;
pub mod pattern;
pub mod retry;
pub mod rpc;
pub mod signal_queue;
pub mod skill;
pub mod webhook;

pub use calibration::{BatchUpdateResult, CalibrationEngine, ConfidenceGuidance};
pub use chains::{ChainOrchestrator, ChainOutput, ChainResult};
pub use composer::{ContextComposer, DecisionContextResult, DecisionSurface, DocShotRef, SectionSummary, SessionContextRef, SimilarDecision, TeamCalibration};
pub use config::Config;
pub use error::{Error, Result};
pub use firewall::{Firewall, FirewallDecision, FirewallResult, RedFlag, RedFlagDetector, RedFlagSeverity};
pub use graph::{GraphStore, NodeType, SqliteGraphStore, StoreCapabilities};
pub use kb::{chunk_text, sanitize_text, EmbeddingProvider, HttpEmbeddingProvider, IngestReport, KnowledgeBaseIngester};
pub use memory::{MemoryManager, MemoryPolicy, Scored};
pub use outcome::OutcomeTracker;
pub use pattern::{DomainStats, Pattern, PatternConflict, PatternExtractor};
pub use retry::{with_retry, RetryPolicy};
pub use rpc::{ExternalServer, ExternalToolRegistry, ToolContext, ToolServer};
pub use signal_queue::{QueuedSignal, SignalQueue, SignalStatus};
pub use skill::{DomainReadiness, SkillGenerator};
pub use webhook::WebhookServer;
