//! Data model shared by every component (spec §3): the node and edge types
//! that make up the property graph, namespace/lifecycle fields common to
//! all of them.

pub mod antipattern;
pub mod calibration;
pub mod decision;
pub mod docshot;
pub mod edge;
pub mod engram;
pub mod namespace;
pub mod negative_knowledge;
pub mod outcome;
pub mod schema_version;
pub mod session_context;
pub mod skill;

pub use antipattern::AntiPattern;
pub use calibration::{CalibrationProfile, Trend};
pub use decision::{Decision, DecisionStatus, PredictedOutcome, RiskLevel};
pub use docshot::{DocShot, Document};
pub use edge::{Edge, RelType};
pub use engram::{AgentInfo, Engram, FileAction, FileChange, TranscriptMessage};
pub use namespace::{Lifecycle, MemoryType, Namespace};
pub use negative_knowledge::{NegativeKnowledge, Severity};
pub use outcome::{FinalStatus, Outcome, OutcomeStatus, Signal, SignalType, Valence};
pub use schema_version::{MigrationStatus, SchemaVersion};
pub use session_context::SessionContext;
pub use skill::{Skill, Zone};
