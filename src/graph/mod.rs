//! Graph store & schema.
//!
//! A single [`GraphStore`] trait fronts the persisted graph; the context
//! composer and every other component depend on the trait, never on the
//! concrete backend. The shipped backend is `SqliteGraphStore`
//! (SPEC_FULL.md §A): spec §6 treats the persisted-state layout as logical,
//! so an embedded relational store stands in for the graph database named
//! in the original design.

pub mod migrations;
pub mod record;
pub mod sqlite_store;

use crate::error::Result;
use crate::model::{
    AntiPattern, CalibrationProfile, Decision, DocShot, Document, Edge, Engram, NegativeKnowledge,
    Outcome, RelType, SchemaVersion, SessionContext, Signal, Skill,
};
use record::{NodeRecord, QuerySpec};

pub use record::NodeType;
pub use sqlite_store::SqliteGraphStore;

/// Capabilities a `GraphStore` implementation may or may not provide,
/// checked once at construction time (REDESIGN FLAGS) rather than probed
/// per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCapabilities {
    /// Whether `query_nodes` can filter on `data` JSON fields server-side
    /// (true for the SQLite backend; a remote graph database might not).
    pub structured_data_filter: bool,
}

/// The typed CRUD surface over the property graph.
pub trait GraphStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    // -- Decision --
    fn add_decision(&self, decision: &Decision) -> Result<()>;
    fn get_decision(&self, id: &str) -> Result<Option<Decision>>;
    /// Persist an in-place update (confidence adjustment, status advance,
    /// lifecycle stamp) to an existing Decision.
    fn update_decision_memory(&self, decision: &Decision) -> Result<()>;
    fn list_decisions_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<Decision>>;

    // -- Outcome --
    fn add_outcome(&self, outcome: &Outcome) -> Result<()>;
    fn get_outcome(&self, id: &str) -> Result<Option<Outcome>>;
    fn get_outcome_by_decision(&self, decision_id: &str) -> Result<Option<Outcome>>;
    fn update_outcome(&self, outcome: &Outcome) -> Result<()>;
    /// Convenience used by the state machine: persist the outcome after an
    /// in-memory transition and append any newly-added signals. Since
    /// signals are append-only and stored alongside the outcome, this is a
    /// full replace of the outcome row.
    fn add_signal(&self, outcome: &Outcome, _signal: &Signal) -> Result<()> {
        self.update_outcome(outcome)
    }

    // -- NegativeKnowledge --
    fn add_negative_knowledge(&self, item: &NegativeKnowledge) -> Result<()>;
    fn list_negative_knowledge_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str, limit: u32) -> Result<Vec<NegativeKnowledge>>;
    fn update_negative_knowledge(&self, item: &NegativeKnowledge) -> Result<()>;

    // -- AntiPattern --
    fn add_antipattern(&self, tenant_id: &str, team_id: &str, project_id: &str, item: &AntiPattern) -> Result<()>;
    fn list_antipatterns_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<AntiPattern>>;

    // -- CalibrationProfile --
    fn get_calibration_profile(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Option<CalibrationProfile>>;
    fn upsert_calibration_profile(&self, tenant_id: &str, team_id: &str, project_id: &str, profile: &CalibrationProfile) -> Result<()>;

    // -- Skill --
    fn add_skill(&self, tenant_id: &str, team_id: &str, project_id: &str, skill: &Skill) -> Result<()>;
    fn get_latest_skill_version(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Option<Skill>>;
    fn list_skills_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<Skill>>;

    // -- Engram --
    fn add_engram(&self, engram: &Engram) -> Result<()>;
    fn get_engram(&self, id: &str) -> Result<Option<Engram>>;

    // -- SessionContext --
    fn set_session_context(&self, tenant_id: &str, team_id: &str, project_id: &str, context: &SessionContext) -> Result<()>;
    fn get_session_context(&self, session_id: &str) -> Result<Option<SessionContext>>;
    fn get_latest_active_session_context(&self, tenant_id: &str, team_id: &str, project_id: &str) -> Result<Option<SessionContext>>;

    // -- DocShot / Document --
    fn add_document(&self, document: &Document) -> Result<()>;
    fn add_docshot(&self, docshot: &DocShot) -> Result<()>;
    fn get_docshot(&self, id: &str) -> Result<Option<(DocShot, Vec<Document>)>>;

    // -- Edges --
    fn add_edge(&self, edge: &Edge) -> Result<()>;
    fn edges_from(&self, src_id: &str, rel_type: Option<RelType>) -> Result<Vec<Edge>>;

    // -- SchemaVersion --
    fn record_schema_version(&self, version: &SchemaVersion) -> Result<()>;
    fn latest_schema_version(&self) -> Result<Option<String>>;
    fn list_schema_versions(&self) -> Result<Vec<SchemaVersion>>;

    // -- Generic escape hatch --
    fn query_nodes(&self, spec: &QuerySpec) -> Result<Vec<NodeRecord>>;
}
