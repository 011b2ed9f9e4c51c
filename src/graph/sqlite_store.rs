//! SQLite-backed [`GraphStore`] (SPEC_FULL.md §A), grounded in the
//! teacher's `memory::store::SqliteMemoryStore`: a single guarded
//! `Connection`, a `with_conn` helper, and row<->type mapping functions per
//! entity.

use super::migrations::Migrator;
use super::record::{NodeRecord, NodeType, QuerySpec};
use super::{GraphStore, StoreCapabilities};
use crate::error::{Error, Result};
use crate::model::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Migrator::with_builtin_migrations().migrate_to(&conn, None)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("poisoned connection lock: {e}")))?;
        f(&conn)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<NodeRecord> {
        let node_type: String = row.get(1)?;
        let data: String = row.get(11)?;
        Ok(NodeRecord {
            id: row.get(0)?,
            node_type: node_type.parse().unwrap_or(NodeType::Document),
            tenant_id: row.get(2)?,
            team_id: row.get(3)?,
            project_id: row.get(4)?,
            is_active: row.get::<_, i64>(5)? != 0,
            ttl_days: row.get(6)?,
            last_verified_at: row
                .get::<_, String>(7)?
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            deprecated_reason: row.get(8)?,
            memory_type: row.get(9)?,
            memory_subject: row.get(10)?,
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
        })
    }

    const SELECT_COLUMNS: &'static str = "id, node_type, tenant_id, team_id, project_id, is_active, ttl_days, last_verified_at, deprecated_reason, memory_type, memory_subject, data";

    fn fetch_raw(&self, id: &str) -> Result<Option<NodeRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM nodes WHERE id = ?1", Self::SELECT_COLUMNS),
                    params![id],
                    Self::row_to_record,
                )
                .optional()?)
        })
    }

    fn fetch_all_of_type(&self, node_type: NodeType, tenant_id: &str, team_id: &str, project_id: &str) -> Result<Vec<NodeRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM nodes WHERE node_type = ?1 AND tenant_id = ?2 AND team_id = ?3 AND project_id = ?4",
                Self::SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![node_type.as_str(), tenant_id, team_id, project_id],
                Self::row_to_record,
            )?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    fn upsert_raw(&self, record: &NodeRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nodes (id, node_type, tenant_id, team_id, project_id, is_active, ttl_days, last_verified_at, deprecated_reason, memory_type, memory_subject, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    is_active = excluded.is_active,
                    ttl_days = excluded.ttl_days,
                    last_verified_at = excluded.last_verified_at,
                    deprecated_reason = excluded.deprecated_reason,
                    memory_type = excluded.memory_type,
                    memory_subject = excluded.memory_subject,
                    data = excluded.data",
                params![
                    record.id,
                    record.node_type.as_str(),
                    record.tenant_id,
                    record.team_id,
                    record.project_id,
                    record.is_active as i64,
                    record.ttl_days,
                    record.last_verified_at.to_rfc3339(),
                    record.deprecated_reason,
                    record.memory_type,
                    record.memory_subject,
                    serde_json::to_string(&record.data)?,
                ],
            )?;
            Ok(())
        })
    }
}

fn record_for<T: serde::Serialize>(
    id: &str,
    node_type: NodeType,
    namespace: &Namespace,
    lifecycle: &Lifecycle,
    value: &T,
) -> Result<NodeRecord> {
    Ok(NodeRecord {
        id: id.to_string(),
        node_type,
        tenant_id: namespace.tenant_id.clone(),
        team_id: namespace.team_id.clone(),
        project_id: namespace.project_id.clone(),
        is_active: lifecycle.is_active,
        ttl_days: lifecycle.ttl_days,
        last_verified_at: lifecycle.last_verified_at,
        deprecated_reason: lifecycle.deprecated_reason.clone(),
        memory_type: lifecycle.memory_type.map(|t| format!("{t:?}").to_lowercase()),
        memory_subject: lifecycle.memory_subject.clone(),
        data: serde_json::to_value(value)?,
    })
}

/// Namespace/lifecycle defaults for node types that don't embed their own
/// (spec §3 names explicit lifecycle fields only for Decision/NegativeKnowledge;
/// every other node type is namespace-scoped by the store alone).
fn default_lifecycle(now: DateTime<Utc>) -> Lifecycle {
    Lifecycle::new(now, None)
}

impl GraphStore for SqliteGraphStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities { structured_data_filter: false }
    }

    fn add_decision(&self, decision: &Decision) -> Result<()> {
        let record = record_for(&decision.id, NodeType::Decision, &decision.namespace, &decision.lifecycle, decision)?;
        self.upsert_raw(&record)
    }

    fn get_decision(&self, id: &str) -> Result<Option<Decision>> {
        match self.fetch_raw(id)? {
            Some(r) if r.node_type == NodeType::Decision => Ok(Some(serde_json::from_value(r.data)?)),
            _ => Ok(None),
        }
    }

    fn update_decision_memory(&self, decision: &Decision) -> Result<()> {
        self.add_decision(decision)
    }

    fn list_decisions_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<Decision>> {
        let rows = self.fetch_all_of_type(NodeType::Decision, tenant_id, team_id, project_id)?;
        let mut out = Vec::new();
        for row in rows {
            let decision: Decision = serde_json::from_value(row.data)?;
            if decision.module == domain {
                out.push(decision);
            }
        }
        Ok(out)
    }

    fn add_outcome(&self, outcome: &Outcome) -> Result<()> {
        let ns = Namespace::new("", "", "");
        let lifecycle = default_lifecycle(outcome.created_at);
        let record = record_for(&outcome.id, NodeType::Outcome, &ns, &lifecycle, outcome)?;
        self.upsert_raw(&record)
    }

    fn get_outcome(&self, id: &str) -> Result<Option<Outcome>> {
        match self.fetch_raw(id)? {
            Some(r) if r.node_type == NodeType::Outcome => Ok(Some(serde_json::from_value(r.data)?)),
            _ => Ok(None),
        }
    }

    fn get_outcome_by_decision(&self, decision_id: &str) -> Result<Option<Outcome>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM nodes WHERE node_type = ?1",
                Self::SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![NodeType::Outcome.as_str()], Self::row_to_record)?;
            for row in rows {
                let row = row?;
                let outcome: Outcome = serde_json::from_value(row.data)?;
                if outcome.decision_id == decision_id {
                    return Ok(Some(outcome));
                }
            }
            Ok(None)
        })
    }

    fn update_outcome(&self, outcome: &Outcome) -> Result<()> {
        self.add_outcome(outcome)
    }

    fn add_negative_knowledge(&self, item: &NegativeKnowledge) -> Result<()> {
        let record = record_for(&item.id, NodeType::NegativeKnowledge, &item.namespace, &item.lifecycle, item)?;
        self.upsert_raw(&record)
    }

    fn list_negative_knowledge_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str, limit: u32) -> Result<Vec<NegativeKnowledge>> {
        let rows = self.fetch_all_of_type(NodeType::NegativeKnowledge, tenant_id, team_id, project_id)?;
        let mut out = Vec::new();
        for row in rows {
            let item: NegativeKnowledge = serde_json::from_value(row.data)?;
            if item.domain == domain && item.lifecycle.is_active {
                out.push(item);
            }
        }
        out.sort_by(|a, b| b.severity.cmp(&a.severity));
        out.truncate(limit as usize);
        Ok(out)
    }

    fn update_negative_knowledge(&self, item: &NegativeKnowledge) -> Result<()> {
        self.add_negative_knowledge(item)
    }

    fn add_antipattern(&self, tenant_id: &str, team_id: &str, project_id: &str, item: &AntiPattern) -> Result<()> {
        let ns = Namespace::new(tenant_id, team_id, project_id);
        let lifecycle = default_lifecycle(Utc::now());
        let record = record_for(&item.id, NodeType::AntiPattern, &ns, &lifecycle, item)?;
        self.upsert_raw(&record)
    }

    fn list_antipatterns_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<AntiPattern>> {
        let rows = self.fetch_all_of_type(NodeType::AntiPattern, tenant_id, team_id, project_id)?;
        let mut out = Vec::new();
        for row in rows {
            let item: AntiPattern = serde_json::from_value(row.data)?;
            if item.domain == domain {
                out.push(item);
            }
        }
        Ok(out)
    }

    fn get_calibration_profile(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Option<CalibrationProfile>> {
        let id = calibration_id(tenant_id, team_id, project_id, domain);
        match self.fetch_raw(&id)? {
            Some(r) if r.node_type == NodeType::CalibrationProfile => Ok(Some(serde_json::from_value(r.data)?)),
            _ => Ok(None),
        }
    }

    fn upsert_calibration_profile(&self, tenant_id: &str, team_id: &str, project_id: &str, profile: &CalibrationProfile) -> Result<()> {
        let id = calibration_id(tenant_id, team_id, project_id, &profile.domain);
        let ns = Namespace::new(tenant_id, team_id, project_id);
        let lifecycle = default_lifecycle(profile.last_updated);
        let record = record_for(&id, NodeType::CalibrationProfile, &ns, &lifecycle, profile)?;
        self.upsert_raw(&record)
    }

    fn add_skill(&self, tenant_id: &str, team_id: &str, project_id: &str, skill: &Skill) -> Result<()> {
        let ns = Namespace::new(tenant_id, team_id, project_id);
        let lifecycle = default_lifecycle(Utc::now());
        let record = record_for(&skill.id, NodeType::Skill, &ns, &lifecycle, skill)?;
        self.upsert_raw(&record)
    }

    fn get_latest_skill_version(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Option<Skill>> {
        let skills = self.list_skills_by_domain(tenant_id, team_id, project_id, domain)?;
        Ok(skills.into_iter().max_by_key(|s| s.version))
    }

    fn list_skills_by_domain(&self, tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> Result<Vec<Skill>> {
        let rows = self.fetch_all_of_type(NodeType::Skill, tenant_id, team_id, project_id)?;
        let mut out = Vec::new();
        for row in rows {
            let skill: Skill = serde_json::from_value(row.data)?;
            if skill.domain == domain {
                out.push(skill);
            }
        }
        Ok(out)
    }

    fn add_engram(&self, engram: &Engram) -> Result<()> {
        let ns = Namespace::new("", "", "");
        let lifecycle = default_lifecycle(engram.timestamp);
        let record = record_for(&engram.id, NodeType::Engram, &ns, &lifecycle, engram)?;
        self.upsert_raw(&record)
    }

    fn get_engram(&self, id: &str) -> Result<Option<Engram>> {
        match self.fetch_raw(id)? {
            Some(r) if r.node_type == NodeType::Engram => Ok(Some(serde_json::from_value(r.data)?)),
            _ => Ok(None),
        }
    }

    fn set_session_context(&self, tenant_id: &str, team_id: &str, project_id: &str, context: &SessionContext) -> Result<()> {
        let ns = Namespace::new(tenant_id, team_id, project_id);
        let lifecycle = default_lifecycle(context.created_at);
        let record = record_for(&context.session_id, NodeType::SessionContext, &ns, &lifecycle, context)?;
        self.upsert_raw(&record)
    }

    fn get_session_context(&self, session_id: &str) -> Result<Option<SessionContext>> {
        match self.fetch_raw(session_id)? {
            Some(r) if r.node_type == NodeType::SessionContext => Ok(Some(serde_json::from_value(r.data)?)),
            _ => Ok(None),
        }
    }

    fn get_latest_active_session_context(&self, tenant_id: &str, team_id: &str, project_id: &str) -> Result<Option<SessionContext>> {
        let rows = self.fetch_all_of_type(NodeType::SessionContext, tenant_id, team_id, project_id)?;
        let mut contexts = Vec::new();
        for row in rows {
            let context: SessionContext = serde_json::from_value(row.data)?;
            if context.is_active {
                contexts.push(context);
            }
        }
        Ok(contexts.into_iter().max_by_key(|c| c.created_at))
    }

    fn add_document(&self, document: &Document) -> Result<()> {
        let ns = Namespace::new("", "", "");
        let lifecycle = default_lifecycle(document.created_at);
        let record = record_for(&document.id, NodeType::Document, &ns, &lifecycle, document)?;
        self.upsert_raw(&record)
    }

    fn add_docshot(&self, docshot: &DocShot) -> Result<()> {
        let ns = Namespace::new("", "", "");
        let lifecycle = default_lifecycle(docshot.created_at);
        let record = record_for(&docshot.id, NodeType::DocShot, &ns, &lifecycle, docshot)?;
        self.upsert_raw(&record)
    }

    fn get_docshot(&self, id: &str) -> Result<Option<(DocShot, Vec<Document>)>> {
        let docshot: DocShot = match self.fetch_raw(id)? {
            Some(r) if r.node_type == NodeType::DocShot => serde_json::from_value(r.data)?,
            _ => return Ok(None),
        };
        let mut documents = Vec::new();
        for doc_id in &docshot.document_ids {
            if let Some(r) = self.fetch_raw(doc_id)? {
                if r.node_type == NodeType::Document {
                    documents.push(serde_json::from_value(r.data)?);
                }
            }
        }
        Ok(Some((docshot, documents)))
    }

    fn add_edge(&self, edge: &Edge) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO edges (id, src_id, dst_id, rel_type, data) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.id,
                    edge.src_id,
                    edge.dst_id,
                    format!("{:?}", edge.rel_type),
                    edge.data.as_ref().map(|d| d.to_string()),
                ],
            )?;
            Ok(())
        })
    }

    fn edges_from(&self, src_id: &str, rel_type: Option<RelType>) -> Result<Vec<Edge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, src_id, dst_id, rel_type, data FROM edges WHERE src_id = ?1")?;
            let rows = stmt.query_map(params![src_id], |row| {
                let rel_str: String = row.get(3)?;
                let data: Option<String> = row.get(4)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    rel_str,
                    data,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (id, src, dst, rel_str, data) = row?;
                let parsed = parse_rel_type(&rel_str);
                if let Some(filter) = rel_type {
                    if parsed != Some(filter) {
                        continue;
                    }
                }
                if let Some(parsed) = parsed {
                    out.push(Edge {
                        id,
                        src_id: src,
                        dst_id: dst,
                        rel_type: parsed,
                        data: data.and_then(|d| serde_json::from_str(&d).ok()),
                    });
                }
            }
            Ok(out)
        })
    }

    fn record_schema_version(&self, version: &SchemaVersion) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO schema_versions (version, executed_at, duration_ms, status, description, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    version.version,
                    version.executed_at.to_rfc3339(),
                    version.duration_ms as i64,
                    matches!(version.status, MigrationStatus::Success).then_some("success").unwrap_or("failed"),
                    version.description,
                    version.error,
                ],
            )?;
            Ok(())
        })
    }

    fn latest_schema_version(&self) -> Result<Option<String>> {
        self.with_conn(|conn| Migrator::with_builtin_migrations().current_version(conn))
    }

    fn list_schema_versions(&self) -> Result<Vec<SchemaVersion>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT version, executed_at, duration_ms, status, description, error FROM schema_versions ORDER BY version",
            )?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(3)?;
                Ok(SchemaVersion {
                    version: row.get(0)?,
                    executed_at: row.get::<_, String>(1)?.parse().unwrap_or_else(|_| Utc::now()),
                    duration_ms: row.get::<_, i64>(2)? as u64,
                    status: if status == "success" { MigrationStatus::Success } else { MigrationStatus::Failed },
                    description: row.get(4)?,
                    error: row.get(5)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    fn query_nodes(&self, spec: &QuerySpec) -> Result<Vec<NodeRecord>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM nodes WHERE 1=1", Self::SELECT_COLUMNS);
            let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(node_type) = spec.node_type {
                sql.push_str(" AND node_type = ?");
                bind.push(Box::new(node_type.as_str().to_string()));
            }
            if let Some(ns) = &spec.namespace {
                sql.push_str(" AND tenant_id = ? AND team_id = ? AND project_id = ?");
                bind.push(Box::new(ns.tenant_id.clone()));
                bind.push(Box::new(ns.team_id.clone()));
                bind.push(Box::new(ns.project_id.clone()));
            }
            if spec.active_only {
                sql.push_str(" AND is_active = 1");
            }
            if let Some(limit) = spec.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_record)?;
            let mut out = Vec::new();
            for row in rows {
                let record = row?;
                if spec
                    .data_equals
                    .iter()
                    .all(|(field, value)| record.data.get(field) == Some(value))
                {
                    out.push(record);
                }
            }
            Ok(out)
        })
    }
}

fn calibration_id(tenant_id: &str, team_id: &str, project_id: &str, domain: &str) -> String {
    format!("cal-{tenant_id}-{team_id}-{project_id}-{domain}")
}

fn parse_rel_type(s: &str) -> Option<RelType> {
    use RelType::*;
    Some(match s {
        "MadeIn" => MadeIn,
        "ImplementedIn" => ImplementedIn,
        "TriggeredBy" => TriggeredBy,
        "ResultedIn" => ResultedIn,
        "Triggered" => Triggered,
        "Caused" => Caused,
        "Prevented" => Prevented,
        "SimilarTo" => SimilarTo,
        "UsesDocshot" => UsesDocshot,
        "Includes" => Includes,
        "GeneratedFrom" => GeneratedFrom,
        "BasedOn" => BasedOn,
        "WarnsAgainst" => WarnsAgainst,
        "VersionOf" => VersionOf,
        "ReworkedBy" => ReworkedBy,
        "HasContext" => HasContext,
        "MeasuredBy" => MeasuredBy,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("t", "team", "proj")
    }

    #[test]
    fn round_trips_a_decision_through_sqlite() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let decision = Decision::new("d1", ns(), "use X", vec!["X".into(), "Y".into()], 0.8, "backend", Utc::now()).unwrap();
        store.add_decision(&decision).unwrap();
        let fetched = store.get_decision("d1").unwrap().unwrap();
        assert_eq!(fetched.statement, "use X");
        assert_eq!(fetched.module, "backend");
    }

    #[test]
    fn list_decisions_by_domain_filters_other_modules_out() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = Decision::new("d1", ns(), "x", vec![], 0.5, "backend", Utc::now()).unwrap();
        let b = Decision::new("d2", ns(), "y", vec![], 0.5, "frontend", Utc::now()).unwrap();
        store.add_decision(&a).unwrap();
        store.add_decision(&b).unwrap();
        let backend = store.list_decisions_by_domain("t", "team", "proj", "backend").unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend[0].id, "d1");
    }

    #[test]
    fn calibration_profile_round_trips_by_domain_key() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let mut profile = CalibrationProfile::seeded("backend", Utc::now());
        profile.record_success(Utc::now());
        store.upsert_calibration_profile("t", "team", "proj", &profile).unwrap();
        let fetched = store.get_calibration_profile("t", "team", "proj", "backend").unwrap().unwrap();
        assert_eq!(fetched.alpha, 2.0);
    }

    #[test]
    fn edges_from_filters_by_rel_type() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.add_edge(&Edge::new("e1", "d1", "eng1", RelType::MadeIn)).unwrap();
        store.add_edge(&Edge::new("e2", "d1", "cp1", RelType::MeasuredBy)).unwrap();
        let made_in = store.edges_from("d1", Some(RelType::MadeIn)).unwrap();
        assert_eq!(made_in.len(), 1);
        assert_eq!(made_in[0].dst_id, "eng1");
    }
}
