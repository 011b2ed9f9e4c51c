//! Schema migrations, following the `Migration` ABC found in
//! `examples/original_source/src/membria/migrations/base.py` but reworked
//! as a trait: the `Migrator` depends on `&dyn Migration` only, never on a
//! concrete migration type.

mod v1_initial;

use crate::error::{Error, Result};
use crate::model::{MigrationStatus, SchemaVersion};
use chrono::Utc;
use rusqlite::Connection;
use std::time::Instant;

pub use v1_initial::V1Initial;

/// One schema change, identified by a SemVer string. Implementations must
/// be idempotent: re-running `migrate` on an already-migrated database
/// must not fail.
pub trait Migration: Send + Sync {
    fn version(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Versions that must already be applied before this one runs.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }
    fn migrate(&self, conn: &Connection) -> Result<()>;
    fn rollback(&self, conn: &Connection) -> Result<()>;
    /// Post-condition check, run by `validate_migrations`. Default is a
    /// no-op for migrations with nothing meaningful to assert beyond
    /// "it ran".
    fn validate(&self, _conn: &Connection) -> Result<()> {
        Ok(())
    }
}

/// Parses `"1.2.3"` into a comparable tuple. Malformed strings sort before
/// everything else, which only matters for operator-authored migrations
/// that got a version string wrong — a validation error surfaces that
/// long before ordering would silently misbehave.
fn parse_semver(s: &str) -> (u64, u64, u64) {
    let mut parts = s.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    /// The registry of migrations shipped with this build, in dependency
    /// order.
    pub fn with_builtin_migrations() -> Self {
        let mut m = Self::new();
        m.register(Box::new(V1Initial));
        m
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.migrations.push(migration);
    }

    fn ensure_version_table(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_versions (
                version TEXT PRIMARY KEY,
                executed_at TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL,
                error TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn applied_versions(conn: &Connection) -> Result<Vec<String>> {
        Self::ensure_version_table(conn)?;
        let mut stmt = conn.prepare(
            "SELECT version FROM schema_versions WHERE status = 'success' ORDER BY version",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn current_version(&self, conn: &Connection) -> Result<Option<String>> {
        let applied = Self::applied_versions(conn)?;
        Ok(applied.into_iter().max_by_key(|v| parse_semver(v)))
    }

    /// Migrations not yet applied, sorted ascending by version and bounded
    /// to `target` if supplied.
    fn pending(&self, conn: &Connection, target: Option<&str>) -> Result<Vec<&dyn Migration>> {
        let applied = Self::applied_versions(conn)?;
        let target_key = target.map(parse_semver);
        let mut pending: Vec<&dyn Migration> = self
            .migrations
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !applied.iter().any(|v| v == m.version()))
            .filter(|m| target_key.map(|t| parse_semver(m.version()) <= t).unwrap_or(true))
            .collect();
        pending.sort_by_key(|m| parse_semver(m.version()));
        Ok(pending)
    }

    /// Runs pending migrations up to `target` (or to the latest registered
    /// version). Each application is recorded as a `SchemaVersion`; a
    /// failure aborts the remainder.
    pub fn migrate_to(&self, conn: &Connection, target: Option<&str>) -> Result<Vec<SchemaVersion>> {
        Self::ensure_version_table(conn)?;
        let pending = self.pending(conn, target)?;
        let mut applied = Vec::new();
        for migration in pending {
            for dep in migration.dependencies() {
                let applied_now = Self::applied_versions(conn)?;
                if !applied_now.iter().any(|v| v == dep) {
                    return Err(Error::Migration(format!(
                        "migration {} depends on unapplied version {}",
                        migration.version(),
                        dep
                    )));
                }
            }
            let start = Instant::now();
            let result = migration.migrate(conn);
            let duration_ms = start.elapsed().as_millis() as u64;
            let record = match &result {
                Ok(()) => SchemaVersion {
                    version: migration.version().to_string(),
                    executed_at: Utc::now(),
                    duration_ms,
                    status: MigrationStatus::Success,
                    description: migration.description().to_string(),
                    error: None,
                },
                Err(e) => SchemaVersion {
                    version: migration.version().to_string(),
                    executed_at: Utc::now(),
                    duration_ms,
                    status: MigrationStatus::Failed,
                    description: migration.description().to_string(),
                    error: Some(e.to_string()),
                },
            };
            conn.execute(
                "INSERT OR REPLACE INTO schema_versions (version, executed_at, duration_ms, status, description, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.version,
                    record.executed_at.to_rfc3339(),
                    record.duration_ms as i64,
                    matches!(record.status, MigrationStatus::Success).then_some("success").unwrap_or("failed"),
                    record.description,
                    record.error,
                ],
            )?;
            let failed = result.is_err();
            applied.push(record);
            if failed {
                return Err(Error::Migration(format!(
                    "migration {} failed, aborting remaining migrations",
                    migration.version()
                )));
            }
        }
        Ok(applied)
    }

    /// Rolls back every applied migration with version > `target`, in
    /// reverse order. Callers are expected to have already obtained
    /// confirmation from the operator (spec §4.A).
    pub fn rollback_to(&self, conn: &Connection, target: &str) -> Result<()> {
        let target_key = parse_semver(target);
        let applied = Self::applied_versions(conn)?;
        let mut to_rollback: Vec<&dyn Migration> = self
            .migrations
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| applied.iter().any(|v| v == m.version()))
            .filter(|m| parse_semver(m.version()) > target_key)
            .collect();
        to_rollback.sort_by_key(|m| std::cmp::Reverse(parse_semver(m.version())));
        for migration in to_rollback {
            migration.rollback(conn)?;
            conn.execute(
                "DELETE FROM schema_versions WHERE version = ?1",
                rusqlite::params![migration.version()],
            )?;
        }
        Ok(())
    }

    pub fn validate_migrations(&self, conn: &Connection) -> Result<()> {
        let applied = Self::applied_versions(conn)?;
        for migration in &self.migrations {
            if applied.iter().any(|v| v == migration.version()) {
                migration.validate(conn)?;
            }
        }
        Ok(())
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_to_applies_builtin_schema_and_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::with_builtin_migrations();
        migrator.migrate_to(&conn, None).unwrap();
        assert_eq!(migrator.current_version(&conn).unwrap(), Some("1.0.0".to_string()));

        // re-running must not fail and must not re-apply.
        let applied_again = migrator.migrate_to(&conn, None).unwrap();
        assert!(applied_again.is_empty());
    }

    #[test]
    fn validate_migrations_passes_after_apply() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::with_builtin_migrations();
        migrator.migrate_to(&conn, None).unwrap();
        migrator.validate_migrations(&conn).unwrap();
    }
}
