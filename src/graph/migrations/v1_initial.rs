//! Baseline schema: the polymorphic `nodes` and `edges` tables
//! (SPEC_FULL.md §A).

use super::Migration;
use crate::error::Result;
use rusqlite::Connection;

pub struct V1Initial;

impl Migration for V1Initial {
    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "baseline nodes/edges tables"
    }

    fn migrate(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                ttl_days INTEGER NOT NULL DEFAULT 365,
                last_verified_at TEXT NOT NULL,
                deprecated_reason TEXT,
                memory_type TEXT,
                memory_subject TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type_ns
                ON nodes(node_type, tenant_id, team_id, project_id);
            CREATE INDEX IF NOT EXISTS idx_nodes_active
                ON nodes(is_active);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                src_id TEXT NOT NULL,
                dst_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                data TEXT,
                FOREIGN KEY (src_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (dst_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src_id, rel_type);

            CREATE TABLE IF NOT EXISTS signal_queue (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                module TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                status TEXT NOT NULL,
                extracted_decision_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_signal_queue_status ON signal_queue(status);
            ",
        )?;
        Ok(())
    }

    fn rollback(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "DROP TABLE IF EXISTS signal_queue;
             DROP TABLE IF EXISTS edges;
             DROP TABLE IF EXISTS nodes;",
        )?;
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('nodes', 'edges', 'signal_queue')",
            [],
            |row| row.get(0),
        )?;
        if count != 3 {
            return Err(crate::error::Error::Migration(
                "expected nodes, edges, signal_queue tables to exist".into(),
            ));
        }
        Ok(())
    }
}
