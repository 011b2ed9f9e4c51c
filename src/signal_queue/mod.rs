//! Durable signal queue, grounded in
//! `examples/original_source/src/membria/signal_detector.py`'s
//! `signals` table and `save_signal`/`get_pending_signals`/
//! `mark_extracted`/`get_signal_history`. Deliberately excludes the
//! regex-based decision-signal detection heuristics: this module only
//! owns durable FIFO persistence of already-detected signals, in a
//! relational store kept separate from the graph.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Extracted,
}

impl SignalStatus {
    fn as_str(self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Extracted => "extracted",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "extracted" => SignalStatus::Extracted,
            _ => SignalStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueuedSignal {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub signal_type: String,
    pub confidence: f64,
    pub module: String,
    pub raw_text: String,
    pub status: SignalStatus,
    pub extracted_decision_id: Option<String>,
}

/// A signal ready to be enqueued, before an id/timestamp is assigned.
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub signal_type: String,
    pub confidence: f64,
    pub module: String,
    pub raw_text: String,
}

pub struct SignalQueue {
    conn: Arc<Mutex<Connection>>,
}

impl SignalQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                module TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                extracted_decision_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status);
            CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON signals(timestamp DESC);",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| crate::error::Error::Internal(format!("poisoned connection lock: {e}")))?;
        f(&conn)
    }

    /// Persists a detected signal and returns its assigned id.
    pub fn save_signal(&self, signal: NewSignal) -> Result<String> {
        let id = format!("sig_{}", Uuid::new_v4().simple());
        let timestamp = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO signals (id, timestamp, signal_type, confidence, module, raw_text, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending')",
                params![id, timestamp.to_rfc3339(), signal.signal_type, signal.confidence, signal.module, signal.raw_text],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    /// All signals still awaiting extraction, most recent first.
    pub fn get_pending_signals(&self) -> Result<Vec<QueuedSignal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, signal_type, confidence, module, raw_text, status, extracted_decision_id
                 FROM signals WHERE status = 'pending' ORDER BY timestamp DESC",
            )?;
            let rows = stmt.query_map([], row_to_signal)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// The most recent `limit` signals regardless of status.
    pub fn get_signal_history(&self, limit: u32) -> Result<Vec<QueuedSignal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, signal_type, confidence, module, raw_text, status, extracted_decision_id
                 FROM signals ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_signal)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Marks `signal_id` as extracted into `decision_id`. Idempotent:
    /// re-marking the same signal with the same decision is a no-op
    /// write, not an error.
    pub fn mark_extracted(&self, signal_id: &str, decision_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE signals SET status = 'extracted', extracted_decision_id = ?1 WHERE id = ?2",
                params![decision_id, signal_id],
            )?;
            if updated == 0 {
                return Err(crate::error::Error::NotFound(format!("signal {signal_id}")));
            }
            Ok(())
        })
    }

    pub fn get_signal(&self, signal_id: &str) -> Result<Option<QueuedSignal>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, timestamp, signal_type, confidence, module, raw_text, status, extracted_decision_id
                 FROM signals WHERE id = ?1",
                params![signal_id],
                row_to_signal,
            )
            .optional()
            .map_err(Into::into)
        })
    }
}

fn row_to_signal(row: &rusqlite::Row) -> rusqlite::Result<QueuedSignal> {
    let status: String = row.get(6)?;
    let timestamp: String = row.get(1)?;
    Ok(QueuedSignal {
        id: row.get(0)?,
        timestamp: timestamp.parse().unwrap_or_else(|_| Utc::now()),
        signal_type: row.get(2)?,
        confidence: row.get(3)?,
        module: row.get(4)?,
        raw_text: row.get(5)?,
        status: SignalStatus::parse(&status),
        extracted_decision_id: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewSignal {
        NewSignal { signal_type: "high".into(), confidence: 0.85, module: "backend".into(), raw_text: "let's use Redis".into() }
    }

    #[test]
    fn save_and_fetch_pending_signal() {
        let queue = SignalQueue::in_memory().unwrap();
        let id = queue.save_signal(sample()).unwrap();
        let pending = queue.get_pending_signals().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].status, SignalStatus::Pending);
    }

    #[test]
    fn mark_extracted_removes_from_pending() {
        let queue = SignalQueue::in_memory().unwrap();
        let id = queue.save_signal(sample()).unwrap();
        queue.mark_extracted(&id, "dec_123").unwrap();
        assert!(queue.get_pending_signals().unwrap().is_empty());
        let signal = queue.get_signal(&id).unwrap().unwrap();
        assert_eq!(signal.status, SignalStatus::Extracted);
        assert_eq!(signal.extracted_decision_id.as_deref(), Some("dec_123"));
    }

    #[test]
    fn marking_unknown_signal_is_not_found() {
        let queue = SignalQueue::in_memory().unwrap();
        let err = queue.mark_extracted("sig_missing", "dec_1");
        assert!(matches!(err, Err(crate::error::Error::NotFound(_))));
    }

    #[test]
    fn history_respects_limit_and_ordering() {
        let queue = SignalQueue::in_memory().unwrap();
        for _ in 0..3 {
            queue.save_signal(sample()).unwrap();
        }
        let history = queue.get_signal_history(2).unwrap();
        assert_eq!(history.len(), 2);
    }
}
