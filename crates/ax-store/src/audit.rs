//! The concrete audit ledger: a `Mutex<Connection>` single-writer SQLite
//! table implementing both `AuditSink` (record) and `AuditQuery` (read back
//! for `audit_query`), the same split `ax-core::audit` defines so the router
//! and most IPC handlers can depend on the narrower `AuditSink` trait alone.

use std::sync::Mutex;

use ax_core::audit::{AuditEvent, AuditQuery, AuditResult, AuditSink};
use rusqlite::{params, Connection};
use tracing::instrument;

use crate::error::Result;

pub struct AuditStore {
    conn: Mutex<Connection>,
}

impl AuditStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                action      TEXT NOT NULL,
                session_id  TEXT NOT NULL,
                args        TEXT NOT NULL,
                result      TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_log(session_id, timestamp);",
        )
    }
}

impl AuditSink for AuditStore {
    #[instrument(skip(self, event))]
    fn record(&self, event: AuditEvent) {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "INSERT INTO audit_log (action, session_id, args, result, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![event.action, event.session_id, event.args.to_string(), event.result.to_string(), now],
        );
    }
}

impl AuditQuery for AuditStore {
    #[instrument(skip(self))]
    fn query(&self, session_id: Option<&str>, limit: u64) -> Vec<AuditEvent> {
        let conn = self.conn.lock().unwrap();
        let result = match session_id {
            Some(sid) => {
                let mut stmt = match conn.prepare(
                    "SELECT action, session_id, args, result FROM audit_log
                     WHERE session_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
                ) {
                    Ok(s) => s,
                    Err(_) => return Vec::new(),
                };
                stmt.query_map(params![sid, limit as i64], Self::row_to_event)
                    .map(|rows| rows.filter_map(|r| r.ok()).collect())
            }
            None => {
                let mut stmt = match conn.prepare(
                    "SELECT action, session_id, args, result FROM audit_log
                     ORDER BY timestamp DESC, id DESC LIMIT ?1",
                ) {
                    Ok(s) => s,
                    Err(_) => return Vec::new(),
                };
                stmt.query_map(params![limit as i64], Self::row_to_event)
                    .map(|rows| rows.filter_map(|r| r.ok()).collect())
            }
        };
        result.unwrap_or_default()
    }
}

impl AuditStore {
    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<AuditEvent> {
        let result_str: String = row.get(3)?;
        let args_str: String = row.get(2)?;
        let result = match result_str.as_str() {
            "blocked" => AuditResult::Blocked,
            "failed" => AuditResult::Failed,
            _ => AuditResult::Success,
        };
        Ok(AuditEvent {
            action: row.get(0)?,
            session_id: row.get(1)?,
            args: serde_json::from_str(&args_str).unwrap_or(serde_json::Value::Null),
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_and_queries_by_session() {
        let store = AuditStore::in_memory().unwrap();
        store.record(AuditEvent::new("skill_read", "s1", json!({"name": "weather"}), AuditResult::Success));
        store.record(AuditEvent::new("web_fetch", "s2", json!({"url": "x"}), AuditResult::Blocked));

        let s1_events = store.query(Some("s1"), 10);
        assert_eq!(s1_events.len(), 1);
        assert_eq!(s1_events[0].action, "skill_read");

        let all = store.query(None, 10);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn respects_limit() {
        let store = AuditStore::in_memory().unwrap();
        for i in 0..5 {
            store.record(AuditEvent::new("x", "s1", json!({ "i": i }), AuditResult::Success));
        }
        assert_eq!(store.query(Some("s1"), 2).len(), 2);
    }
}
