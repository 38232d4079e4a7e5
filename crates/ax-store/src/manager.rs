//! C6 — append-only per-session turn log with count/prune/load.
//!
//! Grounded on the queue crate's `Mutex<Connection>` single-writer pattern:
//! only the host process mutates the store, so one connection behind a
//! mutex is sufficient.

use std::str::FromStr;
use std::sync::Mutex;

use ax_core::types::TurnRole;
use rusqlite::{params, Connection};
use tracing::instrument;

use crate::db;
use crate::error::Result;
use crate::types::ConversationTurn;

pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        db::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[instrument(skip(self, content))]
    pub fn append(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
        sender: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO turns (session_id, role, content, sender, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, role.to_string(), content, sender, now],
        )?;
        Ok(())
    }

    /// Most recent `limit` turns for `session_id`, returned oldest-first.
    #[instrument(skip(self))]
    pub fn load(&self, session_id: &str, limit: u64) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, role, content, sender, timestamp
             FROM turns WHERE session_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let mut rows: Vec<ConversationTurn> = stmt
            .query_map(params![session_id, limit as i64], Self::row_to_turn)?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn count(&self, session_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Delete all but the most recent `keep` turns for `session_id`.
    #[instrument(skip(self))]
    pub fn prune(&self, session_id: &str, keep: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM turns WHERE session_id = ?1 AND id NOT IN (
                SELECT id FROM turns WHERE session_id = ?1
                ORDER BY timestamp DESC, id DESC LIMIT ?2
            )",
            params![session_id, keep as i64],
        )?;
        Ok(())
    }

    fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<ConversationTurn> {
        let role_str: String = row.get(1)?;
        let ts_str: String = row.get(4)?;
        Ok(ConversationTurn {
            session_id: row.get(0)?,
            role: TurnRole::from_str(&role_str).unwrap_or(TurnRole::User),
            content: row.get(2)?,
            sender: row.get(3)?,
            timestamp: chrono::DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_load_preserves_order() {
        let store = ConversationStore::in_memory().unwrap();
        store.append("s1", TurnRole::User, "hi", Some("alice")).unwrap();
        store.append("s1", TurnRole::Assistant, "hello", None).unwrap();
        let turns = store.load("s1", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].content, "hello");
    }

    #[test]
    fn prune_keeps_most_recent() {
        let store = ConversationStore::in_memory().unwrap();
        for i in 0..5 {
            store.append("s1", TurnRole::User, &format!("turn {i}"), None).unwrap();
        }
        store.prune("s1", 2).unwrap();
        assert_eq!(store.count("s1").unwrap(), 2);
        let turns = store.load("s1", 10).unwrap();
        assert_eq!(turns[0].content, "turn 3");
        assert_eq!(turns[1].content, "turn 4");
    }

    #[test]
    fn count_is_scoped_per_session() {
        let store = ConversationStore::in_memory().unwrap();
        store.append("s1", TurnRole::User, "a", None).unwrap();
        store.append("s2", TurnRole::User, "b", None).unwrap();
        assert_eq!(store.count("s1").unwrap(), 1);
        assert_eq!(store.count("s2").unwrap(), 1);
    }
}
