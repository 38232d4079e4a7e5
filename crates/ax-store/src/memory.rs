//! Scoped agent memory backing `memory_write`/`memory_query`/`memory_read`/
//! `memory_delete`/`memory_list`. Same single-writer `Mutex<Connection>`
//! shape as [`crate::manager::ConversationStore`] — one process, one writer.

use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use crate::db;
use crate::error::Result;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryEntry {
    pub scope: String,
    pub key: String,
    pub value: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
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

    #[instrument(skip(self, value))]
    pub fn write(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memory (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![scope, key, value, now],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn read(&self, scope: &str, key: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT scope, key, value, updated_at FROM memory WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                Self::row_to_entry,
            )
            .ok();
        Ok(row)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, scope: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM memory WHERE scope = ?1 AND key = ?2", params![scope, key])?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list(&self, scope: &str) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT scope, key, value, updated_at FROM memory WHERE scope = ?1 ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![scope], Self::row_to_entry)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Substring match over key and value within a scope — `memory_query`
    /// has no structured query language, just a loose text filter.
    #[instrument(skip(self))]
    pub fn query(&self, scope: &str, needle: Option<&str>) -> Result<Vec<MemoryEntry>> {
        let all = self.list(scope)?;
        Ok(match needle {
            None => all,
            Some(n) => {
                let n = n.to_lowercase();
                all.into_iter()
                    .filter(|e| e.key.to_lowercase().contains(&n) || e.value.to_lowercase().contains(&n))
                    .collect()
            }
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
        let ts_str: String = row.get(3)?;
        Ok(MemoryEntry {
            scope: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            updated_at: chrono::DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let store = MemoryStore::in_memory().unwrap();
        store.write("agent", "nickname", "Ada").unwrap();
        let entry = store.read("agent", "nickname").unwrap().unwrap();
        assert_eq!(entry.value, "Ada");
    }

    #[test]
    fn write_overwrites_existing_key() {
        let store = MemoryStore::in_memory().unwrap();
        store.write("agent", "k", "v1").unwrap();
        store.write("agent", "k", "v2").unwrap();
        assert_eq!(store.read("agent", "k").unwrap().unwrap().value, "v2");
    }

    #[test]
    fn delete_removes_key() {
        let store = MemoryStore::in_memory().unwrap();
        store.write("agent", "k", "v").unwrap();
        store.delete("agent", "k").unwrap();
        assert!(store.read("agent", "k").unwrap().is_none());
    }

    #[test]
    fn list_is_scoped() {
        let store = MemoryStore::in_memory().unwrap();
        store.write("a", "k1", "v1").unwrap();
        store.write("b", "k2", "v2").unwrap();
        assert_eq!(store.list("a").unwrap().len(), 1);
    }

    #[test]
    fn query_filters_by_substring() {
        let store = MemoryStore::in_memory().unwrap();
        store.write("agent", "favorite_color", "blue").unwrap();
        store.write("agent", "favorite_food", "pizza").unwrap();
        let hits = store.query("agent", Some("color")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "favorite_color");
    }
}
