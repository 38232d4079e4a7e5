use rusqlite::{Connection, Result};

/// Safe to call on every startup — idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS queue (
            id           TEXT PRIMARY KEY,
            session_id   TEXT NOT NULL,
            channel      TEXT NOT NULL,
            sender       TEXT NOT NULL,
            content      TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending',
            enqueued_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queue_status_enqueued
            ON queue(status, enqueued_at);",
    )
}
