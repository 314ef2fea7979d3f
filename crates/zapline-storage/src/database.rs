// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::{debug, info};

use zapline_core::ZaplineError;

/// Current schema version. Bump together with [`MIGRATIONS`].
const SCHEMA_VERSION: i64 = 1;

/// Full schema, applied when the database is behind [`SCHEMA_VERSION`].
const MIGRATIONS: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id                    TEXT PRIMARY KEY,
    tenant_id             TEXT NOT NULL,
    status                TEXT NOT NULL,
    display_phone_number  TEXT,
    qr_code               TEXT,
    pairing_code          TEXT,
    last_connected_at     TEXT,
    reconnect_attempts    INTEGER NOT NULL DEFAULT 0,
    human_handover        INTEGER NOT NULL DEFAULT 0,
    profile               TEXT,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    session_id       TEXT NOT NULL,
    phone_number     TEXT NOT NULL,
    display_name     TEXT,
    last_message_at  TEXT NOT NULL,
    PRIMARY KEY (session_id, phone_number)
);

CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY,
    session_id   TEXT NOT NULL,
    contact_id   TEXT NOT NULL,
    direction    TEXT NOT NULL,
    kind         TEXT NOT NULL,
    content      TEXT NOT NULL,
    ai_response  TEXT,
    status       TEXT NOT NULL,
    protocol_id  TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_protocol ON messages (protocol_id);

CREATE TABLE IF NOT EXISTS usage_counters (
    tenant_id  TEXT NOT NULL,
    month      TEXT NOT NULL,
    replies    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, month)
);

CREATE TABLE IF NOT EXISTS plans (
    tenant_id            TEXT PRIMARY KEY,
    monthly_reply_limit  INTEGER
);

CREATE TABLE IF NOT EXISTS broadcast_jobs (
    id            TEXT PRIMARY KEY,
    session_id    TEXT NOT NULL,
    content       TEXT NOT NULL,
    sent_count    INTEGER NOT NULL DEFAULT 0,
    failed_count  INTEGER NOT NULL DEFAULT 0,
    job_status    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS broadcast_recipients (
    job_id        TEXT NOT NULL,
    phone_number  TEXT NOT NULL,
    status        TEXT NOT NULL,
    error         TEXT,
    position      INTEGER NOT NULL,
    PRIMARY KEY (job_id, phone_number)
);
CREATE INDEX IF NOT EXISTS idx_recipients_job ON broadcast_recipients (job_id, position);
";

/// Handle to the single serialized SQLite connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies PRAGMAs and
    /// migrations, and runs crash recovery on session rows.
    pub async fn open(path: &str) -> Result<Self, ZaplineError> {
        let conn = Connection::open(path.to_owned())
            .await
            .map_err(|e| map_tr_err(e.into()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )?;

            let version: i64 =
                conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
            if version < SCHEMA_VERSION {
                conn.execute_batch(MIGRATIONS)?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        let db = Self { conn };
        let recovered = db.recover_stale_sessions().await?;
        if recovered > 0 {
            info!(count = recovered, "reset stale session rows after restart");
        }
        let requeued = db.requeue_interrupted_broadcasts().await?;
        if requeued > 0 {
            info!(count = requeued, "re-queued broadcasts interrupted by restart");
        }

        debug!(path, "database opened");
        Ok(db)
    }

    /// Returns the underlying tokio-rusqlite connection for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoints the WAL and releases the connection.
    pub async fn close(&self) -> Result<(), ZaplineError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Broadcast jobs a crashed process left mid-send go back to `queued`;
    /// already-recorded recipient outcomes are kept, only pending
    /// recipients are re-sent.
    async fn requeue_interrupted_broadcasts(&self) -> Result<usize, ZaplineError> {
        self.conn
            .call(|conn| {
                let n = conn.execute(
                    "UPDATE broadcast_jobs SET job_status = 'queued' WHERE job_status = 'sending'",
                    [],
                )?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sessions left mid-handshake or connected by a crashed process are
    /// reset to `disconnected` so startup restore can reconnect them cleanly.
    async fn recover_stale_sessions(&self) -> Result<usize, ZaplineError> {
        self.conn
            .call(|conn| {
                let n = conn.execute(
                    "UPDATE sessions
                     SET status = 'disconnected', qr_code = NULL, pairing_code = NULL,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE status IN ('connecting', 'qr_ready', 'pairing', 'connected')",
                    [],
                )?;
                Ok(n)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Converts a tokio-rusqlite error into the storage error variant.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> ZaplineError {
    ZaplineError::Storage {
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert!(count >= 6, "expected all tables, found {count}");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn stale_connected_sessions_reset_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stale.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO sessions (id, tenant_id, status, qr_code, created_at, updated_at)
                     VALUES ('s1', 't1', 'connected', 'stale-qr', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        db.close().await.unwrap();

        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        let (status, qr): (String, Option<String>) = db
            .connection()
            .call(|conn| {
                let row = conn.query_row(
                    "SELECT status, qr_code FROM sessions WHERE id = 's1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(row)
            })
            .await
            .unwrap();
        assert_eq!(status, "disconnected");
        assert!(qr.is_none());
        db.close().await.unwrap();
    }
}
