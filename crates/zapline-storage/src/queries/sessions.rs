// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record CRUD operations.

use rusqlite::{params, Row};

use zapline_core::types::{BotProfile, SessionRecord, SessionStatus};
use zapline_core::ZaplineError;

use crate::database::{map_tr_err, Database};
use crate::queries::column_enum;

fn map_session_row(row: &Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    Ok(SessionRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        status: column_enum(2, row.get::<_, String>(2)?)?,
        display_phone_number: row.get(3)?,
        qr_code: row.get(4)?,
        pairing_code: row.get(5)?,
        last_connected_at: row.get(6)?,
        reconnect_attempts: row.get(7)?,
        human_handover: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const SESSION_COLUMNS: &str = "id, tenant_id, status, display_phone_number, qr_code, \
     pairing_code, last_connected_at, reconnect_attempts, human_handover, \
     created_at, updated_at";

/// Create a new session record.
pub async fn create_session(db: &Database, session: &SessionRecord) -> Result<(), ZaplineError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, tenant_id, status, display_phone_number, qr_code,
                                       pairing_code, last_connected_at, reconnect_attempts,
                                       human_handover, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    session.id,
                    session.tenant_id,
                    session.status.to_string(),
                    session.display_phone_number,
                    session.qr_code,
                    session.pairing_code,
                    session.last_connected_at,
                    session.reconnect_attempts,
                    session.human_handover,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<SessionRecord>, ZaplineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], map_session_row);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List sessions, optionally filtered by status.
pub async fn list_sessions(
    db: &Database,
    status: Option<SessionStatus>,
) -> Result<Vec<SessionRecord>, ZaplineError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            match &status {
                Some(filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions
                         WHERE status = ?1 ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![filter], map_session_row)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt.query_map([], map_session_row)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Full-row update. The session manager is the only writer of session rows,
/// so last-write-wins semantics are safe.
pub async fn update_session(db: &Database, session: &SessionRecord) -> Result<(), ZaplineError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET tenant_id = ?1, status = ?2, display_phone_number = ?3, qr_code = ?4,
                     pairing_code = ?5, last_connected_at = ?6, reconnect_attempts = ?7,
                     human_handover = ?8,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?9",
                params![
                    session.tenant_id,
                    session.status.to_string(),
                    session.display_phone_number,
                    session.qr_code,
                    session.pairing_code,
                    session.last_connected_at,
                    session.reconnect_attempts,
                    session.human_handover,
                    session.id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session's bot profile. Absent or unparseable profiles return `None`.
pub async fn get_profile(
    db: &Database,
    session_id: &str,
) -> Result<Option<BotProfile>, ZaplineError> {
    let session_id = session_id.to_string();
    let raw: Option<String> = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT profile FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get::<_, Option<String>>(0),
            );
            match result {
                Ok(raw) => Ok(raw),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;

    Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
}

/// Store a session's bot profile as JSON.
pub async fn set_profile(
    db: &Database,
    session_id: &str,
    profile: &BotProfile,
) -> Result<(), ZaplineError> {
    let session_id = session_id.to_string();
    let json = serde_json::to_string(profile).map_err(|e| ZaplineError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET profile = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![json, session_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
