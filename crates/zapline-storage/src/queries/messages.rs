// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message append and delivery-status transitions.
//!
//! Message rows are append-only; only the `status` column transitions, via
//! protocol delivery receipts.

use rusqlite::{params, Row};

use zapline_core::types::{MessageRecord, MessageStatus};
use zapline_core::ZaplineError;

use crate::database::{map_tr_err, Database};
use crate::queries::column_enum;

fn map_message_row(row: &Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        contact_id: row.get(2)?,
        direction: column_enum(3, row.get::<_, String>(3)?)?,
        kind: column_enum(4, row.get::<_, String>(4)?)?,
        content: row.get(5)?,
        ai_response: row.get(6)?,
        status: column_enum(7, row.get::<_, String>(7)?)?,
        protocol_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Append a message row.
pub async fn insert_message(db: &Database, message: &MessageRecord) -> Result<(), ZaplineError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, contact_id, direction, kind, content,
                                       ai_response, status, protocol_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id,
                    message.session_id,
                    message.contact_id,
                    message.direction.to_string(),
                    message.kind.to_string(),
                    message.content,
                    message.ai_response,
                    message.status.to_string(),
                    message.protocol_id,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a delivery-receipt status transition, matched by protocol message
/// id. Returns `false` when no message matched the receipt.
pub async fn update_message_status(
    db: &Database,
    protocol_id: &str,
    status: MessageStatus,
) -> Result<bool, ZaplineError> {
    let protocol_id = protocol_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE messages SET status = ?1 WHERE protocol_id = ?2",
                params![status, protocol_id],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a session's messages in chronological order, newest-bounded by
/// `limit` when given.
pub async fn get_messages_for_session(
    db: &Database,
    session_id: &str,
    limit: Option<i64>,
) -> Result<Vec<MessageRecord>, ZaplineError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut messages = Vec::new();
            let sql = match limit {
                Some(_) => {
                    "SELECT id, session_id, contact_id, direction, kind, content, ai_response,
                            status, protocol_id, created_at
                     FROM (SELECT * FROM messages WHERE session_id = ?1
                           ORDER BY created_at DESC LIMIT ?2)
                     ORDER BY created_at ASC"
                }
                None => {
                    "SELECT id, session_id, contact_id, direction, kind, content, ai_response,
                            status, protocol_id, created_at
                     FROM messages WHERE session_id = ?1 ORDER BY created_at ASC"
                }
            };
            let mut stmt = conn.prepare(sql)?;
            match limit {
                Some(n) => {
                    let rows = stmt.query_map(params![session_id, n], map_message_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let rows = stmt.query_map(params![session_id], map_message_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zapline_core::types::{MessageDirection, MessageKind};

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_message(id: &str, protocol_id: Option<&str>, created_at: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            session_id: "s1".to_string(),
            contact_id: "5511988887777".to_string(),
            direction: MessageDirection::Outbound,
            kind: MessageKind::Text,
            content: "hello".to_string(),
            ai_response: None,
            status: MessageStatus::Sent,
            protocol_id: protocol_id.map(str::to_string),
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_in_order() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", None, "2026-01-01T00:00:01Z"))
            .await
            .unwrap();
        insert_message(&db, &make_message("m2", None, "2026-01-01T00:00:02Z"))
            .await
            .unwrap();

        let messages = get_messages_for_session(&db, "s1", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[1].id, "m2");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn limit_returns_newest_in_chronological_order() {
        let (db, _dir) = setup_db().await;
        for (id, ts) in [
            ("m1", "2026-01-01T00:00:01Z"),
            ("m2", "2026-01-01T00:00:02Z"),
            ("m3", "2026-01-01T00:00:03Z"),
        ] {
            insert_message(&db, &make_message(id, None, ts)).await.unwrap();
        }

        let messages = get_messages_for_session(&db, "s1", Some(2)).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m2");
        assert_eq!(messages[1].id, "m3");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn receipt_updates_status_by_protocol_id() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &make_message("m1", Some("proto-9"), "2026-01-01T00:00:01Z"))
            .await
            .unwrap();

        let matched = update_message_status(&db, "proto-9", MessageStatus::Delivered)
            .await
            .unwrap();
        assert!(matched);

        let messages = get_messages_for_session(&db, "s1", None).await.unwrap();
        assert_eq!(messages[0].status, MessageStatus::Delivered);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn receipt_for_unknown_protocol_id_matches_nothing() {
        let (db, _dir) = setup_db().await;
        let matched = update_message_status(&db, "ghost", MessageStatus::Read)
            .await
            .unwrap();
        assert!(!matched);
        db.close().await.unwrap();
    }
}
