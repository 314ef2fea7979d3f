// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact upsert, keyed by (session, phone number).

use rusqlite::params;

use zapline_core::types::ContactRecord;
use zapline_core::ZaplineError;

use crate::database::{map_tr_err, Database};

/// Insert or refresh a contact. A `None` display name never overwrites a
/// previously learned one.
pub async fn upsert_contact(db: &Database, contact: &ContactRecord) -> Result<(), ZaplineError> {
    let contact = contact.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (session_id, phone_number, display_name, last_message_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (session_id, phone_number) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, display_name),
                     last_message_at = excluded.last_message_at",
                params![
                    contact.session_id,
                    contact.phone_number,
                    contact.display_name,
                    contact.last_message_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn fetch(db: &Database, phone: &str) -> (Option<String>, String) {
        let phone = phone.to_string();
        db.connection()
            .call(move |conn| {
                let row = conn.query_row(
                    "SELECT display_name, last_message_at FROM contacts
                     WHERE session_id = 's1' AND phone_number = ?1",
                    params![phone],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(row)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_inserts_then_refreshes() {
        let (db, _dir) = setup_db().await;
        let mut contact = ContactRecord {
            session_id: "s1".to_string(),
            phone_number: "5511988887777".to_string(),
            display_name: Some("Maria".to_string()),
            last_message_at: "2026-01-01T00:00:01Z".to_string(),
        };
        upsert_contact(&db, &contact).await.unwrap();

        contact.display_name = None;
        contact.last_message_at = "2026-01-01T00:00:09Z".to_string();
        upsert_contact(&db, &contact).await.unwrap();

        let (name, last) = fetch(&db, "5511988887777").await;
        // Name learned earlier survives a nameless upsert.
        assert_eq!(name.as_deref(), Some("Maria"));
        assert_eq!(last, "2026-01-01T00:00:09Z");
        db.close().await.unwrap();
    }
}
