// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable broadcast jobs with crash-safe claiming.
//!
//! Jobs move `queued -> sending -> {completed | failed}`. Claiming uses a
//! find-and-update transaction so two workers never take the same job.

use rusqlite::{params, Connection, Row};

use zapline_core::types::{BroadcastJob, BroadcastRecipient, BroadcastStatus, RecipientStatus};
use zapline_core::ZaplineError;

use crate::database::{map_tr_err, Database};
use crate::queries::column_enum;

fn map_job_row(row: &Row<'_>) -> Result<BroadcastJob, rusqlite::Error> {
    Ok(BroadcastJob {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        sent_count: row.get(3)?,
        failed_count: row.get(4)?,
        job_status: column_enum(5, row.get::<_, String>(5)?)?,
        created_at: row.get(6)?,
        recipients: Vec::new(),
    })
}

fn load_recipients(
    conn: &Connection,
    job_id: &str,
) -> Result<Vec<BroadcastRecipient>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT phone_number, status, error FROM broadcast_recipients
         WHERE job_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![job_id], |row| {
        Ok(BroadcastRecipient {
            phone_number: row.get(0)?,
            status: column_enum(1, row.get::<_, String>(1)?)?,
            error: row.get(2)?,
        })
    })?;
    let mut recipients = Vec::new();
    for row in rows {
        recipients.push(row?);
    }
    Ok(recipients)
}

/// Insert a job and its recipient rows in one transaction.
pub async fn create_broadcast(db: &Database, job: &BroadcastJob) -> Result<(), ZaplineError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO broadcast_jobs (id, session_id, content, sent_count, failed_count,
                                             job_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job.id,
                    job.session_id,
                    job.content,
                    job.sent_count,
                    job.failed_count,
                    job.job_status.to_string(),
                    job.created_at,
                ],
            )?;
            for (position, recipient) in job.recipients.iter().enumerate() {
                tx.execute(
                    "INSERT INTO broadcast_recipients (job_id, phone_number, status, error, position)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        job.id,
                        recipient.phone_number,
                        recipient.status.to_string(),
                        recipient.error,
                        position as i64,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a job with its recipients.
pub async fn get_broadcast(db: &Database, id: &str) -> Result<Option<BroadcastJob>, ZaplineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, session_id, content, sent_count, failed_count, job_status, created_at
                 FROM broadcast_jobs WHERE id = ?1",
                params![id],
                map_job_row,
            );
            match result {
                Ok(mut job) => {
                    job.recipients = load_recipients(conn, &job.id)?;
                    Ok(Some(job))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim the oldest `queued` job, transitioning it to `sending`.
/// Returns `None` when no job is waiting.
pub async fn claim_next_broadcast(db: &Database) -> Result<Option<BroadcastJob>, ZaplineError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = tx.query_row(
                "SELECT id, session_id, content, sent_count, failed_count, job_status, created_at
                 FROM broadcast_jobs WHERE job_status = 'queued'
                 ORDER BY created_at ASC LIMIT 1",
                [],
                map_job_row,
            );

            match result {
                Ok(mut job) => {
                    tx.execute(
                        "UPDATE broadcast_jobs SET job_status = 'sending' WHERE id = ?1",
                        params![job.id],
                    )?;
                    job.recipients = load_recipients(&tx, &job.id)?;
                    tx.commit()?;
                    job.job_status = BroadcastStatus::Sending;
                    Ok(Some(job))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record one recipient's outcome and bump the job aggregates in the same
/// transaction, so counters never drift from recipient rows.
pub async fn mark_recipient(
    db: &Database,
    job_id: &str,
    phone_number: &str,
    status: RecipientStatus,
    error: Option<&str>,
) -> Result<(), ZaplineError> {
    let job_id = job_id.to_string();
    let phone_number = phone_number.to_string();
    let error = error.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE broadcast_recipients SET status = ?1, error = ?2
                 WHERE job_id = ?3 AND phone_number = ?4",
                params![status.to_string(), error, job_id, phone_number],
            )?;
            match status {
                RecipientStatus::Sent => {
                    tx.execute(
                        "UPDATE broadcast_jobs SET sent_count = sent_count + 1 WHERE id = ?1",
                        params![job_id],
                    )?;
                }
                RecipientStatus::Failed => {
                    tx.execute(
                        "UPDATE broadcast_jobs SET failed_count = failed_count + 1 WHERE id = ?1",
                        params![job_id],
                    )?;
                }
                RecipientStatus::Pending => {}
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move a job to a terminal status.
pub async fn complete_broadcast(
    db: &Database,
    job_id: &str,
    status: BroadcastStatus,
) -> Result<(), ZaplineError> {
    let job_id = job_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE broadcast_jobs SET job_status = ?1 WHERE id = ?2",
                params![status, job_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

enum DeleteOutcome {
    Deleted,
    Sending,
    NotFound,
}

/// Delete a job and its recipients. A job mid-send cannot be deleted.
pub async fn delete_broadcast(db: &Database, id: &str) -> Result<(), ZaplineError> {
    let id_owned = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let status: Result<String, rusqlite::Error> = tx.query_row(
                "SELECT job_status FROM broadcast_jobs WHERE id = ?1",
                params![id_owned],
                |row| row.get(0),
            );
            let outcome = match status {
                Ok(status) if status == "sending" => DeleteOutcome::Sending,
                Ok(_) => {
                    tx.execute(
                        "DELETE FROM broadcast_recipients WHERE job_id = ?1",
                        params![id_owned],
                    )?;
                    tx.execute("DELETE FROM broadcast_jobs WHERE id = ?1", params![id_owned])?;
                    DeleteOutcome::Deleted
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => DeleteOutcome::NotFound,
                Err(e) => return Err(e.into()),
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::Sending => Err(ZaplineError::Validation(format!(
            "broadcast {id} is sending and cannot be deleted until terminal"
        ))),
        DeleteOutcome::NotFound => Err(ZaplineError::Validation(format!(
            "broadcast {id} not found"
        ))),
    }
}
