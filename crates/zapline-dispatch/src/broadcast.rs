// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast delivery: a small fixed worker pool draining durable jobs.
//!
//! Recipients are processed sequentially with a fixed inter-message delay —
//! parallel fan-out against the protocol invites throttling and account
//! bans. A recipient failure is recorded and skipped; it never aborts the
//! job. The pool is separate from reply dispatch so a large broadcast
//! cannot starve interactive reply latency.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use zapline_core::types::{
    BroadcastJob, BroadcastStatus, ContactRecord, MessageDirection, MessageKind, MessageRecord,
    MessageStatus, RecipientStatus,
};
use zapline_core::{RecordStore, SocketRegistry, ZaplineError};

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub workers: usize,
    pub inter_message_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            inter_message_delay: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&zapline_config::model::BroadcastConfig> for BroadcastSettings {
    fn from(config: &zapline_config::model::BroadcastConfig) -> Self {
        Self {
            workers: config.workers,
            inter_message_delay: Duration::from_millis(config.inter_message_delay_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Owns the broadcast worker pool.
pub struct BroadcastRunner {
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn SocketRegistry>,
    settings: BroadcastSettings,
    cancel: CancellationToken,
}

impl BroadcastRunner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn SocketRegistry>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the fixed-size worker pool. Each worker claims queued jobs and
    /// processes them to completion.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        (0..self.settings.workers)
            .map(|worker| {
                let store = Arc::clone(&self.store);
                let registry = Arc::clone(&self.registry);
                let settings = self.settings.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    worker_loop(worker, store, registry, settings, cancel).await;
                })
            })
            .collect()
    }

    /// Stops all workers after their current recipient completes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn worker_loop(
    worker: usize,
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn SocketRegistry>,
    settings: BroadcastSettings,
    cancel: CancellationToken,
) {
    loop {
        let claimed = tokio::select! {
            _ = cancel.cancelled() => break,
            claimed = store.claim_next_broadcast() => claimed,
        };

        match claimed {
            Ok(Some(job)) => {
                process_job(store.as_ref(), registry.as_ref(), &settings, &cancel, job).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.poll_interval) => {}
                }
            }
            Err(e) => {
                warn!(worker, error = %e, "broadcast claim failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.poll_interval) => {}
                }
            }
        }
    }
}

/// Processes one claimed job: recipients strictly in order, fixed delay
/// between sends, per-recipient failures recorded and skipped.
pub async fn process_job(
    store: &dyn RecordStore,
    registry: &dyn SocketRegistry,
    settings: &BroadcastSettings,
    cancel: &CancellationToken,
    job: BroadcastJob,
) {
    info!(
        job_id = %job.id,
        session_id = %job.session_id,
        recipients = job.recipients.len(),
        "broadcast started"
    );

    for recipient in job
        .recipients
        .iter()
        .filter(|r| r.status == RecipientStatus::Pending)
    {
        if cancel.is_cancelled() {
            // The job stays `sending`; startup crash recovery re-queues it.
            return;
        }

        match send_one(store, registry, &job, &recipient.phone_number).await {
            Ok(()) => {
                if let Err(e) = store
                    .mark_recipient(&job.id, &recipient.phone_number, RecipientStatus::Sent, None)
                    .await
                {
                    warn!(job_id = %job.id, error = %e, "recipient status update failed");
                }
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    recipient = %recipient.phone_number,
                    error = %e,
                    "broadcast recipient failed"
                );
                if let Err(e) = store
                    .mark_recipient(
                        &job.id,
                        &recipient.phone_number,
                        RecipientStatus::Failed,
                        Some(&e.to_string()),
                    )
                    .await
                {
                    warn!(job_id = %job.id, error = %e, "recipient status update failed");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(settings.inter_message_delay) => {}
        }
    }

    finalize_job(store, &job.id).await;
}

async fn send_one(
    store: &dyn RecordStore,
    registry: &dyn SocketRegistry,
    job: &BroadcastJob,
    phone_number: &str,
) -> Result<(), ZaplineError> {
    let socket = registry.socket(&job.session_id).ok_or_else(|| {
        ZaplineError::TransientProtocol {
            message: format!("session {} is not connected", job.session_id),
        }
    })?;
    let protocol_id = socket.send_text(phone_number, &job.content).await?;

    let now = chrono::Utc::now().to_rfc3339();
    let record = MessageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: job.session_id.clone(),
        contact_id: phone_number.to_string(),
        direction: MessageDirection::Outbound,
        kind: MessageKind::Text,
        content: job.content.clone(),
        ai_response: None,
        status: MessageStatus::Sent,
        protocol_id: Some(protocol_id),
        created_at: now.clone(),
    };
    store.insert_message(&record).await?;
    store
        .upsert_contact(&ContactRecord {
            session_id: job.session_id.clone(),
            phone_number: phone_number.to_string(),
            display_name: None,
            last_message_at: now,
        })
        .await?;
    Ok(())
}

async fn finalize_job(store: &dyn RecordStore, job_id: &str) {
    let job = match store.get_broadcast(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            warn!(job_id, error = %e, "broadcast finalize lookup failed");
            return;
        }
    };

    let status = if job.sent_count == 0 && job.failed_count > 0 {
        BroadcastStatus::Failed
    } else {
        BroadcastStatus::Completed
    };
    if let Err(e) = store.complete_broadcast(job_id, status).await {
        warn!(job_id, error = %e, "broadcast finalize failed");
    }
    info!(
        job_id,
        sent = job.sent_count,
        failed = job.failed_count,
        status = %status,
        "broadcast finished"
    );
}
