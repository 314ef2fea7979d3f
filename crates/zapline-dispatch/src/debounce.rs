// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-contact debounce queue.
//!
//! A human typing several messages in quick succession should be answered
//! once, coherently, not once per fragment. Fragments accumulate per
//! (session, contact) and flush after a quiet period; each arrival resets
//! the batch timer.
//!
//! Flushing removes the batch under the map lock before any downstream
//! call, so a batch is never dispatched twice and a fragment arriving
//! mid-flush starts a brand-new batch instead of re-entering the flushed
//! one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use zapline_core::types::Presence;
use zapline_core::SocketRegistry;

type BatchKey = (String, String);

/// Receives the joined text of a flushed batch.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    async fn flush(&self, session_id: &str, tenant_id: &str, contact: &str, text: String);
}

struct PendingBatch {
    tenant_id: String,
    fragments: Vec<String>,
    timer: JoinHandle<()>,
}

struct DebouncerInner {
    batches: Mutex<HashMap<BatchKey, PendingBatch>>,
    quiet_period: Duration,
    consumer: Arc<dyn BatchConsumer>,
    registry: Arc<dyn SocketRegistry>,
}

/// Debounces inbound text per (session, contact). Cheap to clone.
#[derive(Clone)]
pub struct ContactDebouncer {
    inner: Arc<DebouncerInner>,
}

impl ContactDebouncer {
    pub fn new(
        quiet_period: Duration,
        consumer: Arc<dyn BatchConsumer>,
        registry: Arc<dyn SocketRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                batches: Mutex::new(HashMap::new()),
                quiet_period,
                consumer,
                registry,
            }),
        }
    }

    /// Appends a fragment to the contact's batch, resetting its quiet-period
    /// timer. The first fragment of a batch sends a composing presence
    /// signal to the contact.
    pub async fn on_fragment(
        &self,
        session_id: &str,
        tenant_id: &str,
        contact: &str,
        text: String,
    ) {
        let key = (session_id.to_string(), contact.to_string());
        let mut batches = self.inner.batches.lock().await;
        match batches.get_mut(&key) {
            Some(batch) => {
                batch.fragments.push(text);
                batch.timer.abort();
                batch.timer = spawn_timer(Arc::clone(&self.inner), key.clone());
            }
            None => {
                self.send_composing(session_id, contact);
                let batch = PendingBatch {
                    tenant_id: tenant_id.to_string(),
                    fragments: vec![text],
                    timer: spawn_timer(Arc::clone(&self.inner), key.clone()),
                };
                batches.insert(key, batch);
            }
        }
    }

    /// Abandons every pending batch of a session; their timers never fire.
    /// Called when the session disconnects so stale replies are dropped.
    pub async fn cancel_session(&self, session_id: &str) {
        let mut batches = self.inner.batches.lock().await;
        batches.retain(|(sid, _), batch| {
            if sid == session_id {
                batch.timer.abort();
                false
            } else {
                true
            }
        });
    }

    /// Number of batches currently waiting. Test hook.
    pub async fn pending_count(&self) -> usize {
        self.inner.batches.lock().await.len()
    }

    fn send_composing(&self, session_id: &str, contact: &str) {
        let Some(socket) = self.inner.registry.socket(session_id) else {
            return;
        };
        let contact = contact.to_string();
        tokio::spawn(async move {
            let _ = socket.send_presence(&contact, Presence::Composing).await;
        });
    }
}

fn spawn_timer(inner: Arc<DebouncerInner>, key: BatchKey) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(inner.quiet_period).await;

        // Snapshot-and-clear under the lock; fragments arriving after this
        // point open a fresh batch.
        let taken = {
            let mut batches = inner.batches.lock().await;
            batches.remove(&key)
        };

        if let Some(batch) = taken {
            let joined = batch.fragments.join(" ");
            debug!(
                session_id = %key.0,
                contact = %key.1,
                fragments = batch.fragments.len(),
                "debounce batch flushed"
            );
            inner
                .consumer
                .flush(&key.0, &batch.tenant_id, &key.1, joined)
                .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;
    use zapline_core::ProtocolSocket;

    struct NullRegistry;

    impl SocketRegistry for NullRegistry {
        fn socket(&self, _session_id: &str) -> Option<Arc<dyn ProtocolSocket>> {
            None
        }
    }

    struct Collecting {
        flushes: Mutex<Vec<(String, String, String)>>,
        notify: Notify,
        /// When set, the first flush stalls until released — used to drive a
        /// fragment arriving mid-flush.
        hold: Option<Arc<Notify>>,
    }

    impl Collecting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                flushes: Mutex::new(Vec::new()),
                notify: Notify::new(),
                hold: None,
            })
        }

        fn with_hold(hold: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                flushes: Mutex::new(Vec::new()),
                notify: Notify::new(),
                hold: Some(hold),
            })
        }

        async fn flushes(&self) -> Vec<(String, String, String)> {
            self.flushes.lock().await.clone()
        }

        async fn wait_for_flush(&self, count: usize) {
            loop {
                let notified = self.notify.notified();
                if self.flushes.lock().await.len() >= count {
                    return;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl BatchConsumer for Collecting {
        async fn flush(&self, session_id: &str, _tenant_id: &str, contact: &str, text: String) {
            let first = self.flushes.lock().await.is_empty();
            if first && let Some(hold) = &self.hold {
                hold.notified().await;
            }
            self.flushes
                .lock()
                .await
                .push((session_id.to_string(), contact.to_string(), text));
            self.notify.notify_one();
        }
    }

    fn debouncer(consumer: Arc<Collecting>) -> ContactDebouncer {
        ContactDebouncer::new(Duration::from_secs(10), consumer, Arc::new(NullRegistry))
    }

    #[tokio::test(start_paused = true)]
    async fn fragments_within_quiet_period_flush_once_space_joined() {
        let consumer = Collecting::new();
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "Oi".into()).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        debouncer
            .on_fragment("s1", "t1", "c1", "tudo bem?".into())
            .await;

        consumer.wait_for_flush(1).await;
        let flushes = consumer.flushes().await;
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].2, "Oi tudo bem?");

        // Nothing else fires later.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(consumer.flushes().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_fragment_resets_the_timer() {
        let consumer = Collecting::new();
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "um".into()).await;
        for text in ["dois", "três"] {
            tokio::time::advance(Duration::from_secs(8)).await;
            debouncer.on_fragment("s1", "t1", "c1", text.into()).await;
        }
        // 16 seconds elapsed, but never 10 quiet ones: still pending.
        assert_eq!(consumer.flushes().await.len(), 0);

        consumer.wait_for_flush(1).await;
        assert_eq!(consumer.flushes().await[0].2, "um dois três");
    }

    #[tokio::test(start_paused = true)]
    async fn fragment_after_flush_starts_new_batch() {
        let consumer = Collecting::new();
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "primeiro".into()).await;
        consumer.wait_for_flush(1).await;

        debouncer.on_fragment("s1", "t1", "c1", "segundo".into()).await;
        consumer.wait_for_flush(2).await;

        let flushes = consumer.flushes().await;
        assert_eq!(flushes[0].2, "primeiro");
        assert_eq!(flushes[1].2, "segundo");
    }

    #[tokio::test(start_paused = true)]
    async fn fragment_arriving_mid_flush_is_not_lost_or_doubled() {
        let hold = Arc::new(Notify::new());
        let consumer = Collecting::with_hold(hold.clone());
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "primeiro".into()).await;
        // Let the timer fire; the flush now stalls inside the consumer with
        // the batch already removed from the map.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(debouncer.pending_count().await, 0);

        // Mid-flush arrival opens a brand-new batch.
        debouncer.on_fragment("s1", "t1", "c1", "segundo".into()).await;
        assert_eq!(debouncer.pending_count().await, 1);

        hold.notify_one();
        consumer.wait_for_flush(2).await;

        let flushes = consumer.flushes().await;
        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].2, "primeiro");
        assert_eq!(flushes[1].2, "segundo");
    }

    #[tokio::test(start_paused = true)]
    async fn contacts_debounce_independently() {
        let consumer = Collecting::new();
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "para c1".into()).await;
        debouncer.on_fragment("s1", "t1", "c2", "para c2".into()).await;
        debouncer.on_fragment("s2", "t2", "c1", "outra sessão".into()).await;

        consumer.wait_for_flush(3).await;
        let mut texts: Vec<_> = consumer
            .flushes()
            .await
            .into_iter()
            .map(|(_, _, text)| text)
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["outra sessão", "para c1", "para c2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_session_abandons_pending_batches() {
        let consumer = Collecting::new();
        let debouncer = debouncer(consumer.clone());

        debouncer.on_fragment("s1", "t1", "c1", "nunca enviado".into()).await;
        debouncer.on_fragment("s2", "t2", "c1", "sobrevive".into()).await;
        debouncer.cancel_session("s1").await;

        consumer.wait_for_flush(1).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        let flushes = consumer.flushes().await;
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].2, "sobrevive");
    }
}
