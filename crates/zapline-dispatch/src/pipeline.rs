// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch pipeline: debounce -> gates -> reply chain -> outbound.
//!
//! Implements [`InboundHandler`] for the session manager. Text fragments go
//! through the per-contact debouncer; media is pre-processed (transcription,
//! description) on a spawned task first so provider latency never blocks the
//! session's event handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use zapline_core::types::{
    BotProfile, Exchange, InboundEnvelope, MessageDirection, MessageKind, MessageRecord,
    MessageStatus, Presence,
};
use zapline_core::{InboundHandler, RecordStore, SocketRegistry};

use crate::chain::ReplyChain;
use crate::context::ConversationCache;
use crate::debounce::{BatchConsumer, ContactDebouncer};
use crate::gates::{self, HoursGate, UsageGate};
use crate::outbound::OutboundSender;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub quiet_period: Duration,
    pub context_window: usize,
    pub context_ttl: Duration,
    /// Minimum spacing between out-of-hours canned replies per contact.
    pub greeting_cooldown: Duration,
    pub closed_message_template: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(10),
            context_window: 6,
            context_ttl: Duration::from_secs(1_800),
            greeting_cooldown: Duration::from_secs(21_600),
            closed_message_template:
                "Olá! Estamos fechados no momento. Nosso horário de hoje: {hours}.".to_string(),
        }
    }
}

impl From<&zapline_config::model::DispatchConfig> for DispatchSettings {
    fn from(config: &zapline_config::model::DispatchConfig) -> Self {
        Self {
            quiet_period: Duration::from_secs(config.quiet_period_secs),
            context_window: config.context_window,
            context_ttl: Duration::from_secs(config.context_ttl_secs),
            greeting_cooldown: Duration::from_secs(config.greeting_cooldown_secs),
            closed_message_template: config.closed_message_template.clone(),
        }
    }
}

struct PipelineInner {
    store: Arc<dyn RecordStore>,
    registry: Arc<dyn SocketRegistry>,
    chain: ReplyChain,
    outbound: OutboundSender,
    cache: ConversationCache,
    /// Last out-of-hours reply per (session, contact).
    greetings: Mutex<HashMap<(String, String), Instant>>,
    settings: DispatchSettings,
}

/// Entry point for inbound traffic. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<PipelineInner>,
    debouncer: ContactDebouncer,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<dyn SocketRegistry>,
        chain: ReplyChain,
        settings: DispatchSettings,
    ) -> Self {
        let inner = Arc::new(PipelineInner {
            store: Arc::clone(&store),
            registry: Arc::clone(&registry),
            chain,
            outbound: OutboundSender::new(Arc::clone(&registry), store),
            cache: ConversationCache::new(settings.context_window, settings.context_ttl),
            greetings: Mutex::new(HashMap::new()),
            settings: settings.clone(),
        });
        let debouncer = ContactDebouncer::new(
            settings.quiet_period,
            Arc::clone(&inner) as Arc<dyn BatchConsumer>,
            registry,
        );
        Self { inner, debouncer }
    }

    /// Sends a one-off operator message, outside the automated reply path.
    pub async fn send_manual(
        &self,
        session_id: &str,
        contact: &str,
        text: &str,
    ) -> Result<MessageRecord, zapline_core::ZaplineError> {
        self.inner
            .outbound
            .send_reply(session_id, contact, text, false)
            .await
    }
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn on_inbound(&self, session_id: &str, tenant_id: &str, envelope: InboundEnvelope) {
        match envelope.kind {
            MessageKind::Text => {
                let Some(text) = envelope.text.filter(|t| !t.trim().is_empty()) else {
                    return;
                };
                self.debouncer
                    .on_fragment(session_id, tenant_id, &envelope.from, text)
                    .await;
            }
            MessageKind::Audio | MessageKind::Image | MessageKind::Document => {
                // Pre-processing calls a provider; keep it off the session
                // actor's event path.
                let inner = Arc::clone(&self.inner);
                let debouncer = self.debouncer.clone();
                let session_id = session_id.to_string();
                let tenant_id = tenant_id.to_string();
                tokio::spawn(async move {
                    match inner.chain.preprocess(&envelope).await {
                        Ok(text) if !text.trim().is_empty() => {
                            debouncer
                                .on_fragment(&session_id, &tenant_id, &envelope.from, text)
                                .await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                session_id = %session_id,
                                kind = %envelope.kind,
                                error = %e,
                                "media pre-processing failed, message skipped"
                            );
                        }
                    }
                });
            }
        }
    }

    async fn on_session_down(&self, session_id: &str) {
        self.debouncer.cancel_session(session_id).await;
        self.inner.cache.clear_session(session_id).await;
        let mut greetings = self.inner.greetings.lock().await;
        greetings.retain(|(sid, _), _| sid != session_id);
    }
}

#[async_trait]
impl BatchConsumer for PipelineInner {
    async fn flush(&self, session_id: &str, tenant_id: &str, contact: &str, text: String) {
        self.handle_batch(session_id, tenant_id, contact, text).await;
    }
}

impl PipelineInner {
    async fn handle_batch(&self, session_id: &str, tenant_id: &str, contact: &str, text: String) {
        // The session may have dropped while the batch was waiting; a stale
        // reply is dropped, never queued.
        let Some(socket) = self.registry.socket(session_id) else {
            debug!(session_id, contact, "session gone, dropping debounced batch");
            return;
        };

        let session = match self.store.get_session(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(session_id, "session record missing, dropping batch");
                return;
            }
            Err(e) => {
                warn!(session_id, error = %e, "session lookup failed, dropping batch");
                return;
            }
        };
        let profile = match self.store.get_profile(session_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => BotProfile::default(),
            Err(e) => {
                warn!(session_id, error = %e, "profile lookup failed, using defaults");
                BotProfile::default()
            }
        };

        // Business-hours gate: out of hours gets the canned closed message,
        // never the AI chain.
        let now = chrono::Local::now().naive_local();
        if gates::check_business_hours(profile.schedule.as_ref(), now) == HoursGate::OutOfHours {
            self.maybe_send_closed_message(session_id, contact, &profile).await;
            return;
        }

        // Usage gate: silent drop, the session stays connected.
        let month = chrono::Utc::now().format("%Y-%m").to_string();
        let used = match self.store.get_usage(tenant_id, &month).await {
            Ok(used) => used,
            Err(e) => {
                warn!(tenant_id, error = %e, "usage lookup failed, dropping batch");
                return;
            }
        };
        let plan = match self.store.get_plan(tenant_id).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(tenant_id, error = %e, "plan lookup failed, dropping batch");
                return;
            }
        };
        if gates::check_usage(used, &plan) == UsageGate::LimitExceeded {
            info!(
                tenant_id,
                session_id, used, "usage limit reached, auto-reply suppressed"
            );
            return;
        }

        let history = self.cache.history(session_id, contact).await;
        let reply = self.chain.respond(&profile, &history, &text).await;
        self.cache
            .push(
                session_id,
                contact,
                Exchange {
                    user: text,
                    assistant: reply.clone(),
                },
            )
            .await;

        // Composing stops right before the reply goes out.
        let _ = socket.send_presence(contact, Presence::Paused).await;

        if session.human_handover {
            self.store_for_review(session_id, contact, &reply).await;
            return;
        }

        match self
            .outbound
            .send_reply(session_id, contact, &reply, true)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.store.increment_usage(tenant_id, &month).await {
                    warn!(tenant_id, error = %e, "usage increment failed");
                }
            }
            Err(e) => {
                warn!(session_id, contact, error = %e, "reply delivery failed");
            }
        }
    }

    /// Human handover: the reply is computed and stored for manual review,
    /// not delivered.
    async fn store_for_review(&self, session_id: &str, contact: &str, reply: &str) {
        info!(session_id, contact, "human handover active, reply held for review");
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            contact_id: contact.to_string(),
            direction: MessageDirection::Outbound,
            kind: MessageKind::Text,
            content: reply.to_string(),
            ai_response: Some(reply.to_string()),
            status: MessageStatus::Pending,
            protocol_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.store.insert_message(&record).await {
            warn!(session_id, error = %e, "handover reply persist failed");
        }
    }

    async fn maybe_send_closed_message(
        &self,
        session_id: &str,
        contact: &str,
        profile: &BotProfile,
    ) {
        let key = (session_id.to_string(), contact.to_string());
        {
            let mut greetings = self.greetings.lock().await;
            if let Some(last) = greetings.get(&key)
                && last.elapsed() < self.settings.greeting_cooldown
            {
                debug!(session_id, contact, "closed message recently sent, suppressed");
                return;
            }
            greetings.insert(key, Instant::now());
        }

        let now = chrono::Local::now().naive_local();
        let message = gates::closed_message(
            &self.settings.closed_message_template,
            profile.schedule.as_ref(),
            now,
        );
        if let Some(socket) = self.registry.socket(session_id) {
            let _ = socket.send_presence(contact, Presence::Paused).await;
        }
        if let Err(e) = self
            .outbound
            .send_reply(session_id, contact, &message, false)
            .await
        {
            warn!(session_id, contact, error = %e, "closed message delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;
    use zapline_core::types::{
        DayWindow, PlanLimits, SessionRecord, SessionStatus, WeeklySchedule,
    };
    use zapline_core::{ProtocolSocket, SocketDriver};
    use zapline_storage::SqliteStore;
    use zapline_test_utils::{eventually, MockDriver, MockSocket, MockTextProvider};

    struct FixedRegistry {
        sockets: StdMutex<HashMap<String, Arc<dyn ProtocolSocket>>>,
    }

    impl FixedRegistry {
        fn new() -> Self {
            Self {
                sockets: StdMutex::new(HashMap::new()),
            }
        }

        fn insert(&self, session_id: &str, socket: Arc<dyn ProtocolSocket>) {
            self.sockets
                .lock()
                .unwrap()
                .insert(session_id.to_string(), socket);
        }

        fn remove(&self, session_id: &str) {
            self.sockets.lock().unwrap().remove(session_id);
        }
    }

    impl SocketRegistry for FixedRegistry {
        fn socket(&self, session_id: &str) -> Option<Arc<dyn ProtocolSocket>> {
            self.sockets.lock().unwrap().get(session_id).cloned()
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        store: Arc<SqliteStore>,
        registry: Arc<FixedRegistry>,
        primary: Arc<MockTextProvider>,
        secondary: Arc<MockTextProvider>,
        socket: Arc<MockSocket>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(settings: DispatchSettings) -> Fixture {
        let dir = tempdir().unwrap();
        let config = zapline_config::model::StorageConfig {
            database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            credentials_dir: "unused".to_string(),
        };
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let registry = Arc::new(FixedRegistry::new());
        let driver = MockDriver::new();
        let handle = driver.open("s1", None).await.unwrap();
        registry.insert("s1", handle.socket);
        let socket = driver.last_socket().await.unwrap();

        let primary = Arc::new(MockTextProvider::new("primary", "Olá! Como posso ajudar?"));
        let secondary = Arc::new(MockTextProvider::new("secondary", "resposta reserva"));
        let chain = ReplyChain::new(
            primary.clone(),
            Some(secondary.clone()),
            None,
            None,
            "fallback fixo".to_string(),
        );
        let dispatcher = Dispatcher::new(store.clone(), registry.clone(), chain, settings);

        let now = "2026-08-01T00:00:00.000Z".to_string();
        let session = SessionRecord {
            id: "s1".to_string(),
            tenant_id: "t1".to_string(),
            status: SessionStatus::Connected,
            display_phone_number: Some("5511999990000".to_string()),
            qr_code: None,
            pairing_code: None,
            last_connected_at: Some(now.clone()),
            reconnect_attempts: 0,
            human_handover: false,
            created_at: now.clone(),
            updated_at: now,
        };
        store.create_session(&session).await.unwrap();

        Fixture {
            dispatcher,
            store,
            registry,
            primary,
            secondary,
            socket,
            _dir: dir,
        }
    }

    fn short_settings() -> DispatchSettings {
        DispatchSettings {
            quiet_period: Duration::from_secs(10),
            ..DispatchSettings::default()
        }
    }

    fn envelope(text: &str) -> InboundEnvelope {
        InboundEnvelope {
            protocol_id: format!("in-{text}"),
            from: "5511988887777".to_string(),
            sender_name: Some("Maria".to_string()),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            media: None,
            timestamp: "2026-08-01T12:00:00Z".to_string(),
        }
    }

    fn always_closed_schedule() -> WeeklySchedule {
        // An empty window (open == close) is closed all day, every day.
        let noon = chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        WeeklySchedule {
            days: [Some(DayWindow {
                open: noon,
                close: noon,
            }); 7],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_fragments_get_one_coherent_reply() {
        let fx = fixture(short_settings()).await;

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        fx.dispatcher
            .on_inbound("s1", "t1", envelope("tudo bem?"))
            .await;

        assert!(eventually(|| async { fx.socket.sent_count().await == 1 }).await);

        // One AI dispatch, fed the space-joined batch.
        assert_eq!(fx.primary.call_count().await, 1);
        assert_eq!(fx.primary.prompts().await[0].user, "Oi tudo bem?");

        let sent = fx.socket.sent().await;
        assert_eq!(sent[0].0, "5511988887777");
        assert_eq!(sent[0].1, "Olá! Como posso ajudar?");

        // Outbound record persisted, usage counted.
        assert!(
            eventually(|| async {
                let messages = fx.store.get_messages("s1", None).await.unwrap();
                messages
                    .iter()
                    .any(|m| m.direction == MessageDirection::Outbound && m.ai_response.is_some())
            })
            .await
        );
        let month = chrono::Utc::now().format("%Y-%m").to_string();
        assert!(
            eventually(|| async { fx.store.get_usage("t1", &month).await.unwrap() == 1 }).await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn composing_presence_wraps_the_reply() {
        let fx = fixture(short_settings()).await;

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        assert!(eventually(|| async { fx.socket.sent_count().await == 1 }).await);

        let signals = fx.socket.presence_signals().await;
        assert_eq!(signals.first().map(|(_, p)| *p), Some(Presence::Composing));
        assert_eq!(signals.last().map(|(_, p)| *p), Some(Presence::Paused));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_hours_sends_canned_message_without_ai() {
        let fx = fixture(short_settings()).await;
        let profile = BotProfile {
            schedule: Some(always_closed_schedule()),
            ..BotProfile::default()
        };
        fx.store.set_profile("s1", &profile).await.unwrap();

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        assert!(eventually(|| async { fx.socket.sent_count().await == 1 }).await);

        assert_eq!(fx.primary.call_count().await, 0);
        let sent = fx.socket.sent().await;
        assert!(sent[0].1.contains("fechados"), "got: {}", sent[0].1);

        // The canned reply is throttled per contact.
        fx.dispatcher.on_inbound("s1", "t1", envelope("alô?")).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.socket.sent_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn usage_limit_silently_drops_the_reply() {
        let fx = fixture(short_settings()).await;
        fx.store
            .set_plan(
                "t1",
                PlanLimits {
                    monthly_reply_limit: Some(1),
                },
            )
            .await
            .unwrap();
        let month = chrono::Utc::now().format("%Y-%m").to_string();
        fx.store.increment_usage("t1", &month).await.unwrap();

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(fx.primary.call_count().await, 0);
        assert_eq!(fx.socket.sent_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn human_handover_stores_reply_without_sending() {
        let fx = fixture(short_settings()).await;
        let mut session = fx.store.get_session("s1").await.unwrap().unwrap();
        session.human_handover = true;
        fx.store.update_session(&session).await.unwrap();

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;

        assert!(
            eventually(|| async {
                let messages = fx.store.get_messages("s1", None).await.unwrap();
                messages
                    .iter()
                    .any(|m| m.status == MessageStatus::Pending && m.ai_response.is_some())
            })
            .await
        );
        assert_eq!(fx.primary.call_count().await, 1);
        assert_eq!(fx.socket.sent_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_fallback_reaches_the_contact() {
        let fx = fixture(short_settings()).await;
        fx.primary.set_fail(true);

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        assert!(eventually(|| async { fx.socket.sent_count().await == 1 }).await);

        assert_eq!(fx.socket.sent().await[0].1, "resposta reserva");
        assert_eq!(fx.secondary.call_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_down_drops_pending_batch() {
        let fx = fixture(short_settings()).await;

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        fx.dispatcher.on_session_down("s1").await;
        fx.registry.remove("s1");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.primary.call_count().await, 0);
        assert_eq!(fx.socket.sent_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_context_carries_across_batches() {
        let fx = fixture(short_settings()).await;

        fx.dispatcher.on_inbound("s1", "t1", envelope("Oi")).await;
        assert!(eventually(|| async { fx.socket.sent_count().await == 1 }).await);

        fx.dispatcher
            .on_inbound("s1", "t1", envelope("qual o horário?"))
            .await;
        assert!(eventually(|| async { fx.socket.sent_count().await == 2 }).await);

        let prompts = fx.primary.prompts().await;
        assert_eq!(prompts[1].history.len(), 1);
        assert_eq!(prompts[1].history[0].user, "Oi");
    }
}
