// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session manager: owns the map of live session actors.
//!
//! One actor per session id, spawned on `create_or_restore` and torn down on
//! explicit disconnect or shutdown. The manager also implements
//! [`SocketRegistry`] so the dispatch pipeline and broadcast workers can
//! reach the live socket of a connected session.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use zapline_core::types::{SessionRecord, SessionStatus};
use zapline_core::{
    CredentialStore, EventSink, GatewayEvent, InboundHandler, ProtocolSocket, RecordStore,
    SocketDriver, SocketRegistry, ZaplineError,
};

use crate::actor::{self, ActorContext, SessionCommand};
use crate::pairing;

/// Tunables for reconnect backoff and pairing codes.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_reconnect_attempts: u32,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub pairing_code_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base: Duration::from_secs(2),
            reconnect_max: Duration::from_secs(60),
            pairing_code_ttl: Duration::from_secs(120),
        }
    }
}

impl From<&zapline_config::model::SessionConfig> for SessionSettings {
    fn from(config: &zapline_config::model::SessionConfig) -> Self {
        Self {
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
            pairing_code_ttl: Duration::from_secs(config.pairing_code_ttl_secs),
        }
    }
}

struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ManagerInner {
    driver: Arc<dyn SocketDriver>,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn RecordStore>,
    events: Arc<dyn EventSink>,
    handler: Arc<dyn InboundHandler>,
    settings: SessionSettings,
    handles: DashMap<String, SessionHandle>,
    sockets: Arc<DashMap<String, Arc<dyn ProtocolSocket>>>,
}

/// Owns every live session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        driver: Arc<dyn SocketDriver>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn RecordStore>,
        events: Arc<dyn EventSink>,
        handler: Arc<dyn InboundHandler>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                driver,
                credentials,
                store,
                events,
                handler,
                settings,
                handles: DashMap::new(),
                sockets: Arc::new(DashMap::new()),
            }),
        }
    }

    /// Starts a session, restoring stored credentials when present.
    ///
    /// Idempotent: calling it while the session's actor is live is a no-op.
    pub async fn create_or_restore(
        &self,
        session_id: &str,
        tenant_id: &str,
    ) -> Result<(), ZaplineError> {
        if let Some(handle) = self.inner.handles.get(session_id)
            && !handle.task.is_finished()
        {
            debug!(session_id, "session already live, restore is a no-op");
            return Ok(());
        }

        self.ensure_record(session_id, tenant_id).await?;

        let handle = self.spawn_actor(session_id, tenant_id);
        self.inner.handles.insert(session_id.to_string(), handle);
        Ok(())
    }

    /// Restores every non-terminal session that still has stored
    /// credentials. Called once at process startup; no operator action
    /// needed to bring previously connected tenants back online.
    pub async fn restore_all(&self) -> Result<usize, ZaplineError> {
        let sessions = self.inner.store.list_sessions(None).await?;
        let mut restored = 0;
        for session in sessions {
            if session.status.is_terminal() {
                continue;
            }
            if self.inner.credentials.load(&session.id).await.is_none() {
                continue;
            }
            self.create_or_restore(&session.id, &session.tenant_id)
                .await?;
            restored += 1;
        }
        if restored > 0 {
            info!(count = restored, "restored sessions from storage");
        }
        Ok(restored)
    }

    /// Explicit logout: terminal, wipes credentials, cancels any pending
    /// reconnect, and is never retried.
    pub async fn disconnect(&self, session_id: &str) -> Result<(), ZaplineError> {
        self.inner
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| ZaplineError::Validation(format!("unknown session {session_id}")))?;

        if let Some((_, handle)) = self.inner.handles.remove(session_id) {
            handle.cancel.cancel();
            let _ = handle.task.await;
        }
        self.inner.sockets.remove(session_id);

        self.inner.credentials.delete(session_id).await?;

        if let Some(mut record) = self.inner.store.get_session(session_id).await? {
            record.status = SessionStatus::LoggedOut;
            record.qr_code = None;
            record.pairing_code = None;
            record.reconnect_attempts = 0;
            self.inner.store.update_session(&record).await?;
        }

        self.inner
            .events
            .emit(GatewayEvent::SessionDisconnected {
                session_id: session_id.to_string(),
            })
            .await;
        self.inner.handler.on_session_down(session_id).await;

        info!(session_id, "session logged out");
        Ok(())
    }

    /// Re-requests a QR/pairing code on an already-connecting socket.
    pub async fn refresh_code(&self, session_id: &str) -> Result<(), ZaplineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, SessionCommand::RefreshCode { reply })
            .await?;
        rx.await
            .map_err(|_| ZaplineError::Internal("session actor dropped refresh reply".into()))?
    }

    /// Requests a pairing code for phone-number device linking. Rejected
    /// synchronously on malformed numbers and while connected.
    pub async fn request_pairing_code(
        &self,
        session_id: &str,
        phone_number: &str,
    ) -> Result<String, ZaplineError> {
        let digits = pairing::sanitize_phone_number(phone_number)?;
        let (reply, rx) = oneshot::channel();
        self.send_command(
            session_id,
            SessionCommand::RequestPairingCode {
                phone_number: digits,
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| ZaplineError::Internal("session actor dropped pairing reply".into()))?
    }

    /// Cancels every actor without touching credentials, so sessions restore
    /// on the next start.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self
            .inner
            .handles
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            if let Some((_, handle)) = self.inner.handles.remove(&id) {
                handle.cancel.cancel();
                let _ = handle.task.await;
            }
        }
        self.inner.sockets.clear();
        info!("session manager shut down");
    }

    async fn send_command(
        &self,
        session_id: &str,
        command: SessionCommand,
    ) -> Result<(), ZaplineError> {
        let commands = self
            .inner
            .handles
            .get(session_id)
            .filter(|handle| !handle.task.is_finished())
            .map(|handle| handle.commands.clone())
            .ok_or_else(|| {
                ZaplineError::Validation(format!("session {session_id} is not connecting"))
            })?;
        commands.send(command).await.map_err(|_| {
            ZaplineError::Validation(format!("session {session_id} is not connecting"))
        })
    }

    async fn ensure_record(
        &self,
        session_id: &str,
        tenant_id: &str,
    ) -> Result<(), ZaplineError> {
        match self.inner.store.get_session(session_id).await? {
            Some(mut record) => {
                if record.tenant_id != tenant_id {
                    return Err(ZaplineError::Validation(format!(
                        "session {session_id} belongs to another tenant"
                    )));
                }
                if record.status == SessionStatus::LoggedOut {
                    // Fresh handshake after an explicit logout.
                    record.status = SessionStatus::Disconnected;
                    record.reconnect_attempts = 0;
                    self.inner.store.update_session(&record).await?;
                }
                Ok(())
            }
            None => {
                let now = chrono::Utc::now().to_rfc3339();
                let record = SessionRecord {
                    id: session_id.to_string(),
                    tenant_id: tenant_id.to_string(),
                    status: SessionStatus::Disconnected,
                    display_phone_number: None,
                    qr_code: None,
                    pairing_code: None,
                    last_connected_at: None,
                    reconnect_attempts: 0,
                    human_handover: false,
                    created_at: now.clone(),
                    updated_at: now,
                };
                self.inner.store.create_session(&record).await
            }
        }
    }

    fn spawn_actor(&self, session_id: &str, tenant_id: &str) -> SessionHandle {
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let ctx = ActorContext {
            session_id: session_id.to_string(),
            tenant_id: tenant_id.to_string(),
            driver: Arc::clone(&self.inner.driver),
            credentials: Arc::clone(&self.inner.credentials),
            store: Arc::clone(&self.inner.store),
            events: Arc::clone(&self.inner.events),
            handler: Arc::clone(&self.inner.handler),
            sockets: Arc::clone(&self.inner.sockets),
            settings: self.inner.settings.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(actor::run(ctx, commands_rx));
        SessionHandle {
            commands: commands_tx,
            cancel,
            task,
        }
    }
}

impl SocketRegistry for SessionManager {
    fn socket(&self, session_id: &str) -> Option<Arc<dyn ProtocolSocket>> {
        self.inner
            .sockets
            .get(session_id)
            .map(|socket| Arc::clone(&socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zapline_core::types::{
        CloseReason, Credentials, InboundEnvelope, MessageDirection, MessageKind, MessageRecord,
        MessageStatus, SocketEvent,
    };
    use zapline_storage::SqliteStore;
    use zapline_test_utils::{
        eventually, CollectingSink, MemoryCredentialStore, MockDriver, RecordingHandler,
    };

    struct Fixture {
        manager: SessionManager,
        driver: Arc<MockDriver>,
        credentials: Arc<MemoryCredentialStore>,
        store: Arc<SqliteStore>,
        sink: Arc<CollectingSink>,
        handler: Arc<RecordingHandler>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(settings: SessionSettings) -> Fixture {
        let dir = tempdir().unwrap();
        let config = zapline_config::model::StorageConfig {
            database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            credentials_dir: "unused".to_string(),
        };
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());
        let driver = Arc::new(MockDriver::new());
        let credentials = Arc::new(MemoryCredentialStore::new());
        let sink = Arc::new(CollectingSink::new());
        let handler = Arc::new(RecordingHandler::new());
        let manager = SessionManager::new(
            driver.clone(),
            credentials.clone(),
            store.clone(),
            sink.clone(),
            handler.clone(),
            settings,
        );
        Fixture {
            manager,
            driver,
            credentials,
            store,
            sink,
            handler,
            _dir: dir,
        }
    }

    fn envelope(from: &str, text: &str) -> InboundEnvelope {
        InboundEnvelope {
            protocol_id: format!("in-{text}"),
            from: from.to_string(),
            sender_name: Some("Maria".to_string()),
            kind: MessageKind::Text,
            text: Some(text.to_string()),
            media: None,
            timestamp: "2026-08-01T12:00:00Z".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn qr_flow_reaches_connected_and_clears_codes() {
        let fx = fixture(SessionSettings::default()).await;
        fx.driver
            .push_script(vec![SocketEvent::Qr {
                code: "qr-payload-1".into(),
            }])
            .await;

        fx.manager.create_or_restore("s1", "t1").await.unwrap();

        fx.sink
            .wait_for(|e| matches!(e, GatewayEvent::QrCode { .. }))
            .await;
        let record = fx.store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::QrReady);
        assert_eq!(record.qr_code.as_deref(), Some("qr-payload-1"));

        fx.driver
            .inject(
                "s1",
                SocketEvent::ConnectionOpen {
                    phone_number: "5511999990000".into(),
                },
            )
            .await;
        fx.sink
            .wait_for(|e| matches!(e, GatewayEvent::SessionConnected { .. }))
            .await;

        let record = fx.store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Connected);
        assert!(record.qr_code.is_none());
        assert!(record.pairing_code.is_none());
        assert_eq!(record.display_phone_number.as_deref(), Some("5511999990000"));
        assert_eq!(record.reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_with_credentials_skips_qr_and_attaches_handler_once() {
        let fx = fixture(SessionSettings::default()).await;
        fx.credentials
            .save("s1", &Credentials(serde_json::json!({"noise_key": "k"})))
            .await
            .unwrap();
        fx.driver
            .push_script(vec![SocketEvent::ConnectionOpen {
                phone_number: "5511999990000".into(),
            }])
            .await;

        // Simulate a previously connected session row surviving restart.
        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        assert!(eventually(|| async { fx.driver.open_count() == 1 }).await);
        fx.manager.shutdown().await;
        fx.driver
            .push_script(vec![SocketEvent::ConnectionOpen {
                phone_number: "5511999990000".into(),
            }])
            .await;

        let restored = fx.manager.restore_all().await.unwrap();
        assert_eq!(restored, 1);

        assert!(eventually(|| async { fx.driver.open_count() == 2 }).await);
        assert!(
            eventually(|| async {
                fx.store.get_session("s1").await.unwrap().unwrap().status
                    == SessionStatus::Connected
            })
            .await
        );

        // Every open used stored credentials; no QR event was published.
        assert!(fx.driver.opens_with_credentials().await.iter().all(|c| *c));
        let events = fx.sink.events().await;
        assert!(!events.iter().any(|e| matches!(e, GatewayEvent::QrCode { .. })));

        // Exactly one inbound handler fires per message.
        fx.driver
            .inject("s1", SocketEvent::MessageReceived(envelope("5511988887777", "Oi")))
            .await;
        assert!(eventually(|| async { fx.handler.inbound_count().await == 1 }).await);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.handler.inbound_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_close_reconnects_and_resets_counter() {
        let fx = fixture(SessionSettings::default()).await;
        fx.driver
            .push_script(vec![
                SocketEvent::ConnectionOpen {
                    phone_number: "5511999990000".into(),
                },
                SocketEvent::ConnectionClose {
                    reason: CloseReason {
                        status_code: Some(500),
                        detail: "stream errored".into(),
                    },
                },
            ])
            .await;
        fx.driver
            .push_script(vec![SocketEvent::ConnectionOpen {
                phone_number: "5511999990000".into(),
            }])
            .await;

        fx.manager.create_or_restore("s1", "t1").await.unwrap();

        assert!(
            eventually(|| async { fx.driver.open_count() == 2 }).await,
            "expected a reconnect after transient close"
        );
        assert!(
            eventually(|| async {
                let record = fx.store.get_session("s1").await.unwrap().unwrap();
                record.status == SessionStatus::Connected && record.reconnect_attempts == 0
            })
            .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn logged_out_close_wipes_credentials_and_never_retries() {
        let fx = fixture(SessionSettings::default()).await;
        fx.credentials
            .save("s1", &Credentials(serde_json::json!({"noise_key": "k"})))
            .await
            .unwrap();
        fx.driver
            .push_script(vec![
                SocketEvent::ConnectionOpen {
                    phone_number: "5511999990000".into(),
                },
                SocketEvent::ConnectionClose {
                    reason: CloseReason {
                        status_code: Some(401),
                        detail: "logged out".into(),
                    },
                },
            ])
            .await;

        fx.manager.create_or_restore("s1", "t1").await.unwrap();

        assert!(
            eventually(|| async {
                fx.store.get_session("s1").await.unwrap().unwrap().status
                    == SessionStatus::LoggedOut
            })
            .await
        );
        assert!(fx.credentials.load("s1").await.is_none());

        // No reconnect however long we wait.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fx.driver.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_attempts_never_exceed_cap() {
        let settings = SessionSettings {
            max_reconnect_attempts: 3,
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(4),
            ..SessionSettings::default()
        };
        let fx = fixture(settings).await;
        fx.driver.fail_next_opens(100);

        fx.manager.create_or_restore("s1", "t1").await.unwrap();

        let event = fx
            .sink
            .wait_for(|e| matches!(e, GatewayEvent::ReconnectExhausted { .. }))
            .await;
        let GatewayEvent::ReconnectExhausted { attempts, .. } = event else {
            unreachable!()
        };
        assert_eq!(attempts, 3);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fx.driver.open_count(), 3, "attempts must never exceed cap");
        let record = fx.store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Disconnected);
        assert_eq!(record.reconnect_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let settings = SessionSettings {
            max_reconnect_attempts: 50,
            reconnect_base: Duration::from_secs(3600),
            reconnect_max: Duration::from_secs(3600),
            ..SessionSettings::default()
        };
        let fx = fixture(settings).await;
        fx.credentials
            .save("s1", &Credentials(serde_json::json!({"noise_key": "k"})))
            .await
            .unwrap();
        fx.driver.fail_next_opens(100);

        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        assert!(eventually(|| async { fx.driver.open_count() >= 1 }).await);

        // The actor now sits in a long backoff sleep; disconnect must cancel it.
        let opens_before = fx.driver.open_count();
        fx.manager.disconnect("s1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(7_200)).await;
        assert_eq!(fx.driver.open_count(), opens_before);
        assert!(fx.credentials.load("s1").await.is_none());
        let record = fx.store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::LoggedOut);
        assert!(fx.handler.downs().await.contains(&"s1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn create_or_restore_is_idempotent_while_live() {
        let fx = fixture(SessionSettings::default()).await;
        fx.driver
            .push_script(vec![SocketEvent::ConnectionOpen {
                phone_number: "5511999990000".into(),
            }])
            .await;

        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        assert!(eventually(|| async { fx.driver.open_count() == 1 }).await);

        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.driver.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_code_round_trip_and_expiry() {
        let settings = SessionSettings {
            pairing_code_ttl: Duration::from_secs(120),
            ..SessionSettings::default()
        };
        let fx = fixture(settings).await;
        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        assert!(eventually(|| async { fx.driver.open_count() == 1 }).await);

        let err = fx
            .manager
            .request_pairing_code("s1", "+55 11")
            .await
            .unwrap_err();
        assert!(matches!(err, ZaplineError::Validation(_)));

        let code = fx
            .manager
            .request_pairing_code("s1", "+55 (11) 98888-7777")
            .await
            .unwrap();
        assert!(!code.is_empty());
        let socket = fx.driver.last_socket().await.unwrap();
        assert_eq!(socket.pairing_requests().await, vec!["5511988887777"]);

        let record = fx.store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Pairing);
        assert_eq!(record.pairing_code.as_deref(), Some(code.as_str()));

        // Unused code expires back to connecting.
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(
            eventually(|| async {
                let record = fx.store.get_session("s1").await.unwrap().unwrap();
                record.pairing_code.is_none() && record.status == SessionStatus::Connecting
            })
            .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_receipts_update_message_status() {
        let fx = fixture(SessionSettings::default()).await;
        fx.driver
            .push_script(vec![SocketEvent::ConnectionOpen {
                phone_number: "5511999990000".into(),
            }])
            .await;
        fx.manager.create_or_restore("s1", "t1").await.unwrap();
        fx.sink
            .wait_for(|e| matches!(e, GatewayEvent::SessionConnected { .. }))
            .await;

        let outbound = MessageRecord {
            id: "m-out".into(),
            session_id: "s1".into(),
            contact_id: "5511988887777".into(),
            direction: MessageDirection::Outbound,
            kind: MessageKind::Text,
            content: "Olá!".into(),
            ai_response: None,
            status: MessageStatus::Sent,
            protocol_id: Some("proto-7".into()),
            created_at: "2026-08-01T12:00:00Z".into(),
        };
        fx.store.insert_message(&outbound).await.unwrap();

        fx.driver
            .inject(
                "s1",
                SocketEvent::Receipt {
                    protocol_id: "proto-7".into(),
                    status: MessageStatus::Read,
                },
            )
            .await;

        assert!(
            eventually(|| async {
                fx.store.get_messages("s1", None).await.unwrap()[0].status == MessageStatus::Read
            })
            .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn credentials_updated_events_are_persisted() {
        let fx = fixture(SessionSettings::default()).await;
        fx.driver
            .push_script(vec![
                SocketEvent::ConnectionOpen {
                    phone_number: "5511999990000".into(),
                },
                SocketEvent::CredentialsUpdated(Credentials(
                    serde_json::json!({"noise_key": "rotated"}),
                )),
            ])
            .await;

        fx.manager.create_or_restore("s1", "t1").await.unwrap();

        assert!(
            eventually(|| async {
                matches!(
                    fx.credentials.load("s1").await,
                    Some(Credentials(v)) if v["noise_key"] == "rotated"
                )
            })
            .await
        );
    }
}
