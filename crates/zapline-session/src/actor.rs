// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session actor driving one protocol connection.
//!
//! Each session runs exactly one actor task. Connection-state and inbound
//! message events are handled strictly in arrival order inside the actor;
//! different sessions run on independent tasks. The actor owns the socket
//! handle, the reconnect loop, and all session-record writes.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zapline_core::types::{
    ContactRecord, GatewayEvent, InboundEnvelope, MessageDirection, MessageRecord, MessageStatus,
    SessionRecord, SessionStatus, SocketEvent,
};
use zapline_core::{
    CredentialStore, EventSink, InboundHandler, ProtocolSocket, RecordStore, SocketDriver,
    SocketHandle, ZaplineError,
};

use crate::backoff::reconnect_delay;
use crate::manager::SessionSettings;

/// Maximum time to wait for a best-effort logout during cancellation.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Operator requests routed into the actor.
pub(crate) enum SessionCommand {
    RefreshCode {
        reply: oneshot::Sender<Result<(), ZaplineError>>,
    },
    RequestPairingCode {
        phone_number: String,
        reply: oneshot::Sender<Result<String, ZaplineError>>,
    },
}

/// Everything an actor needs, cloned out of the manager at spawn time.
pub(crate) struct ActorContext {
    pub session_id: String,
    pub tenant_id: String,
    pub driver: Arc<dyn SocketDriver>,
    pub credentials: Arc<dyn CredentialStore>,
    pub store: Arc<dyn RecordStore>,
    pub events: Arc<dyn EventSink>,
    pub handler: Arc<dyn InboundHandler>,
    pub sockets: Arc<DashMap<String, Arc<dyn ProtocolSocket>>>,
    pub settings: SessionSettings,
    pub cancel: CancellationToken,
}

enum LoopOutcome {
    /// Logged out or banned: wipe credentials, never retry.
    Terminal,
    /// Network blip: schedule a reconnect.
    Transient,
    /// Cancelled by the manager (explicit disconnect or shutdown); the
    /// manager owns any further state changes.
    Cancelled,
}

pub(crate) async fn run(ctx: ActorContext, mut commands: mpsc::Receiver<SessionCommand>) {
    let mut attempts: u32 = 0;

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        update_record(&ctx, |record| {
            record.status = SessionStatus::Connecting;
            record.qr_code = None;
            record.pairing_code = None;
        })
        .await;

        let credentials = ctx.credentials.load(&ctx.session_id).await;
        debug!(
            session_id = %ctx.session_id,
            restored = credentials.is_some(),
            "opening protocol socket"
        );

        let handle = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = ctx.driver.open(&ctx.session_id, credentials) => match result {
                Ok(handle) => handle,
                Err(e) if matches!(e, ZaplineError::TerminalAuth { .. }) => {
                    warn!(session_id = %ctx.session_id, error = %e, "terminal auth failure on open");
                    finalize_logged_out(&ctx).await;
                    break;
                }
                Err(e) => {
                    warn!(session_id = %ctx.session_id, error = %e, "socket open failed");
                    attempts += 1;
                    if !schedule_reconnect(&ctx, attempts).await {
                        break;
                    }
                    continue;
                }
            }
        };

        ctx.sockets
            .insert(ctx.session_id.clone(), Arc::clone(&handle.socket));

        let outcome = connected_loop(&ctx, &mut commands, handle, &mut attempts).await;

        ctx.sockets.remove(&ctx.session_id);

        match outcome {
            LoopOutcome::Cancelled => break,
            LoopOutcome::Terminal => {
                finalize_logged_out(&ctx).await;
                break;
            }
            LoopOutcome::Transient => {
                update_record(&ctx, |record| {
                    record.status = SessionStatus::Disconnected;
                    record.qr_code = None;
                    record.pairing_code = None;
                })
                .await;
                ctx.events
                    .emit(GatewayEvent::SessionDisconnected {
                        session_id: ctx.session_id.clone(),
                    })
                    .await;
                ctx.handler.on_session_down(&ctx.session_id).await;

                attempts += 1;
                if !schedule_reconnect(&ctx, attempts).await {
                    break;
                }
            }
        }
    }

    debug!(session_id = %ctx.session_id, "session actor exited");
}

/// Records the failed attempt and sleeps the backoff delay.
///
/// Returns `false` when the actor must stop: either the attempt budget is
/// exhausted (the session stays permanently disconnected and a notification
/// event is emitted) or the sleep was cancelled.
async fn schedule_reconnect(ctx: &ActorContext, attempts: u32) -> bool {
    update_record(ctx, |record| {
        record.status = SessionStatus::Disconnected;
        record.reconnect_attempts = attempts;
    })
    .await;

    if attempts >= ctx.settings.max_reconnect_attempts {
        info!(
            session_id = %ctx.session_id,
            attempts,
            "reconnect attempts exhausted, giving up"
        );
        ctx.events
            .emit(GatewayEvent::ReconnectExhausted {
                session_id: ctx.session_id.clone(),
                attempts,
            })
            .await;
        return false;
    }

    let delay = reconnect_delay(
        attempts,
        ctx.settings.reconnect_base,
        ctx.settings.reconnect_max,
    );
    debug!(
        session_id = %ctx.session_id,
        attempts,
        delay_ms = delay.as_millis() as u64,
        "scheduling reconnect"
    );

    tokio::select! {
        _ = ctx.cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn connected_loop(
    ctx: &ActorContext,
    commands: &mut mpsc::Receiver<SessionCommand>,
    mut handle: SocketHandle,
    attempts: &mut u32,
) -> LoopOutcome {
    let socket = Arc::clone(&handle.socket);
    let mut pairing_guard: Option<CancellationToken> = None;

    let outcome = loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let _ = tokio::time::timeout(LOGOUT_TIMEOUT, socket.logout()).await;
                break LoopOutcome::Cancelled;
            }
            command = commands.recv() => match command {
                Some(command) => handle_command(ctx, &socket, command, &mut pairing_guard).await,
                // Manager dropped the sender: treat like cancellation.
                None => break LoopOutcome::Cancelled,
            },
            event = handle.events.recv() => match event {
                Some(event) => {
                    if let Some(outcome) =
                        handle_event(ctx, event, attempts, &mut pairing_guard).await
                    {
                        break outcome;
                    }
                }
                None => {
                    warn!(session_id = %ctx.session_id, "event stream ended without close");
                    break LoopOutcome::Transient;
                }
            }
        }
    };

    if let Some(guard) = pairing_guard.take() {
        guard.cancel();
    }
    outcome
}

async fn handle_command(
    ctx: &ActorContext,
    socket: &Arc<dyn ProtocolSocket>,
    command: SessionCommand,
    pairing_guard: &mut Option<CancellationToken>,
) {
    match command {
        SessionCommand::RefreshCode { reply } => {
            let result = if current_status(ctx).await == Some(SessionStatus::Connected) {
                Err(ZaplineError::Validation(
                    "session already connected, no code to refresh".into(),
                ))
            } else {
                socket.refresh_code().await
            };
            let _ = reply.send(result);
        }
        SessionCommand::RequestPairingCode {
            phone_number,
            reply,
        } => {
            if current_status(ctx).await == Some(SessionStatus::Connected) {
                let _ = reply.send(Err(ZaplineError::Validation(
                    "session already connected, pairing unavailable".into(),
                )));
                return;
            }
            match socket.request_pairing_code(&phone_number).await {
                Ok(code) => {
                    update_record(ctx, |record| {
                        record.pairing_code = Some(code.clone());
                        record.qr_code = None;
                        record.status = SessionStatus::Pairing;
                    })
                    .await;
                    ctx.events
                        .emit(GatewayEvent::PairingCode {
                            session_id: ctx.session_id.clone(),
                            code: code.clone(),
                        })
                        .await;
                    arm_pairing_expiry(ctx, pairing_guard);
                    let _ = reply.send(Ok(code));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }
}

/// Handles one socket event. Returns `Some` when the connection is over.
async fn handle_event(
    ctx: &ActorContext,
    event: SocketEvent,
    attempts: &mut u32,
    pairing_guard: &mut Option<CancellationToken>,
) -> Option<LoopOutcome> {
    match event {
        SocketEvent::Qr { code } => {
            debug!(session_id = %ctx.session_id, "qr code received");
            update_record(ctx, |record| {
                record.qr_code = Some(code.clone());
                record.pairing_code = None;
                record.status = SessionStatus::QrReady;
            })
            .await;
            ctx.events
                .emit(GatewayEvent::QrCode {
                    session_id: ctx.session_id.clone(),
                    code,
                })
                .await;
        }
        SocketEvent::PairingCode { code } => {
            debug!(session_id = %ctx.session_id, "pairing code received");
            update_record(ctx, |record| {
                record.pairing_code = Some(code.clone());
                record.qr_code = None;
                record.status = SessionStatus::Pairing;
            })
            .await;
            ctx.events
                .emit(GatewayEvent::PairingCode {
                    session_id: ctx.session_id.clone(),
                    code,
                })
                .await;
            arm_pairing_expiry(ctx, pairing_guard);
        }
        SocketEvent::ConnectionOpen { phone_number } => {
            info!(
                session_id = %ctx.session_id,
                phone_number = %phone_number,
                "session connected"
            );
            *attempts = 0;
            if let Some(guard) = pairing_guard.take() {
                guard.cancel();
            }
            update_record(ctx, |record| {
                record.status = SessionStatus::Connected;
                record.qr_code = None;
                record.pairing_code = None;
                record.display_phone_number = Some(phone_number.clone());
                record.last_connected_at = Some(chrono::Utc::now().to_rfc3339());
                record.reconnect_attempts = 0;
            })
            .await;
            ctx.events
                .emit(GatewayEvent::SessionConnected {
                    session_id: ctx.session_id.clone(),
                    phone_number,
                })
                .await;
        }
        SocketEvent::MessageReceived(envelope) => {
            record_inbound(ctx, &envelope).await;
            ctx.handler
                .on_inbound(&ctx.session_id, &ctx.tenant_id, envelope)
                .await;
        }
        SocketEvent::Receipt {
            protocol_id,
            status,
        } => {
            match ctx.store.update_message_status(&protocol_id, status).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        session_id = %ctx.session_id,
                        protocol_id = %protocol_id,
                        "receipt matched no message"
                    );
                }
                Err(e) => {
                    warn!(session_id = %ctx.session_id, error = %e, "receipt update failed");
                }
            }
        }
        SocketEvent::CredentialsUpdated(credentials) => {
            if let Err(e) = ctx.credentials.save(&ctx.session_id, &credentials).await {
                warn!(session_id = %ctx.session_id, error = %e, "credential save failed");
            }
        }
        SocketEvent::ConnectionClose { reason } => {
            info!(
                session_id = %ctx.session_id,
                status_code = reason.status_code,
                detail = %reason.detail,
                terminal = reason.is_terminal(),
                "connection closed"
            );
            return Some(if reason.is_terminal() {
                LoopOutcome::Terminal
            } else {
                LoopOutcome::Transient
            });
        }
    }
    None
}

/// Persists an inbound message and the contact it came from, then publishes
/// the message event.
async fn record_inbound(ctx: &ActorContext, envelope: &InboundEnvelope) {
    let now = chrono::Utc::now().to_rfc3339();

    let contact = ContactRecord {
        session_id: ctx.session_id.clone(),
        phone_number: envelope.from.clone(),
        display_name: envelope.sender_name.clone(),
        last_message_at: now.clone(),
    };
    if let Err(e) = ctx.store.upsert_contact(&contact).await {
        warn!(session_id = %ctx.session_id, error = %e, "contact upsert failed");
    }

    let message = MessageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: ctx.session_id.clone(),
        contact_id: envelope.from.clone(),
        direction: MessageDirection::Inbound,
        kind: envelope.kind,
        content: envelope.text.clone().unwrap_or_default(),
        ai_response: None,
        status: MessageStatus::Delivered,
        protocol_id: Some(envelope.protocol_id.clone()),
        created_at: now,
    };
    if let Err(e) = ctx.store.insert_message(&message).await {
        warn!(session_id = %ctx.session_id, error = %e, "inbound message persist failed");
    }

    ctx.events
        .emit(GatewayEvent::NewMessage { message })
        .await;
}

/// Starts (or restarts) the pairing-code expiry timer. An unused code is
/// cleared after the configured TTL and the session returns to `Connecting`.
fn arm_pairing_expiry(ctx: &ActorContext, pairing_guard: &mut Option<CancellationToken>) {
    if let Some(previous) = pairing_guard.take() {
        previous.cancel();
    }
    let guard = CancellationToken::new();
    *pairing_guard = Some(guard.clone());

    let store = Arc::clone(&ctx.store);
    let session_id = ctx.session_id.clone();
    let ttl = ctx.settings.pairing_code_ttl;

    tokio::spawn(async move {
        tokio::select! {
            _ = guard.cancelled() => {}
            _ = tokio::time::sleep(ttl) => {
                expire_pairing_code(store.as_ref(), &session_id).await;
            }
        }
    });
}

async fn expire_pairing_code(store: &dyn RecordStore, session_id: &str) {
    match store.get_session(session_id).await {
        Ok(Some(mut record)) if record.status == SessionStatus::Pairing => {
            info!(session_id, "pairing code expired unused");
            record.pairing_code = None;
            record.status = SessionStatus::Connecting;
            if let Err(e) = store.update_session(&record).await {
                warn!(session_id, error = %e, "pairing expiry update failed");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(session_id, error = %e, "pairing expiry lookup failed"),
    }
}

/// Wipes credentials and marks the session terminally logged out.
async fn finalize_logged_out(ctx: &ActorContext) {
    if let Err(e) = ctx.credentials.delete(&ctx.session_id).await {
        warn!(session_id = %ctx.session_id, error = %e, "credential wipe failed");
    }
    update_record(ctx, |record| {
        record.status = SessionStatus::LoggedOut;
        record.qr_code = None;
        record.pairing_code = None;
    })
    .await;
    ctx.events
        .emit(GatewayEvent::SessionDisconnected {
            session_id: ctx.session_id.clone(),
        })
        .await;
    ctx.handler.on_session_down(&ctx.session_id).await;
}

async fn current_status(ctx: &ActorContext) -> Option<SessionStatus> {
    match ctx.store.get_session(&ctx.session_id).await {
        Ok(record) => record.map(|r| r.status),
        Err(e) => {
            warn!(session_id = %ctx.session_id, error = %e, "status lookup failed");
            None
        }
    }
}

/// Read-modify-write on the session record. The actor is the only writer of
/// its own row, so the sequence is race-free.
async fn update_record<F>(ctx: &ActorContext, mutate: F)
where
    F: FnOnce(&mut SessionRecord),
{
    match ctx.store.get_session(&ctx.session_id).await {
        Ok(Some(mut record)) => {
            mutate(&mut record);
            if let Err(e) = ctx.store.update_session(&record).await {
                warn!(session_id = %ctx.session_id, error = %e, "session record update failed");
            }
        }
        Ok(None) => {
            warn!(session_id = %ctx.session_id, "session record missing");
        }
        Err(e) => {
            warn!(session_id = %ctx.session_id, error = %e, "session record load failed");
        }
    }
}
