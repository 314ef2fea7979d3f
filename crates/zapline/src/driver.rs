// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process simulator driver for local development.
//!
//! The real messaging protocol is an external concern: production deploys
//! plug a protocol driver into [`SocketDriver`]. This simulator stands in
//! for it so the whole gateway can be exercised locally: a fresh session
//! emits a QR code and "pairs" itself shortly after, credentials restore
//! silently, sends are acknowledged with delivered receipts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use zapline_core::types::{Credentials, MessageStatus, Presence, SocketEvent};
use zapline_core::{ProtocolSocket, SocketDriver, SocketHandle, ZaplineError};

/// How long after showing a QR code the simulator pretends it was scanned.
const SIMULATED_SCAN_DELAY: Duration = Duration::from_secs(2);

pub struct SimulatorDriver;

#[async_trait]
impl SocketDriver for SimulatorDriver {
    async fn open(
        &self,
        session_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<SocketHandle, ZaplineError> {
        let (events_tx, events_rx) = mpsc::channel(64);
        let phone_number = format!("55119{:08}", simple_hash(session_id) % 100_000_000);

        match credentials {
            Some(_) => {
                // Stored credentials: connect silently, no QR step.
                let tx = events_tx.clone();
                let phone = phone_number.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(SocketEvent::ConnectionOpen { phone_number: phone })
                        .await;
                });
            }
            None => {
                let tx = events_tx.clone();
                let phone = phone_number.clone();
                let session = session_id.to_string();
                tokio::spawn(async move {
                    let _ = tx
                        .send(SocketEvent::Qr {
                            code: format!("sim-qr-{session}"),
                        })
                        .await;
                    tokio::time::sleep(SIMULATED_SCAN_DELAY).await;
                    let _ = tx
                        .send(SocketEvent::CredentialsUpdated(Credentials(
                            serde_json::json!({"simulator": true, "session": session}),
                        )))
                        .await;
                    let _ = tx
                        .send(SocketEvent::ConnectionOpen { phone_number: phone })
                        .await;
                });
            }
        }

        info!(session_id, "simulator socket opened");
        Ok(SocketHandle {
            socket: Arc::new(SimulatorSocket {
                events: events_tx,
                next_id: AtomicU64::new(0),
            }),
            events: events_rx,
        })
    }
}

struct SimulatorSocket {
    events: mpsc::Sender<SocketEvent>,
    next_id: AtomicU64,
}

#[async_trait]
impl ProtocolSocket for SimulatorSocket {
    async fn send_text(&self, to: &str, text: &str) -> Result<String, ZaplineError> {
        let protocol_id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        info!(to, chars = text.chars().count(), protocol_id = %protocol_id, "simulator send");
        // Acknowledge delivery immediately.
        let _ = self
            .events
            .send(SocketEvent::Receipt {
                protocol_id: protocol_id.clone(),
                status: MessageStatus::Delivered,
            })
            .await;
        Ok(protocol_id)
    }

    async fn send_presence(&self, _to: &str, _presence: Presence) -> Result<(), ZaplineError> {
        Ok(())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError> {
        Ok(format!("SIM-{:04}", simple_hash(phone_number) % 10_000))
    }

    async fn refresh_code(&self) -> Result<(), ZaplineError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

fn simple_hash(input: &str) -> u64 {
    input
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}
