// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol socket traits — the black-box boundary to the wire protocol.
//!
//! The wire protocol itself is out of scope: a driver yields connected
//! sockets plus an ordered event stream, and the session manager never
//! looks deeper than [`SocketEvent`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ZaplineError;
use crate::types::{Credentials, Presence, SocketEvent};

/// Command half of one live protocol connection.
///
/// All methods are callable concurrently with event consumption; the
/// driver serializes at the wire as needed.
#[async_trait]
pub trait ProtocolSocket: Send + Sync {
    /// Sends a text message. Returns the protocol-level message id used to
    /// match later delivery receipts.
    async fn send_text(&self, to: &str, text: &str) -> Result<String, ZaplineError>;

    /// Sends a composing/paused presence signal to a contact. Best-effort.
    async fn send_presence(&self, to: &str, presence: Presence) -> Result<(), ZaplineError>;

    /// Requests a pairing code for phone-number device linking. Valid only
    /// while the socket is still authenticating.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError>;

    /// Re-requests a QR/pairing code on an already-connecting socket
    /// without tearing down session identity.
    async fn refresh_code(&self) -> Result<(), ZaplineError>;

    /// Explicit logout. The driver emits a terminal `ConnectionClose`.
    async fn logout(&self) -> Result<(), ZaplineError>;
}

/// A freshly opened connection attempt: the command half plus the ordered
/// event stream consumed by exactly one session actor.
pub struct SocketHandle {
    pub socket: Arc<dyn ProtocolSocket>,
    pub events: mpsc::Receiver<SocketEvent>,
}

/// Factory for protocol sockets, one `open` per connection attempt.
///
/// With stored credentials the driver resumes the session silently; without
/// them it starts a fresh QR/pairing handshake.
#[async_trait]
pub trait SocketDriver: Send + Sync {
    async fn open(
        &self,
        session_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<SocketHandle, ZaplineError>;
}
