// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Zapline workspace.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Session ---

/// Lifecycle states of a tenant's protocol connection.
///
/// Transitions are driven exclusively by the session manager:
/// `Disconnected -> Connecting -> {QrReady | Pairing} -> Connected -> Disconnected`,
/// with `LoggedOut` terminal from `Connected` or `Connecting`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    QrReady,
    Pairing,
    Connected,
    LoggedOut,
}

impl SessionStatus {
    /// Terminal states receive no further reconnect attempts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::LoggedOut)
    }
}

/// One tenant's logical protocol connection, independent of the underlying
/// socket instance. At most one live socket exists per session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub tenant_id: String,
    pub status: SessionStatus,
    /// Phone number reported by the protocol once connected.
    pub display_phone_number: Option<String>,
    /// Current QR payload, only while `QrReady`. Mutually exclusive with `Connected`.
    pub qr_code: Option<String>,
    /// Current pairing code, only while `Pairing`. Mutually exclusive with `Connected`.
    pub pairing_code: Option<String>,
    pub last_connected_at: Option<String>,
    pub reconnect_attempts: u32,
    /// When set, AI replies are computed and stored but not delivered.
    pub human_handover: bool,
    pub created_at: String,
    pub updated_at: String,
}

// --- Bot profile (per-session reply configuration) ---

/// Fixed set of assistant personalities selectable per session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    #[default]
    Professional,
    Friendly,
    Casual,
    Formal,
    Playful,
}

/// Open/close window for one weekday. Times are naive local times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Weekly business-hours schedule, indexed Monday = 0 .. Sunday = 6.
/// `None` for a day means closed all day; an absent schedule means always open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WeeklySchedule {
    pub days: [Option<DayWindow>; 7],
}

/// Per-session reply configuration consulted by the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub personality: Personality,
    pub business_name: String,
    /// Category-specific framing injected into the system prompt
    /// (e.g. "restaurant", "clinic", "e-commerce").
    pub business_category: String,
    /// BCP-47-ish language tag the assistant replies in (e.g. "pt-BR").
    pub language: String,
    /// Hard cap on reply length, enforced in the prompt and post-trimmed.
    pub max_reply_chars: usize,
    pub use_emoji: bool,
    #[serde(default)]
    pub schedule: Option<WeeklySchedule>,
}

impl Default for BotProfile {
    fn default() -> Self {
        Self {
            personality: Personality::default(),
            business_name: String::new(),
            business_category: String::new(),
            language: "pt-BR".to_string(),
            max_reply_chars: 600,
            use_emoji: true,
            schedule: None,
        }
    }
}

// --- Contact ---

/// A known conversation partner for one session. Upserted on every
/// inbound/outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub session_id: String,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub last_message_at: String,
}

// --- Message ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    Document,
}

/// Delivery status. Append-only rows; only this field transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub contact_id: String,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    pub content: String,
    /// The AI-generated reply associated with an inbound message, when one
    /// was computed (stored even under human handover).
    pub ai_response: Option<String>,
    pub status: MessageStatus,
    /// Protocol-level message id, used to match delivery receipts.
    pub protocol_id: Option<String>,
    pub created_at: String,
}

// --- Socket events ---

/// Opaque per-session authentication material produced by the protocol
/// layer. Persisted verbatim; never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub serde_json::Value);

/// Why a socket closed. Protocol status codes follow the WhatsApp Web
/// convention: 401 logged out, 403 banned, 440 connection replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub status_code: Option<u16>,
    pub detail: String,
}

impl CloseReason {
    /// Terminal closures wipe credentials and are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status_code, Some(401 | 403 | 440))
    }
}

/// Media attachment carried by an inbound message.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// An inbound message as delivered by the protocol socket.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub protocol_id: String,
    /// Sender phone number in E.164 digits.
    pub from: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    /// Text body, or the caption for media messages.
    pub text: Option<String>,
    pub media: Option<MediaPayload>,
    pub timestamp: String,
}

/// Events emitted by a protocol socket, handled strictly in arrival order
/// per session.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Qr { code: String },
    PairingCode { code: String },
    ConnectionOpen { phone_number: String },
    ConnectionClose { reason: CloseReason },
    MessageReceived(InboundEnvelope),
    Receipt { protocol_id: String, status: MessageStatus },
    CredentialsUpdated(Credentials),
}

/// Presence signal shown to a contact while a reply is being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Paused,
}

// --- Gateway events (produced for UI/webhook consumers) ---

/// Events published to external consumers (webhook, dashboard poll).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    QrCode { session_id: String, code: String },
    PairingCode { session_id: String, code: String },
    SessionConnected { session_id: String, phone_number: String },
    SessionDisconnected { session_id: String },
    NewMessage { message: MessageRecord },
    ReconnectExhausted { session_id: String, attempts: u32 },
}

// --- Broadcast ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Queued,
    Sending,
    Completed,
    Failed,
}

impl BroadcastStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BroadcastStatus::Completed | BroadcastStatus::Failed)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRecipient {
    pub phone_number: String,
    pub status: RecipientStatus,
    pub error: Option<String>,
}

/// A bulk send task fanned out to many recipients with per-recipient
/// status tracking. Partial failure never aborts the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastJob {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub recipients: Vec<BroadcastRecipient>,
    pub sent_count: u32,
    pub failed_count: u32,
    pub job_status: BroadcastStatus,
    pub created_at: String,
}

// --- Usage / plan ---

/// Plan limits looked up from the subscription store. `None` means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PlanLimits {
    pub monthly_reply_limit: Option<u32>,
}

// --- Provider prompt ---

/// One completed user/assistant exchange kept in the rolling context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// A fully assembled generation request handed to a text provider.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<Exchange>,
    pub user: String,
}
