// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound reply delivery through the live protocol socket.

use std::sync::Arc;

use tracing::debug;

use zapline_core::types::{
    ContactRecord, MessageDirection, MessageKind, MessageRecord, MessageStatus,
};
use zapline_core::{RecordStore, SocketRegistry, ZaplineError};

/// Sends single replies and persists their outbound records.
#[derive(Clone)]
pub struct OutboundSender {
    registry: Arc<dyn SocketRegistry>,
    store: Arc<dyn RecordStore>,
}

impl OutboundSender {
    pub fn new(registry: Arc<dyn SocketRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    /// Best-effort single send. Persists the outbound message with status
    /// `sent`; delivery receipts later upgrade it to delivered/read. Fails
    /// when the session has no live socket.
    pub async fn send_reply(
        &self,
        session_id: &str,
        contact: &str,
        text: &str,
        ai_generated: bool,
    ) -> Result<MessageRecord, ZaplineError> {
        let socket = self.registry.socket(session_id).ok_or_else(|| {
            ZaplineError::TransientProtocol {
                message: format!("session {session_id} is not connected"),
            }
        })?;

        let protocol_id = socket.send_text(contact, text).await?;
        debug!(session_id, contact, protocol_id = %protocol_id, "reply sent");

        let now = chrono::Utc::now().to_rfc3339();
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            contact_id: contact.to_string(),
            direction: MessageDirection::Outbound,
            kind: MessageKind::Text,
            content: text.to_string(),
            ai_response: ai_generated.then(|| text.to_string()),
            status: MessageStatus::Sent,
            protocol_id: Some(protocol_id),
            created_at: now.clone(),
        };
        self.store.insert_message(&record).await?;

        let contact_record = ContactRecord {
            session_id: session_id.to_string(),
            phone_number: contact.to_string(),
            display_name: None,
            last_message_at: now,
        };
        self.store.upsert_contact(&contact_record).await?;

        Ok(record)
    }
}
