// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound event interface for UI/webhook consumers.

use async_trait::async_trait;

use crate::types::GatewayEvent;

/// Receives session lifecycle and message events.
///
/// Emission is fire-and-forget: implementations log delivery failures and
/// never propagate them into the session manager.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: GatewayEvent);
}

/// Sink that drops every event. Useful for tests and headless setups.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: GatewayEvent) {}
}
