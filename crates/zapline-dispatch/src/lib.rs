// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message dispatch pipeline for the Zapline gateway.
//!
//! Inbound traffic flows debounce -> gate checks -> reply chain -> outbound
//! sender. Broadcasts flow directly from durable jobs into a separate
//! worker pool, bypassing the debounce stage.

pub mod broadcast;
pub mod chain;
pub mod context;
pub mod debounce;
pub mod gates;
pub mod outbound;
pub mod pipeline;
pub mod prompt;

pub use broadcast::{BroadcastRunner, BroadcastSettings};
pub use chain::ReplyChain;
pub use context::ConversationCache;
pub use debounce::{BatchConsumer, ContactDebouncer};
pub use outbound::OutboundSender;
pub use pipeline::{DispatchSettings, Dispatcher};
