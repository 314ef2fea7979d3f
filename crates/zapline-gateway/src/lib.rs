// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator HTTP surface and outbound event sinks for the Zapline gateway.
//!
//! Every endpoint is a thin call into the session manager, dispatcher, or
//! record store; no business logic lives here.

pub mod auth;
pub mod events;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use events::{FanoutSink, LogSink, WebhookSink};
pub use server::{build_router, start_server, GatewayState, ServerConfig};
