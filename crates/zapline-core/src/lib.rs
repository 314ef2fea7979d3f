// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Zapline gateway.
//!
//! Defines the error taxonomy, the domain types (sessions, messages,
//! broadcasts), and the trait seams every other crate plugs into. The
//! wire-level messaging protocol and the AI models themselves sit behind
//! the traits in [`traits`] and are never implemented here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ZaplineError;
pub use types::{GatewayEvent, SessionStatus, SocketEvent};

pub use traits::{
    CredentialStore, EventSink, InboundHandler, LateRegistry, NullSink, ProtocolSocket,
    RecordStore, SocketDriver, SocketHandle, SocketRegistry, SpeechProvider, TextProvider,
    VisionProvider,
};
