// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the session manager, dispatch pipeline, and the
//! external collaborators (protocol sockets, stores, AI providers).
//!
//! All traits use `#[async_trait]` for dynamic dispatch behind `Arc`.

pub mod credentials;
pub mod events;
pub mod handler;
pub mod provider;
pub mod socket;
pub mod store;

pub use credentials::CredentialStore;
pub use events::{EventSink, NullSink};
pub use handler::{InboundHandler, LateRegistry, SocketRegistry};
pub use provider::{SpeechProvider, TextProvider, VisionProvider};
pub use socket::{ProtocolSocket, SocketDriver, SocketHandle};
pub use store::RecordStore;
