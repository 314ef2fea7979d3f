// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the session manager and the dispatch pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::traits::socket::ProtocolSocket;
use crate::types::InboundEnvelope;

/// Receives inbound messages from session actors.
///
/// Implementations must return quickly — heavy work (provider calls, sends)
/// is deferred to timers or spawned tasks so one session's AI latency never
/// blocks its own event handling.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_inbound(&self, session_id: &str, tenant_id: &str, envelope: InboundEnvelope);

    /// The session went down; pending debounce batches for it must be
    /// abandoned so stale replies are dropped, not queued.
    async fn on_session_down(&self, session_id: &str);
}

/// Lookup of the live socket for a session, if any.
///
/// Implemented by the session manager; consumed by the outbound sender and
/// broadcast workers. `None` means the session is not currently connected.
pub trait SocketRegistry: Send + Sync {
    fn socket(&self, session_id: &str) -> Option<Arc<dyn ProtocolSocket>>;
}

/// A registry bound after construction.
///
/// The dispatch pipeline needs the registry and the session manager needs
/// the pipeline; wiring goes pipeline -> manager -> `bind`, and lookups
/// before `bind` read as "not connected".
#[derive(Clone, Default)]
pub struct LateRegistry {
    inner: Arc<std::sync::OnceLock<Arc<dyn SocketRegistry>>>,
}

impl LateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the real registry. Later calls are ignored.
    pub fn bind(&self, registry: Arc<dyn SocketRegistry>) {
        let _ = self.inner.set(registry);
    }
}

impl SocketRegistry for LateRegistry {
    fn socket(&self, session_id: &str) -> Option<Arc<dyn ProtocolSocket>> {
        self.inner.get().and_then(|registry| registry.socket(session_id))
    }
}
