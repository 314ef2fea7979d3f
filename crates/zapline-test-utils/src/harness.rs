// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures: event capture, in-memory credentials, recording
//! handlers, and a polling helper for paused-clock tests.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use zapline_core::types::{Credentials, GatewayEvent, InboundEnvelope};
use zapline_core::{CredentialStore, EventSink, InboundHandler, ZaplineError};

/// Captures every emitted gateway event for assertion.
pub struct CollectingSink {
    events: Mutex<Vec<GatewayEvent>>,
    notify: Notify,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    pub async fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().await.clone()
    }

    /// Waits until an event matching `pred` has been emitted and returns it.
    pub async fn wait_for<F>(&self, mut pred: F) -> GatewayEvent
    where
        F: FnMut(&GatewayEvent) -> bool,
    {
        loop {
            let notified = self.notify.notified();
            {
                let events = self.events.lock().await;
                if let Some(event) = events.iter().find(|e| pred(e)) {
                    return event.clone();
                }
            }
            notified.await;
        }
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, event: GatewayEvent) {
        self.events.lock().await.push(event);
        self.notify.notify_one();
    }
}

/// Credential store backed by a plain map; survives nothing, asserts a lot.
pub struct MemoryCredentialStore {
    map: Mutex<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, session_id: &str) -> Option<Credentials> {
        self.map.lock().await.get(session_id).cloned()
    }

    async fn save(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> Result<(), ZaplineError> {
        self.map
            .lock()
            .await
            .insert(session_id.to_string(), credentials.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), ZaplineError> {
        self.map.lock().await.remove(session_id);
        Ok(())
    }
}

/// Inbound handler recording everything it is given.
pub struct RecordingHandler {
    inbounds: Mutex<Vec<(String, InboundEnvelope)>>,
    downs: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            inbounds: Mutex::new(Vec::new()),
            downs: Mutex::new(Vec::new()),
        }
    }

    pub async fn inbounds(&self) -> Vec<(String, InboundEnvelope)> {
        self.inbounds.lock().await.clone()
    }

    pub async fn inbound_count(&self) -> usize {
        self.inbounds.lock().await.len()
    }

    pub async fn downs(&self) -> Vec<String> {
        self.downs.lock().await.clone()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboundHandler for RecordingHandler {
    async fn on_inbound(&self, session_id: &str, _tenant_id: &str, envelope: InboundEnvelope) {
        self.inbounds
            .lock()
            .await
            .push((session_id.to_string(), envelope));
    }

    async fn on_session_down(&self, session_id: &str) {
        self.downs.lock().await.push(session_id.to_string());
    }
}

/// Polls `condition` until it holds, sleeping between checks. Under a paused
/// tokio clock the sleeps auto-advance, so this stays fast in tests.
///
/// Returns `false` after 500 checks without success.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
