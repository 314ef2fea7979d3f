// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sinks for UI/webhook consumers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use zapline_core::types::GatewayEvent;
use zapline_core::EventSink;

/// Posts every gateway event as JSON to a configured URL.
///
/// Delivery is fire-and-forget: a consumer outage must never slow down or
/// error the session manager, so failures are logged and dropped.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn emit(&self, event: GatewayEvent) {
        let request = self.client.post(&self.url).json(&event);
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "webhook delivery rejected");
                }
                Err(e) => {
                    warn!(error = %e, "webhook delivery failed");
                }
            }
        });
    }
}

/// Fans one event out to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn emit(&self, event: GatewayEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}

/// Logs every event at debug level. The default sink when no webhook is
/// configured.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, event: GatewayEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => debug!(event = %json, "gateway event"),
            Err(e) => warn!(error = %e, "gateway event serialization failed"),
        }
    }
}
