// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline serve` command implementation.
//!
//! Wires storage, providers, the session manager, the dispatch pipeline,
//! broadcast workers, and the operator gateway together, restores
//! previously connected sessions, then runs until SIGINT/SIGTERM and shuts
//! down in reverse order.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zapline_config::model::ZaplineConfig;
use zapline_core::{EventSink, LateRegistry, TextProvider, ZaplineError};
use zapline_dispatch::{
    BroadcastRunner, BroadcastSettings, DispatchSettings, Dispatcher, ReplyChain,
};
use zapline_gateway::{AuthConfig, FanoutSink, GatewayState, LogSink, ServerConfig, WebhookSink};
use zapline_gemini::GeminiProvider;
use zapline_openai::OpenAiProvider;
use zapline_session::{SessionManager, SessionSettings};
use zapline_storage::{FileCredentialStore, SqliteStore};

use crate::driver::SimulatorDriver;

/// Runs the `zapline serve` command.
pub async fn run_serve(config: ZaplineConfig) -> Result<(), ZaplineError> {
    init_tracing(&config.agent.log_level);

    info!(instance = %config.agent.name, "starting zapline serve");

    // Storage: SQLite records plus per-session credential files.
    let store = Arc::new(SqliteStore::open(&config.storage).await?);
    let credentials = Arc::new(FileCredentialStore::new(&config.storage.credentials_dir).await?);

    // Primary provider is required; the secondary is optional and the reply
    // chain degrades to the canned fallback without it.
    let openai = Arc::new(OpenAiProvider::new(&config.openai).map_err(|e| {
        error!(error = %e, "failed to initialize OpenAI provider");
        eprintln!(
            "error: OpenAI API key required. Set openai.api_key in zapline.toml or \
             ZAPLINE_OPENAI_API_KEY."
        );
        e
    })?);
    let secondary: Option<Arc<dyn TextProvider>> = if config.gemini.api_key.is_some() {
        match GeminiProvider::new(&config.gemini) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!(error = %e, "secondary provider unavailable, continuing without it");
                None
            }
        }
    } else {
        info!("no gemini.api_key configured, secondary provider disabled");
        None
    };

    let chain = ReplyChain::new(
        openai.clone(),
        secondary,
        Some(openai.clone()),
        Some(openai),
        config.dispatch.fallback_message.clone(),
    );

    // Event sinks: always log, optionally POST to a webhook.
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.gateway.webhook_url {
        info!(url = %url, "webhook sink enabled");
        sinks.push(Arc::new(WebhookSink::new(url.clone())));
    }
    let events = Arc::new(FanoutSink::new(sinks));

    // The dispatcher needs the socket registry and the manager needs the
    // dispatcher; a late-bound registry breaks the cycle.
    let registry = LateRegistry::new();
    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(registry.clone()),
        chain,
        DispatchSettings::from(&config.dispatch),
    );
    let manager = SessionManager::new(
        Arc::new(SimulatorDriver),
        credentials,
        store.clone(),
        events,
        Arc::new(dispatcher.clone()),
        SessionSettings::from(&config.session),
    );
    registry.bind(Arc::new(manager.clone()));

    // Broadcast workers run on their own pool, pulling durable jobs.
    let broadcasts = BroadcastRunner::new(
        store.clone(),
        Arc::new(manager.clone()),
        BroadcastSettings::from(&config.broadcast),
    );
    let broadcast_workers = broadcasts.start();

    // Bring previously connected tenants back online without operator action.
    let restored = manager.restore_all().await?;
    info!(restored, "session restore complete");

    // Operator surface.
    let server_config = ServerConfig::from(&config.gateway);
    let state = GatewayState {
        manager: manager.clone(),
        dispatcher,
        store: store.clone(),
        auth: AuthConfig {
            bearer_token: config.gateway.auth_token.clone(),
        },
        start_time: Instant::now(),
    };

    tokio::select! {
        result = zapline_gateway::start_server(&server_config, state) => {
            error!("gateway server exited unexpectedly");
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Reverse-order teardown: stop taking new work, park the sessions
    // without wiping credentials, flush storage.
    broadcasts.shutdown();
    for worker in broadcast_workers {
        let _ = worker.await;
    }
    manager.shutdown().await;
    store.close().await?;
    info!("zapline stopped");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, relying on ctrl-c");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
