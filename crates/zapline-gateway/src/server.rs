// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator HTTP server built on axum.
//!
//! Sets up routes, auth middleware, and shared state.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use zapline_core::{RecordStore, ZaplineError};
use zapline_dispatch::Dispatcher;
use zapline_session::SessionManager;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub manager: SessionManager,
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn RecordStore>,
    pub auth: AuthConfig,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

/// Gateway server configuration (mirrors GatewayConfig from zapline-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub bearer_token: Option<String>,
}

impl From<&zapline_config::model::GatewayConfig> for ServerConfig {
    fn from(config: &zapline_config::model::GatewayConfig) -> Self {
        Self {
            host: config.bind_address.clone(),
            port: config.port,
            bearer_token: config.auth_token.clone(),
        }
    }
}

/// Builds the full operator router: an unauthenticated `/health` probe plus
/// bearer-authenticated `/v1` API routes.
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/sessions/{id}/connect", post(handlers::connect_session))
        .route(
            "/v1/sessions/{id}/disconnect",
            post(handlers::disconnect_session),
        )
        .route("/v1/sessions/{id}", get(handlers::get_session))
        .route(
            "/v1/sessions/{id}/pairing-code",
            post(handlers::request_pairing_code),
        )
        .route("/v1/sessions/{id}/refresh-code", post(handlers::refresh_code))
        .route("/v1/sessions/{id}/messages", post(handlers::send_message))
        .route("/v1/broadcasts", post(handlers::create_broadcast))
        .route("/v1/broadcasts/{id}", get(handlers::get_broadcast))
        .route("/v1/broadcasts/{id}", delete(handlers::delete_broadcast))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Binds and serves the operator surface until the process exits.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), ZaplineError> {
    if state.auth.bearer_token.is_none() {
        tracing::warn!("gateway auth disabled -- every operator endpoint is open");
    }

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ZaplineError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("operator gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| ZaplineError::Internal(format!("gateway server error: {e}")))
}
