// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the operator REST API.
//!
//! Thin wrappers over the session manager, dispatcher, and record store:
//! session connect/disconnect, code retrieval, one-off sends, and broadcast
//! job management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use zapline_core::types::{
    BroadcastJob, BroadcastRecipient, BroadcastStatus, RecipientStatus, SessionRecord,
};
use zapline_core::ZaplineError;

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps domain errors onto HTTP statuses: validation to 400, everything
/// else to 500 with the message logged, not leaked.
fn error_response(err: ZaplineError) -> Response {
    match err {
        ZaplineError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: message }),
        )
            .into_response(),
        other => {
            warn!(error = %other, "operator request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Request body for POST /v1/sessions/{id}/connect.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub tenant_id: String,
}

/// Session status as served to dashboards and pollers.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub tenant_id: String,
    pub status: String,
    pub display_phone_number: Option<String>,
    pub qr_code: Option<String>,
    pub pairing_code: Option<String>,
    pub reconnect_attempts: u32,
    pub human_handover: bool,
    pub last_connected_at: Option<String>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            status: record.status.to_string(),
            display_phone_number: record.display_phone_number,
            qr_code: record.qr_code,
            pairing_code: record.pairing_code,
            reconnect_attempts: record.reconnect_attempts,
            human_handover: record.human_handover,
            last_connected_at: record.last_connected_at,
        }
    }
}

/// POST /v1/sessions/{id}/connect
pub async fn connect_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(body): Json<ConnectRequest>,
) -> Response {
    match state
        .manager
        .create_or_restore(&session_id, &body.tenant_id)
        .await
    {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/sessions/{id}/disconnect
pub async fn disconnect_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.manager.disconnect(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/sessions/{id}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.store.get_session(&session_id).await {
        Ok(Some(record)) => Json(SessionResponse::from(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown session {session_id}"),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /v1/sessions/{id}/pairing-code.
#[derive(Debug, Deserialize)]
pub struct PairingRequest {
    pub phone_number: String,
}

/// Response body for POST /v1/sessions/{id}/pairing-code.
#[derive(Debug, Serialize)]
pub struct PairingResponse {
    pub code: String,
}

/// POST /v1/sessions/{id}/pairing-code
pub async fn request_pairing_code(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(body): Json<PairingRequest>,
) -> Response {
    match state
        .manager
        .request_pairing_code(&session_id, &body.phone_number)
        .await
    {
        Ok(code) => Json(PairingResponse { code }).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/sessions/{id}/refresh-code
pub async fn refresh_code(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.manager.refresh_code(&session_id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /v1/sessions/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

/// Response body for POST /v1/sessions/{id}/messages.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
}

/// POST /v1/sessions/{id}/messages — one-off operator send.
pub async fn send_message(
    State(state): State<GatewayState>,
    Path(session_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    if body.to.trim().is_empty() || body.text.trim().is_empty() {
        return error_response(ZaplineError::Validation(
            "both `to` and `text` are required".into(),
        ));
    }
    match state
        .dispatcher
        .send_manual(&session_id, &body.to, &body.text)
        .await
    {
        Ok(record) => Json(SendMessageResponse {
            message_id: record.id,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /v1/broadcasts.
#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub session_id: String,
    pub content: String,
    pub recipients: Vec<String>,
}

/// Response body for POST /v1/broadcasts.
#[derive(Debug, Serialize)]
pub struct CreateBroadcastResponse {
    pub id: String,
}

/// POST /v1/broadcasts — queue a broadcast job for the worker pool.
pub async fn create_broadcast(
    State(state): State<GatewayState>,
    Json(body): Json<CreateBroadcastRequest>,
) -> Response {
    if body.recipients.is_empty() {
        return error_response(ZaplineError::Validation(
            "broadcast needs at least one recipient".into(),
        ));
    }
    if body.content.trim().is_empty() {
        return error_response(ZaplineError::Validation("broadcast content is empty".into()));
    }

    let job = BroadcastJob {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: body.session_id,
        content: body.content,
        recipients: body
            .recipients
            .into_iter()
            .map(|phone_number| BroadcastRecipient {
                phone_number,
                status: RecipientStatus::Pending,
                error: None,
            })
            .collect(),
        sent_count: 0,
        failed_count: 0,
        job_status: BroadcastStatus::Queued,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    match state.store.create_broadcast(&job).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(CreateBroadcastResponse { id: job.id }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/broadcasts/{id}
pub async fn get_broadcast(
    State(state): State<GatewayState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.store.get_broadcast(&job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown broadcast {job_id}"),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /v1/broadcasts/{id} — rejected while the job is sending.
pub async fn delete_broadcast(
    State(state): State<GatewayState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.store.delete_broadcast(&job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health — unauthenticated liveness probe.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
    .into_response()
}
