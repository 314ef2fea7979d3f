// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapline gateway.

use thiserror::Error;

/// The primary error type used across all Zapline adapter traits and core operations.
///
/// Propagation policy: protocol- and provider-level failures are absorbed by
/// the session manager and dispatch pipeline and converted into state
/// transitions or fallback content. Only [`ZaplineError::Validation`] errors
/// on explicit operator actions propagate to the caller.
#[derive(Debug, Error)]
pub enum ZaplineError {
    /// Configuration errors (invalid TOML, missing required fields, missing API keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Recoverable protocol-socket failures (network blips, stream errors).
    /// Retried via the session manager's reconnect backoff.
    #[error("transient protocol error: {message}")]
    TransientProtocol { message: String },

    /// Terminal authentication failure (logged out, credentials revoked).
    /// The session is wiped and never auto-retried.
    #[error("terminal auth failure: {message}")]
    TerminalAuth { message: String },

    /// AI or media provider failures (API error, quota, malformed response).
    /// Falls back to the secondary provider, then to a canned message.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bad operator input (invalid phone number, missing required fields).
    /// Rejected synchronously to the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// An automated action was suppressed by a gate (usage limit, business
    /// hours). Does not error the connection.
    #[error("rate limited: {reason}")]
    RateLimited { reason: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZaplineError {
    /// True for failures the reconnect loop is allowed to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ZaplineError::TransientProtocol { .. } | ZaplineError::Timeout { .. }
        )
    }
}
