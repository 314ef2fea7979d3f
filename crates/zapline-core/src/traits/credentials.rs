// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable per-session authentication material.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::Credentials;

/// Stores protocol credentials across process restarts.
///
/// Implementations must treat corrupted or partially written credentials as
/// absent — a fresh QR/pairing flow is the recovery path, never a crash.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns stored credentials, or `None` when absent or unreadable.
    async fn load(&self, session_id: &str) -> Option<Credentials>;

    async fn save(&self, session_id: &str, credentials: &Credentials)
    -> Result<(), ZaplineError>;

    /// Removes stored credentials. Idempotent.
    async fn delete(&self, session_id: &str) -> Result<(), ZaplineError>;
}
