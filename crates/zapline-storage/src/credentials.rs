// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed credential store, one JSON file per session.
//!
//! Writes go through a temp file + rename so a crash mid-write leaves either
//! the old credentials or nothing, never a torn file. Anything unreadable is
//! treated as absent, which sends the session back through a fresh
//! QR/pairing flow instead of crashing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use zapline_core::types::Credentials;
use zapline_core::{CredentialStore, ZaplineError};

pub struct FileCredentialStore {
    base_dir: PathBuf,
}

impl FileCredentialStore {
    /// Creates the store, ensuring the base directory exists.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, ZaplineError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| ZaplineError::Storage {
                source: Box::new(e),
            })?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session ids are UUIDs from our own records, but sanitize anyway so
        // a hostile id cannot escape the credentials directory.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, session_id: &str) -> Option<Credentials> {
        let path = self.path_for(session_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(session_id, error = %e, "failed to read credential file");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                // Corrupted or partial credentials are absent by contract.
                warn!(
                    session_id,
                    error = %e,
                    "credential file unparseable, treating as absent"
                );
                None
            }
        }
    }

    async fn save(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> Result<(), ZaplineError> {
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec(credentials).map_err(|e| ZaplineError::Storage {
            source: Box::new(e),
        })?;
        tokio::fs::write(&tmp, &raw)
            .await
            .map_err(|e| ZaplineError::Storage {
                source: Box::new(e),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ZaplineError::Storage {
                source: Box::new(e),
            })?;
        debug!(session_id, "credentials saved");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), ZaplineError> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(session_id, "credentials wiped");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ZaplineError::Storage {
                source: Box::new(e),
            }),
        }
    }
}
