// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider traits for text generation and media pre-processing.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::Prompt;

/// A text-generation service with a uniform generate contract.
///
/// The reply chain treats every implementation identically; fallback order
/// is explicit wiring, not name dispatch.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Human-readable provider name, used in failure logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, ZaplineError>;
}

/// Speech-to-text for inbound voice notes.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, ZaplineError>;
}

/// Image description for inbound photos.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, ZaplineError>;
}
