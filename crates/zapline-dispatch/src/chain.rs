// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply chain: media pre-processing plus primary/secondary provider
//! fallback.
//!
//! `respond` never errors. A primary failure falls back to the secondary
//! provider with the same prompt; a double failure yields the fixed
//! localized fallback message so the user-visible path never sees a crash.

use std::sync::Arc;

use tracing::{error, warn};

use zapline_core::types::{BotProfile, Exchange, InboundEnvelope, MessageKind};
use zapline_core::{SpeechProvider, TextProvider, VisionProvider, ZaplineError};

use crate::prompt::{build_prompt, enforce_reply_limits};

pub struct ReplyChain {
    primary: Arc<dyn TextProvider>,
    secondary: Option<Arc<dyn TextProvider>>,
    speech: Option<Arc<dyn SpeechProvider>>,
    vision: Option<Arc<dyn VisionProvider>>,
    fallback_message: String,
}

impl ReplyChain {
    pub fn new(
        primary: Arc<dyn TextProvider>,
        secondary: Option<Arc<dyn TextProvider>>,
        speech: Option<Arc<dyn SpeechProvider>>,
        vision: Option<Arc<dyn VisionProvider>>,
        fallback_message: String,
    ) -> Self {
        Self {
            primary,
            secondary,
            speech,
            vision,
            fallback_message,
        }
    }

    /// Reduces an inbound envelope to plain text: audio is transcribed,
    /// images described, and either result merged with the caption.
    pub async fn preprocess(&self, envelope: &InboundEnvelope) -> Result<String, ZaplineError> {
        let caption = envelope.text.clone().unwrap_or_default();
        match envelope.kind {
            MessageKind::Text | MessageKind::Document => Ok(caption),
            MessageKind::Audio => {
                let media = envelope.media.as_ref().ok_or_else(|| {
                    ZaplineError::Validation("audio message without payload".into())
                })?;
                let speech = self.speech.as_ref().ok_or_else(|| ZaplineError::Provider {
                    message: "no transcription provider configured".into(),
                    source: None,
                })?;
                let transcript = speech.transcribe(&media.bytes, &media.mime_type).await?;
                Ok(merge_caption(&caption, &transcript))
            }
            MessageKind::Image => {
                let media = envelope.media.as_ref().ok_or_else(|| {
                    ZaplineError::Validation("image message without payload".into())
                })?;
                let vision = self.vision.as_ref().ok_or_else(|| ZaplineError::Provider {
                    message: "no vision provider configured".into(),
                    source: None,
                })?;
                let description = vision.describe(&media.bytes, &media.mime_type).await?;
                Ok(merge_caption(&caption, &description))
            }
        }
    }

    /// Generates a reply. Never returns an error: tries the primary
    /// provider, then the secondary with the same prompt, then the fixed
    /// fallback message.
    pub async fn respond(
        &self,
        profile: &BotProfile,
        history: &[Exchange],
        user_text: &str,
    ) -> String {
        let prompt = build_prompt(profile, history, user_text);

        match self.primary.generate(&prompt).await {
            Ok(reply) => return enforce_reply_limits(reply, profile),
            Err(e) => log_provider_failure(self.primary.name(), &e),
        }

        if let Some(secondary) = &self.secondary {
            match secondary.generate(&prompt).await {
                Ok(reply) => return enforce_reply_limits(reply, profile),
                Err(e) => log_provider_failure(secondary.name(), &e),
            }
        }

        warn!("all providers failed, returning canned fallback");
        self.fallback_message.clone()
    }
}

/// Keeps config failures (missing key, bad model) distinguishable from
/// transient provider trouble (rate limit, timeout) in the logs.
fn log_provider_failure(provider: &str, err: &ZaplineError) {
    match err {
        ZaplineError::Config(_) => {
            error!(provider, error = %err, "provider configuration error");
        }
        _ => {
            warn!(provider, error = %err, "provider call failed");
        }
    }
}

fn merge_caption(caption: &str, derived: &str) -> String {
    if caption.is_empty() {
        derived.to_string()
    } else if derived.is_empty() {
        caption.to_string()
    } else {
        format!("{caption}\n{derived}")
    }
}
