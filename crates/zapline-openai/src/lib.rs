// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI provider adapter for Zapline.
//!
//! One client, three trait implementations: text generation for the reply
//! chain, voice-note transcription, and image description for media
//! pre-processing. Audio and images travel inline (base64 / data URL)
//! through the chat completions endpoint.

pub mod client;
pub mod types;

use async_trait::async_trait;
use base64::Engine as _;

use zapline_config::model::OpenAiConfig;
use zapline_core::types::Prompt;
use zapline_core::{SpeechProvider, TextProvider, VisionProvider, ZaplineError};

pub use client::OpenAiClient;

use types::{ChatMessage, ContentPart, ImageUrl, InputAudio};

#[derive(Debug)]
pub struct OpenAiProvider {
    client: OpenAiClient,
    model: String,
    audio_model: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Fails with a config error when no API key is configured — a missing
    /// key must read differently in the logs than a rate limit.
    pub fn new(config: &OpenAiConfig) -> Result<Self, ZaplineError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ZaplineError::Config(
                    "openai.api_key missing; set it in zapline.toml or ZAPLINE_OPENAI_API_KEY"
                        .into(),
                )
            })?;
        Ok(Self {
            client: OpenAiClient::new(api_key)?,
            model: config.model.clone(),
            audio_model: config.audio_model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, url: String) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

/// Flattens a prompt into the chat message list: system, then alternating
/// history turns, then the new user message.
fn messages_from_prompt(prompt: &Prompt) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.history.len() * 2 + 2);
    messages.push(ChatMessage::text("system", prompt.system.clone()));
    for exchange in &prompt.history {
        messages.push(ChatMessage::text("user", exchange.user.clone()));
        messages.push(ChatMessage::text("assistant", exchange.assistant.clone()));
    }
    messages.push(ChatMessage::text("user", prompt.user.clone()));
    messages
}

/// Maps a MIME type to the container format name the API expects.
fn audio_format(mime_type: &str) -> &str {
    match mime_type {
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mp4" | "audio/m4a" => "m4a",
        _ => "ogg",
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ZaplineError> {
        self.client
            .chat(&self.model, self.max_tokens, messages_from_prompt(prompt))
            .await
    }
}

#[async_trait]
impl SpeechProvider for OpenAiProvider {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, ZaplineError> {
        let data = base64::engine::general_purpose::STANDARD.encode(audio);
        let messages = vec![ChatMessage::parts(
            "user",
            vec![
                ContentPart::Text {
                    text: "Transcribe this voice message verbatim. Reply with the transcript \
                           only, no commentary."
                        .into(),
                },
                ContentPart::InputAudio {
                    input_audio: InputAudio {
                        data,
                        format: audio_format(mime_type).to_string(),
                    },
                },
            ],
        )];
        self.client
            .chat(&self.audio_model, self.max_tokens, messages)
            .await
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    async fn describe(&self, image: &[u8], mime_type: &str) -> Result<String, ZaplineError> {
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        let messages = vec![ChatMessage::parts(
            "user",
            vec![
                ContentPart::Text {
                    text: "Describe what this image shows, in one or two sentences, so a \
                           customer-service assistant can act on it."
                        .into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{mime_type};base64,{data}"),
                    },
                },
            ],
        )];
        self.client.chat(&self.model, self.max_tokens, messages).await
    }
}
