// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gemini provider adapter for Zapline, used as the secondary text
//! provider in the reply chain.

pub mod client;
pub mod types;

use async_trait::async_trait;

use zapline_config::model::GeminiConfig;
use zapline_core::types::Prompt;
use zapline_core::{TextProvider, ZaplineError};

pub use client::GeminiClient;

use types::{Content, GenerateRequest, Part, SystemInstruction};

#[derive(Debug)]
pub struct GeminiProvider {
    client: GeminiClient,
    model: String,
}

impl GeminiProvider {
    /// Fails with a config error when no API key is configured.
    pub fn new(config: &GeminiConfig) -> Result<Self, ZaplineError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ZaplineError::Config(
                    "gemini.api_key missing; set it in zapline.toml or ZAPLINE_GEMINI_API_KEY"
                        .into(),
                )
            })?;
        Ok(Self {
            client: GeminiClient::new(api_key)?,
            model: config.model.clone(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, url: String) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

/// Maps the prompt into Gemini's content turns: history alternates
/// user/model roles, the system prompt travels as a system instruction.
fn request_from_prompt(prompt: &Prompt) -> GenerateRequest {
    let mut contents = Vec::with_capacity(prompt.history.len() * 2 + 1);
    for exchange in &prompt.history {
        contents.push(Content {
            role: "user".into(),
            parts: vec![Part {
                text: exchange.user.clone(),
            }],
        });
        contents.push(Content {
            role: "model".into(),
            parts: vec![Part {
                text: exchange.assistant.clone(),
            }],
        });
    }
    contents.push(Content {
        role: "user".into(),
        parts: vec![Part {
            text: prompt.user.clone(),
        }],
    });

    GenerateRequest {
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: prompt.system.clone(),
            }],
        },
        contents,
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ZaplineError> {
        self.client
            .generate(&self.model, &request_from_prompt(prompt))
            .await
    }
}
