// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI providers with injectable replies and failures.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use zapline_core::types::Prompt;
use zapline_core::{SpeechProvider, TextProvider, VisionProvider, ZaplineError};

/// A text provider returning a fixed reply, with a failure switch and full
/// prompt capture for assertions.
pub struct MockTextProvider {
    name: String,
    reply: String,
    fail: AtomicBool,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockTextProvider {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a provider that fails every call.
    pub fn failing(name: &str) -> Self {
        let provider = Self::new(name, "");
        provider.fail.store(true, Ordering::SeqCst);
        provider
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every prompt this provider was asked to answer, in order.
    pub async fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ZaplineError> {
        self.prompts.lock().await.push(prompt.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ZaplineError::Provider {
                message: format!("mock provider {} failed", self.name),
                source: None,
            });
        }
        Ok(self.reply.clone())
    }
}

/// A speech provider returning a fixed transcript.
pub struct MockSpeechProvider {
    transcript: String,
    fail: AtomicBool,
}

impl MockSpeechProvider {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechProvider for MockSpeechProvider {
    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String, ZaplineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ZaplineError::Provider {
                message: "mock transcription failed".into(),
                source: None,
            });
        }
        Ok(self.transcript.clone())
    }
}

/// A vision provider returning a fixed description.
pub struct MockVisionProvider {
    description: String,
    fail: AtomicBool,
}

impl MockVisionProvider {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    async fn describe(&self, _image: &[u8], _mime_type: &str) -> Result<String, ZaplineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ZaplineError::Provider {
                message: "mock description failed".into(),
                source: None,
            });
        }
        Ok(self.description.clone())
    }
}
