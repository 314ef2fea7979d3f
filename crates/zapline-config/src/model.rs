// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Zapline gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Zapline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZaplineConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session manager settings (reconnect backoff, pairing codes).
    #[serde(default)]
    pub session: SessionConfig,

    /// Dispatch pipeline settings (debounce, context, canned messages).
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// OpenAI provider settings (primary text + media pre-processing).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Gemini provider settings (secondary text).
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Broadcast worker settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Operator HTTP surface and webhook sink.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the gateway instance.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "zapline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding one credential file per session.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            credentials_dir: default_credentials_dir(),
        }
    }
}

fn default_database_path() -> String {
    "zapline.db".to_string()
}

fn default_credentials_dir() -> String {
    "credentials".to_string()
}

/// Session manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Consecutive reconnect failures tolerated before a session is marked
    /// permanently disconnected.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay; doubles per consecutive failure.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Backoff cap.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Unused pairing codes are invalidated after this long.
    #[serde(default = "default_pairing_code_ttl_secs")]
    pub pairing_code_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            pairing_code_ttl_secs: default_pairing_code_ttl_secs(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_ms() -> u64 {
    2_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_pairing_code_ttl_secs() -> u64 {
    120
}

/// Dispatch pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Quiet period after the last fragment before a batch is dispatched.
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: u64,

    /// Rolling conversation context: exchanges kept per contact.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Rolling conversation context: entry time-to-live.
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,

    /// Minimum spacing between out-of-hours canned messages per contact.
    #[serde(default = "default_greeting_cooldown_secs")]
    pub greeting_cooldown_secs: u64,

    /// Sent when both AI providers fail. Localized for the default tenant
    /// language; per-session profiles may override tone but not this text.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Out-of-hours canned reply. `{hours}` expands to the day's schedule.
    #[serde(default = "default_closed_message_template")]
    pub closed_message_template: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: default_quiet_period_secs(),
            context_window: default_context_window(),
            context_ttl_secs: default_context_ttl_secs(),
            greeting_cooldown_secs: default_greeting_cooldown_secs(),
            fallback_message: default_fallback_message(),
            closed_message_template: default_closed_message_template(),
        }
    }
}

fn default_quiet_period_secs() -> u64 {
    10
}

fn default_context_window() -> usize {
    6
}

fn default_context_ttl_secs() -> u64 {
    1_800
}

fn default_greeting_cooldown_secs() -> u64 {
    21_600
}

fn default_fallback_message() -> String {
    "Desculpe, não consegui processar sua mensagem agora. Tente novamente em instantes."
        .to_string()
}

fn default_closed_message_template() -> String {
    "Olá! Estamos fechados no momento. Nosso horário de hoje: {hours}.".to_string()
}

/// OpenAI provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. `None` requires the `ZAPLINE_OPENAI_API_KEY` env var.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model for text generation and image description.
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Model for voice-note transcription.
    #[serde(default = "default_openai_audio_model")]
    pub audio_model: String,

    /// Maximum tokens to generate per reply.
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_openai_model(),
            audio_model: default_openai_audio_model(),
            max_tokens: default_openai_max_tokens(),
        }
    }
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_audio_model() -> String {
    "gpt-4o-mini-audio-preview".to_string()
}

fn default_openai_max_tokens() -> u32 {
    1_024
}

/// Gemini provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiConfig {
    /// API key. `None` disables the secondary provider; the reply chain
    /// then degrades straight to the canned fallback.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Broadcast worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Fixed worker-pool size, separate from reply dispatch.
    #[serde(default = "default_broadcast_workers")]
    pub workers: usize,

    /// Fixed delay between consecutive recipients of one job.
    #[serde(default = "default_inter_message_delay_ms")]
    pub inter_message_delay_ms: u64,

    /// Idle poll interval when the job queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            workers: default_broadcast_workers(),
            inter_message_delay_ms: default_inter_message_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_broadcast_workers() -> usize {
    2
}

fn default_inter_message_delay_ms() -> u64 {
    3_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

/// Operator HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on every operator endpoint. `None` disables
    /// auth (local development only).
    #[serde(default)]
    pub auth_token: Option<String>,

    /// URL receiving gateway events as JSON POSTs. `None` disables the
    /// webhook sink.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_gateway_port(),
            auth_token: None,
            webhook_url: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8420
}
