// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapline.toml` > `~/.config/zapline/zapline.toml`
//! > `/etc/zapline/zapline.toml` with environment variable overrides via the
//! `ZAPLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ZaplineConfig;

/// Config sections recognized when mapping environment variable names.
const SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "session",
    "dispatch",
    "openai",
    "gemini",
    "broadcast",
    "gateway",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapline/zapline.toml` (system-wide)
/// 3. `~/.config/zapline/zapline.toml` (user XDG config)
/// 4. `./zapline.toml` (local directory)
/// 5. `ZAPLINE_*` environment variables
pub fn load_config() -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file("/etc/zapline/zapline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("zapline/zapline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("zapline.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ZAPLINE_OPENAI_API_KEY` must become
/// `openai.api_key`, not `openai.api.key`.
fn env_provider() -> Env {
    Env::prefixed("ZAPLINE_").map(|key| {
        let key = key.as_str().to_lowercase();
        for section in SECTIONS {
            if let Some(rest) = key.strip_prefix(&format!("{section}_")) {
                return format!("{section}.{rest}").into();
            }
        }
        key.into()
    })
}
