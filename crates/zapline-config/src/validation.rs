// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and ordered backoff bounds.

use crate::model::ZaplineConfig;
use crate::ConfigError;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ZaplineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.storage.credentials_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.credentials_dir must not be empty".to_string(),
        });
    }

    let addr = config.gateway.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "gateway.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    if config.session.max_reconnect_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "session.max_reconnect_attempts must be at least 1".to_string(),
        });
    }

    if config.session.reconnect_base_ms > config.session.reconnect_max_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.reconnect_base_ms ({}) must not exceed session.reconnect_max_ms ({})",
                config.session.reconnect_base_ms, config.session.reconnect_max_ms
            ),
        });
    }

    if config.dispatch.quiet_period_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.quiet_period_secs must be at least 1".to_string(),
        });
    }

    if config.dispatch.context_window == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.context_window must be at least 1".to_string(),
        });
    }

    if config.broadcast.workers == 0 {
        errors.push(ConfigError::Validation {
            message: "broadcast.workers must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
