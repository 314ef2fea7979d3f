// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential backoff for session reconnection.

use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (1-based count of
/// consecutive failures). Doubles per failure, capped at `max`.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(max)
}
