// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone-number sanitization for pairing-code requests.

use zapline_core::ZaplineError;

/// Shortest phone number accepted for pairing, country code included.
const MIN_PHONE_DIGITS: usize = 8;

/// Reduces operator input to digits only and rejects numbers too short to
/// be a valid E.164 phone number.
pub fn sanitize_phone_number(raw: &str) -> Result<String, ZaplineError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(ZaplineError::Validation(format!(
            "invalid phone number `{raw}`: expected at least {MIN_PHONE_DIGITS} digits"
        )));
    }
    Ok(digits)
}
