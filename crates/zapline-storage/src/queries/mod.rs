// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod broadcasts;
pub mod contacts;
pub mod messages;
pub mod sessions;
pub mod usage;

use std::str::FromStr;

/// Parses a TEXT column into a strum-backed enum, mapping parse failures to
/// a column conversion error so they surface as storage errors, not panics.
pub(crate) fn column_enum<T>(idx: usize, value: String) -> Result<T, rusqlite::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
