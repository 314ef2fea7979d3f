// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `zapline-core::types` for use across
//! adapter trait boundaries. This module re-exports them for convenience
//! within the storage crate.

pub use zapline_core::types::{
    BroadcastJob, BroadcastRecipient, ContactRecord, MessageRecord, SessionRecord,
};
