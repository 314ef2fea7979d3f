// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence and durable credential files for the Zapline gateway.
//!
//! All relational access goes through [`SqliteStore`], a [`RecordStore`]
//! implementation backed by one serialized connection. Protocol credentials
//! live outside the database as per-session JSON files managed by
//! [`FileCredentialStore`].
//!
//! [`RecordStore`]: zapline_core::RecordStore

pub mod adapter;
pub mod credentials;
pub mod database;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use credentials::FileCredentialStore;
pub use database::Database;
