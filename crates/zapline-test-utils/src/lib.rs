// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapline integration tests.
//!
//! Mock protocol sockets with scriptable event streams, mock AI providers,
//! and recording fixtures for events, credentials, and inbound handling.

pub mod harness;
pub mod mock_provider;
pub mod mock_socket;

pub use harness::{eventually, CollectingSink, MemoryCredentialStore, RecordingHandler};
pub use mock_provider::{MockSpeechProvider, MockTextProvider, MockVisionProvider};
pub use mock_socket::{MockDriver, MockSocket};
