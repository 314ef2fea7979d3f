// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the RecordStore trait.

use async_trait::async_trait;
use tracing::debug;

use zapline_config::model::StorageConfig;
use zapline_core::types::{
    BotProfile, BroadcastJob, BroadcastStatus, ContactRecord, MessageRecord, MessageStatus,
    PlanLimits, RecipientStatus, SessionRecord, SessionStatus,
};
use zapline_core::{RecordStore, ZaplineError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed record store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens the database at the configured path, applying migrations and
    /// crash recovery.
    pub async fn open(config: &StorageConfig) -> Result<Self, ZaplineError> {
        let db = Database::open(&config.database_path).await?;
        debug!(path = %config.database_path, "SQLite record store opened");
        Ok(Self { db })
    }

    /// Checkpoints the WAL; call once during graceful shutdown.
    pub async fn close(&self) -> Result<(), ZaplineError> {
        self.db.close().await
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), ZaplineError> {
        queries::sessions::create_session(&self.db, session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, ZaplineError> {
        queries::sessions::get_session(&self.db, id).await
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, ZaplineError> {
        queries::sessions::list_sessions(&self.db, status).await
    }

    async fn update_session(&self, session: &SessionRecord) -> Result<(), ZaplineError> {
        queries::sessions::update_session(&self.db, session).await
    }

    async fn get_profile(&self, session_id: &str) -> Result<Option<BotProfile>, ZaplineError> {
        queries::sessions::get_profile(&self.db, session_id).await
    }

    async fn set_profile(
        &self,
        session_id: &str,
        profile: &BotProfile,
    ) -> Result<(), ZaplineError> {
        queries::sessions::set_profile(&self.db, session_id, profile).await
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<(), ZaplineError> {
        queries::messages::insert_message(&self.db, message).await
    }

    async fn update_message_status(
        &self,
        protocol_id: &str,
        status: MessageStatus,
    ) -> Result<bool, ZaplineError> {
        queries::messages::update_message_status(&self.db, protocol_id, status).await
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<MessageRecord>, ZaplineError> {
        queries::messages::get_messages_for_session(&self.db, session_id, limit).await
    }

    async fn upsert_contact(&self, contact: &ContactRecord) -> Result<(), ZaplineError> {
        queries::contacts::upsert_contact(&self.db, contact).await
    }

    async fn increment_usage(&self, tenant_id: &str, month: &str) -> Result<u32, ZaplineError> {
        queries::usage::increment_usage(&self.db, tenant_id, month).await
    }

    async fn get_usage(&self, tenant_id: &str, month: &str) -> Result<u32, ZaplineError> {
        queries::usage::get_usage(&self.db, tenant_id, month).await
    }

    async fn get_plan(&self, tenant_id: &str) -> Result<PlanLimits, ZaplineError> {
        queries::usage::get_plan(&self.db, tenant_id).await
    }

    async fn set_plan(&self, tenant_id: &str, plan: PlanLimits) -> Result<(), ZaplineError> {
        queries::usage::set_plan(&self.db, tenant_id, plan).await
    }

    async fn create_broadcast(&self, job: &BroadcastJob) -> Result<(), ZaplineError> {
        queries::broadcasts::create_broadcast(&self.db, job).await
    }

    async fn get_broadcast(&self, id: &str) -> Result<Option<BroadcastJob>, ZaplineError> {
        queries::broadcasts::get_broadcast(&self.db, id).await
    }

    async fn claim_next_broadcast(&self) -> Result<Option<BroadcastJob>, ZaplineError> {
        queries::broadcasts::claim_next_broadcast(&self.db).await
    }

    async fn mark_recipient(
        &self,
        job_id: &str,
        phone_number: &str,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<(), ZaplineError> {
        queries::broadcasts::mark_recipient(&self.db, job_id, phone_number, status, error).await
    }

    async fn complete_broadcast(
        &self,
        job_id: &str,
        status: BroadcastStatus,
    ) -> Result<(), ZaplineError> {
        queries::broadcasts::complete_broadcast(&self.db, job_id, status).await
    }

    async fn delete_broadcast(&self, id: &str) -> Result<(), ZaplineError> {
        queries::broadcasts::delete_broadcast(&self.db, id).await
    }
}
