// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record store trait for the consumed relational interface.
//!
//! Session record CRUD, message append + status update, contact upsert,
//! usage counters, plan lookup, and durable broadcast jobs. User/tenant
//! CRUD and billing live elsewhere and are not modeled here.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::{
    BotProfile, BroadcastJob, BroadcastStatus, ContactRecord, MessageRecord, MessageStatus,
    PlanLimits, RecipientStatus, SessionRecord, SessionStatus,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Session records ---

    async fn create_session(&self, session: &SessionRecord) -> Result<(), ZaplineError>;

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, ZaplineError>;

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, ZaplineError>;

    /// Full-row update. Session records are mutated only by the session
    /// manager, so last-write-wins is safe here.
    async fn update_session(&self, session: &SessionRecord) -> Result<(), ZaplineError>;

    async fn get_profile(&self, session_id: &str) -> Result<Option<BotProfile>, ZaplineError>;

    async fn set_profile(
        &self,
        session_id: &str,
        profile: &BotProfile,
    ) -> Result<(), ZaplineError>;

    // --- Messages ---

    async fn insert_message(&self, message: &MessageRecord) -> Result<(), ZaplineError>;

    /// Applies a delivery-receipt status transition matched by protocol
    /// message id. Returns `false` when no message matched.
    async fn update_message_status(
        &self,
        protocol_id: &str,
        status: MessageStatus,
    ) -> Result<bool, ZaplineError>;

    async fn get_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<MessageRecord>, ZaplineError>;

    // --- Contacts ---

    async fn upsert_contact(&self, contact: &ContactRecord) -> Result<(), ZaplineError>;

    // --- Usage counters / plan ---

    /// Increments the tenant's reply counter for the given month key
    /// (`YYYY-MM`) and returns the new total.
    async fn increment_usage(&self, tenant_id: &str, month: &str) -> Result<u32, ZaplineError>;

    async fn get_usage(&self, tenant_id: &str, month: &str) -> Result<u32, ZaplineError>;

    async fn get_plan(&self, tenant_id: &str) -> Result<PlanLimits, ZaplineError>;

    async fn set_plan(&self, tenant_id: &str, plan: PlanLimits) -> Result<(), ZaplineError>;

    // --- Broadcast jobs ---

    async fn create_broadcast(&self, job: &BroadcastJob) -> Result<(), ZaplineError>;

    async fn get_broadcast(&self, id: &str) -> Result<Option<BroadcastJob>, ZaplineError>;

    /// Atomically claims the oldest `queued` job, transitioning it to
    /// `sending`. Returns `None` when the queue is empty.
    async fn claim_next_broadcast(&self) -> Result<Option<BroadcastJob>, ZaplineError>;

    /// Records one recipient's outcome and bumps the job's aggregate
    /// counters in the same transaction.
    async fn mark_recipient(
        &self,
        job_id: &str,
        phone_number: &str,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<(), ZaplineError>;

    async fn complete_broadcast(
        &self,
        job_id: &str,
        status: BroadcastStatus,
    ) -> Result<(), ZaplineError>;

    /// Deletes a job. Fails with [`ZaplineError::Validation`] while the job
    /// is `sending`.
    async fn delete_broadcast(&self, id: &str) -> Result<(), ZaplineError>;
}
