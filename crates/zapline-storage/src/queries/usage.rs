// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage counters and plan lookup.

use rusqlite::params;

use zapline_core::types::PlanLimits;
use zapline_core::ZaplineError;

use crate::database::{map_tr_err, Database};

/// Bump the tenant's reply counter for the given month key (`YYYY-MM`) and
/// return the new total.
pub async fn increment_usage(
    db: &Database,
    tenant_id: &str,
    month: &str,
) -> Result<u32, ZaplineError> {
    let tenant_id = tenant_id.to_string();
    let month = month.to_string();
    db.connection()
        .call(move |conn| {
            let replies: u32 = conn.query_row(
                "INSERT INTO usage_counters (tenant_id, month, replies) VALUES (?1, ?2, 1)
                 ON CONFLICT (tenant_id, month) DO UPDATE SET replies = replies + 1
                 RETURNING replies",
                params![tenant_id, month],
                |row| row.get(0),
            )?;
            Ok(replies)
        })
        .await
        .map_err(map_tr_err)
}

/// Current reply count for the month; zero when no row exists.
pub async fn get_usage(db: &Database, tenant_id: &str, month: &str) -> Result<u32, ZaplineError> {
    let tenant_id = tenant_id.to_string();
    let month = month.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT replies FROM usage_counters WHERE tenant_id = ?1 AND month = ?2",
                params![tenant_id, month],
                |row| row.get(0),
            );
            match result {
                Ok(replies) => Ok(replies),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Plan limits for a tenant. Tenants without a plan row are unlimited.
pub async fn get_plan(db: &Database, tenant_id: &str) -> Result<PlanLimits, ZaplineError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT monthly_reply_limit FROM plans WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get::<_, Option<u32>>(0),
            );
            match result {
                Ok(limit) => Ok(PlanLimits {
                    monthly_reply_limit: limit,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(PlanLimits::default()),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Install or replace a tenant's plan limits.
pub async fn set_plan(
    db: &Database,
    tenant_id: &str,
    plan: PlanLimits,
) -> Result<(), ZaplineError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO plans (tenant_id, monthly_reply_limit) VALUES (?1, ?2)
                 ON CONFLICT (tenant_id) DO UPDATE SET
                     monthly_reply_limit = excluded.monthly_reply_limit",
                params![tenant_id, plan.monthly_reply_limit],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
