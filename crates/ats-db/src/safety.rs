//! `trader_safety_states` table access.
//!
//! The compound "increment, check threshold, maybe set blocked" is one
//! transaction with the row locked `FOR UPDATE`: two concurrent error
//! reports cannot double-trip or lose a count.

use anyhow::{Context, Result};
use ats_guard::SafetyCounters;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct SafetyRow {
    pub trader_name: String,
    pub counters: SafetyCounters,
    pub last_loss_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn counters_from_row(r: &sqlx::postgres::PgRow) -> Result<SafetyCounters> {
    Ok(SafetyCounters {
        daily_loss_krw: r.try_get("daily_loss_krw")?,
        consecutive_losses: r.try_get("consecutive_losses")?,
        slippage_anomaly_count: r.try_get("slippage_anomaly_count")?,
        api_error_count: r.try_get("api_error_count")?,
        db_error_count: r.try_get("db_error_count")?,
        blocked: r.try_get("blocked")?,
        block_reason: r.try_get("block_reason")?,
    })
}

pub async fn fetch(pool: &PgPool, trader_name: &str) -> Result<Option<SafetyRow>> {
    let row = sqlx::query(
        r#"
        select trader_name, daily_loss_krw, consecutive_losses, slippage_anomaly_count,
               api_error_count, db_error_count, last_loss_at, blocked, block_reason, updated_at
        from trader_safety_states
        where trader_name = $1
        "#,
    )
    .bind(trader_name)
    .fetch_optional(pool)
    .await
    .context("fetch safety state failed")?;

    row.map(|r| {
        Ok(SafetyRow {
            trader_name: r.try_get("trader_name")?,
            counters: counters_from_row(&r)?,
            last_loss_at: r.try_get("last_loss_at")?,
            updated_at: r.try_get("updated_at")?,
        })
    })
    .transpose()
}

pub async fn list(pool: &PgPool) -> Result<Vec<SafetyRow>> {
    let rows = sqlx::query(
        r#"
        select trader_name, daily_loss_krw, consecutive_losses, slippage_anomaly_count,
               api_error_count, db_error_count, last_loss_at, blocked, block_reason, updated_at
        from trader_safety_states
        order by trader_name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list safety states failed")?;

    rows.iter()
        .map(|r| {
            Ok(SafetyRow {
                trader_name: r.try_get("trader_name")?,
                counters: counters_from_row(r)?,
                last_loss_at: r.try_get("last_loss_at")?,
                updated_at: r.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Atomically mutate one trader's counters.
///
/// Ensures the row exists, locks it `FOR UPDATE`, hands the decoded
/// [`SafetyCounters`] to `apply`, persists the result and commits. The
/// closure's return value passes through (guard ops return the trip reason).
pub async fn mutate_counters<T>(
    pool: &PgPool,
    trader_name: &str,
    loss_event: bool,
    apply: impl FnOnce(&mut SafetyCounters) -> T,
) -> Result<(SafetyCounters, T)> {
    let mut tx = pool.begin().await.context("begin safety tx failed")?;

    sqlx::query(
        r#"
        insert into trader_safety_states (trader_name)
        values ($1)
        on conflict (trader_name) do nothing
        "#,
    )
    .bind(trader_name)
    .execute(&mut *tx)
    .await
    .context("ensure safety row failed")?;

    let row = sqlx::query(
        r#"
        select daily_loss_krw, consecutive_losses, slippage_anomaly_count,
               api_error_count, db_error_count, blocked, block_reason
        from trader_safety_states
        where trader_name = $1
        for update
        "#,
    )
    .bind(trader_name)
    .fetch_one(&mut *tx)
    .await
    .context("lock safety row failed")?;

    let mut counters = counters_from_row(&row)?;
    let out = apply(&mut counters);

    sqlx::query(
        r#"
        update trader_safety_states set
          daily_loss_krw = $2,
          consecutive_losses = $3,
          slippage_anomaly_count = $4,
          api_error_count = $5,
          db_error_count = $6,
          blocked = $7,
          block_reason = $8,
          last_loss_at = case when $9 then now() else last_loss_at end,
          updated_at = now()
        where trader_name = $1
        "#,
    )
    .bind(trader_name)
    .bind(counters.daily_loss_krw)
    .bind(counters.consecutive_losses)
    .bind(counters.slippage_anomaly_count)
    .bind(counters.api_error_count)
    .bind(counters.db_error_count)
    .bind(counters.blocked)
    .bind(&counters.block_reason)
    .bind(loss_event)
    .execute(&mut *tx)
    .await
    .context("persist safety counters failed")?;

    tx.commit().await.context("commit safety tx failed")?;
    Ok((counters, out))
}
