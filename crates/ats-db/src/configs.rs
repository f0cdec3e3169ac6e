//! `config_versions` table access.
//!
//! Activation clears any prior active row for the same strategy inside the
//! same transaction, so readers see at most one active config per strategy.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct ConfigVersionRow {
    pub id: i64,
    pub strategy_id: String,
    pub version: i32,
    pub params: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn from_row(r: &sqlx::postgres::PgRow) -> Result<ConfigVersionRow> {
    Ok(ConfigVersionRow {
        id: r.try_get("id")?,
        strategy_id: r.try_get("strategy_id")?,
        version: r.try_get("version")?,
        params: r.try_get("params_json")?,
        is_active: r.try_get("is_active")?,
        created_at: r.try_get("created_at")?,
    })
}

/// Insert a new (inactive) version, auto-numbered per strategy.
pub async fn insert(pool: &PgPool, strategy_id: &str, params: &Value) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into config_versions (strategy_id, version, params_json)
        values (
          $1,
          coalesce((select max(version) from config_versions where strategy_id = $1), 0) + 1,
          $2
        )
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(params)
    .fetch_one(pool)
    .await
    .context("insert config version failed")?;
    Ok(row.try_get("id")?)
}

/// Activate one version; prior actives for the same strategy are cleared in
/// the same transaction. Returns false when the id is unknown.
pub async fn activate(pool: &PgPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin config tx failed")?;

    let Some(row) = sqlx::query("select strategy_id from config_versions where id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("config lookup failed")?
    else {
        return Ok(false);
    };
    let strategy_id: String = row.try_get("strategy_id")?;

    sqlx::query("update config_versions set is_active = false where strategy_id = $1 and is_active")
        .bind(&strategy_id)
        .execute(&mut *tx)
        .await
        .context("clear active configs failed")?;

    sqlx::query("update config_versions set is_active = true where id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("activate config failed")?;

    tx.commit().await.context("commit config tx failed")?;
    Ok(true)
}

pub async fn list(pool: &PgPool) -> Result<Vec<ConfigVersionRow>> {
    let rows = sqlx::query(
        r#"
        select id, strategy_id, version, params_json, is_active, created_at
        from config_versions
        order by strategy_id, version desc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list configs failed")?;
    rows.iter().map(from_row).collect()
}

/// The single active config for a strategy, if any.
pub async fn active_for_strategy(
    pool: &PgPool,
    strategy_id: &str,
) -> Result<Option<ConfigVersionRow>> {
    let row = sqlx::query(
        r#"
        select id, strategy_id, version, params_json, is_active, created_at
        from config_versions
        where strategy_id = $1 and is_active
        order by version desc
        limit 1
        "#,
    )
    .bind(strategy_id)
    .fetch_optional(pool)
    .await
    .context("active config query failed")?;
    row.as_ref().map(from_row).transpose()
}
