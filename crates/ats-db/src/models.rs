//! Model lifecycle tables: versions, tuning candidates, baselines and the
//! 24h rolling metrics. Transition legality is enforced by the store
//! handlers; this module is plain row access.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

use ats_schemas::ModelStatus;

#[derive(Debug, Clone)]
pub struct ModelVersionRow {
    pub id: i64,
    pub strategy_id: String,
    pub version: String,
    pub status: ModelStatus,
    pub metrics: Value,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rollback_reason: Option<String>,
}

fn from_row(r: &sqlx::postgres::PgRow) -> Result<ModelVersionRow> {
    let status: String = r.try_get("status")?;
    Ok(ModelVersionRow {
        id: r.try_get("id")?,
        strategy_id: r.try_get("strategy_id")?,
        version: r.try_get("version")?,
        status: ModelStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid model status: {status}"))?,
        metrics: r.try_get("metrics_json")?,
        created_at: r.try_get("created_at")?,
        deployed_at: r.try_get("deployed_at")?,
        rolled_back_at: r.try_get("rolled_back_at")?,
        rollback_reason: r.try_get("rollback_reason")?,
    })
}

const COLS: &str = r#"
    id, strategy_id, version, status, metrics_json, created_at,
    deployed_at, rolled_back_at, rollback_reason
"#;

pub async fn insert(pool: &PgPool, strategy_id: &str, version: &str, metrics: &Value) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into model_versions (strategy_id, version, metrics_json)
        values ($1, $2, $3)
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(version)
    .bind(metrics)
    .fetch_one(pool)
    .await
    .context("insert model version failed")?;
    Ok(row.try_get("id")?)
}

pub async fn fetch(pool: &PgPool, id: i64) -> Result<Option<ModelVersionRow>> {
    let row = sqlx::query(&format!("select {COLS} from model_versions where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch model version failed")?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list(pool: &PgPool) -> Result<Vec<ModelVersionRow>> {
    let rows = sqlx::query(&format!(
        "select {COLS} from model_versions order by created_at desc"
    ))
    .fetch_all(pool)
    .await
    .context("list model versions failed")?;
    rows.iter().map(from_row).collect()
}

pub async fn set_status(pool: &PgPool, id: i64, status: ModelStatus) -> Result<()> {
    sqlx::query("update model_versions set status = $2 where id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await
        .context("set model status failed")?;
    Ok(())
}

pub async fn set_metrics(pool: &PgPool, id: i64, metrics: &Value) -> Result<()> {
    sqlx::query("update model_versions set metrics_json = $2 where id = $1")
        .bind(id)
        .bind(metrics)
        .execute(pool)
        .await
        .context("set model metrics failed")?;
    Ok(())
}

pub async fn mark_deployed(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query(
        "update model_versions set status = 'PAPER_DEPLOYED', deployed_at = now() where id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("mark deployed failed")?;
    Ok(())
}

/// Roll a model back to DRAFT, recording when and why.
pub async fn mark_rolled_back(pool: &PgPool, id: i64, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        update model_versions
        set status = 'DRAFT', rolled_back_at = now(), rollback_reason = $2
        where id = $1
        "#,
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await
    .context("mark rolled back failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tuning candidates
// ---------------------------------------------------------------------------

pub async fn insert_candidate(
    pool: &PgPool,
    strategy_id: &str,
    params: &Value,
    metrics: &Value,
    score: f64,
    status: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into model_candidates (strategy_id, params_json, metrics_json, score, status)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(strategy_id)
    .bind(params)
    .bind(metrics)
    .bind(score)
    .bind(status)
    .execute(pool)
    .await
    .context("insert model candidate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Baselines & 24h metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BaselineRow {
    pub id: i64,
    pub strategy_id: String,
    pub baseline_model_id: i64,
    pub baseline_metrics: Value,
    pub drift_warn_count: i64,
}

pub async fn latest_baseline(pool: &PgPool, strategy_id: &str) -> Result<Option<BaselineRow>> {
    let row = sqlx::query(
        r#"
        select id, strategy_id, baseline_model_id, baseline_metrics_json, drift_warn_count
        from model_baselines
        where strategy_id = $1
        order by created_at desc
        limit 1
        "#,
    )
    .bind(strategy_id)
    .fetch_optional(pool)
    .await
    .context("latest baseline query failed")?;

    row.map(|r| {
        Ok(BaselineRow {
            id: r.try_get("id")?,
            strategy_id: r.try_get("strategy_id")?,
            baseline_model_id: r.try_get("baseline_model_id")?,
            baseline_metrics: r.try_get("baseline_metrics_json")?,
            drift_warn_count: r.try_get("drift_warn_count")?,
        })
    })
    .transpose()
}

/// Pin a 14-day reference window ending now.
pub async fn insert_baseline(
    pool: &PgPool,
    strategy_id: &str,
    model_id: i64,
    metrics: &Value,
) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into model_baselines
          (strategy_id, baseline_model_id, baseline_metrics_json,
           reference_window_start, reference_window_end)
        values ($1, $2, $3, now() - interval '14 days', now())
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(model_id)
    .bind(metrics)
    .fetch_one(pool)
    .await
    .context("insert baseline failed")?;
    Ok(row.try_get("id")?)
}

pub async fn bump_drift_warn(pool: &PgPool, baseline_id: i64) -> Result<i64> {
    let row = sqlx::query(
        r#"
        update model_baselines
        set drift_warn_count = drift_warn_count + 1,
            last_drift_check = now(),
            updated_at = now()
        where id = $1
        returning drift_warn_count
        "#,
    )
    .bind(baseline_id)
    .fetch_one(pool)
    .await
    .context("bump drift warn failed")?;
    Ok(row.try_get("drift_warn_count")?)
}

pub async fn insert_metrics_24h(
    pool: &PgPool,
    model_id: i64,
    strategy_id: &str,
    net_return_24h: f64,
    metrics: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into model_metrics_24h (model_id, strategy_id, net_return_24h, metrics_json)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(model_id)
    .bind(strategy_id)
    .bind(net_return_24h)
    .bind(metrics)
    .execute(pool)
    .await
    .context("insert 24h metrics failed")?;
    Ok(())
}

pub async fn latest_net_return_24h(pool: &PgPool, model_id: i64) -> Result<Option<f64>> {
    let row = sqlx::query(
        r#"
        select net_return_24h
        from model_metrics_24h
        where model_id = $1
        order by ts desc
        limit 1
        "#,
    )
    .bind(model_id)
    .fetch_optional(pool)
    .await
    .context("latest 24h metrics query failed")?;
    row.map(|r| Ok(r.try_get("net_return_24h")?)).transpose()
}
