//! `regime_snapshots` table access. Snapshots are append-only; "current
//! regime" is always the greatest-ts row for the market.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct RegimeSnapshotRow {
    pub ts: DateTime<Utc>,
    pub market: String,
    pub regime_id: i32,
    pub regime_label: String,
    pub confidence: f64,
    pub metrics: Value,
}

fn from_row(r: &sqlx::postgres::PgRow) -> Result<RegimeSnapshotRow> {
    Ok(RegimeSnapshotRow {
        ts: r.try_get("ts")?,
        market: r.try_get("market")?,
        regime_id: r.try_get("regime_id")?,
        regime_label: r.try_get("regime_label")?,
        confidence: r.try_get("confidence")?,
        metrics: r.try_get("metrics_json")?,
    })
}

pub async fn append(
    pool: &PgPool,
    market: &str,
    regime_id: i32,
    regime_label: &str,
    confidence: f64,
    metrics: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into regime_snapshots (market, regime_id, regime_label, confidence, metrics_json)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(market)
    .bind(regime_id)
    .bind(regime_label)
    .bind(confidence)
    .bind(metrics)
    .execute(pool)
    .await
    .context("append regime snapshot failed")?;
    Ok(())
}

/// Most recent snapshot for a market.
pub async fn current(pool: &PgPool, market: &str) -> Result<Option<RegimeSnapshotRow>> {
    let row = sqlx::query(
        r#"
        select ts, market, regime_id, regime_label, confidence, metrics_json
        from regime_snapshots
        where market = $1
        order by ts desc
        limit 1
        "#,
    )
    .bind(market)
    .fetch_optional(pool)
    .await
    .context("current regime query failed")?;
    row.as_ref().map(from_row).transpose()
}

pub async fn latest(pool: &PgPool, limit: i64) -> Result<Vec<RegimeSnapshotRow>> {
    let rows = sqlx::query(
        r#"
        select ts, market, regime_id, regime_label, confidence, metrics_json
        from regime_snapshots
        order by ts desc
        limit $1
        "#,
    )
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await
    .context("latest regime snapshots query failed")?;
    rows.iter().map(from_row).collect()
}
