//! Training-data tables: `scan_runs` and `feature_snapshots`.

use anyhow::{Context, Result};
use ats_eval::LabeledSnapshot;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct ScanRunRow {
    pub id: i64,
    pub strategy_id: String,
    pub market_count: i32,
    pub top_n: i32,
    pub params: Value,
    pub ts: DateTime<Utc>,
}

pub async fn insert_scan_run(
    pool: &PgPool,
    strategy_id: &str,
    market_count: i32,
    top_n: i32,
    params: &Value,
) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into scan_runs (strategy_id, market_count, top_n, params_json)
        values ($1, $2, $3, $4)
        returning id
        "#,
    )
    .bind(strategy_id)
    .bind(market_count)
    .bind(top_n)
    .bind(params)
    .fetch_one(pool)
    .await
    .context("insert scan run failed")?;
    Ok(row.try_get("id")?)
}

pub async fn latest_scan_run(pool: &PgPool, strategy_id: &str) -> Result<Option<ScanRunRow>> {
    let row = sqlx::query(
        r#"
        select id, strategy_id, market_count, top_n, params_json, ts
        from scan_runs
        where strategy_id = $1
        order by ts desc
        limit 1
        "#,
    )
    .bind(strategy_id)
    .fetch_optional(pool)
    .await
    .context("latest scan run query failed")?;

    row.map(|r| {
        Ok(ScanRunRow {
            id: r.try_get("id")?,
            strategy_id: r.try_get("strategy_id")?,
            market_count: r.try_get("market_count")?,
            top_n: r.try_get("top_n")?,
            params: r.try_get("params_json")?,
            ts: r.try_get("ts")?,
        })
    })
    .transpose()
}

pub async fn insert_feature_snapshot(
    pool: &PgPool,
    scan_run_id: i64,
    market: &str,
    features: &Value,
) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into feature_snapshots (scan_run_id, market, features_json)
        values ($1, $2, $3)
        returning id
        "#,
    )
    .bind(scan_run_id)
    .bind(market)
    .bind(features)
    .fetch_one(pool)
    .await
    .context("insert feature snapshot failed")?;
    Ok(row.try_get("id")?)
}

#[derive(Debug, Clone)]
pub struct FeatureSnapshotRow {
    pub id: i64,
    pub market: String,
    pub ts: DateTime<Utc>,
    pub features: Value,
    pub labels: LabeledSnapshot,
}

pub async fn snapshots_for_run(pool: &PgPool, scan_run_id: i64) -> Result<Vec<FeatureSnapshotRow>> {
    let rows = sqlx::query(
        r#"
        select id, market, ts, features_json,
               label_ret_60m, label_ret_240m, label_mfe_240m, label_mae_240m, label_dd_240m
        from feature_snapshots
        where scan_run_id = $1
        order by id
        "#,
    )
    .bind(scan_run_id)
    .fetch_all(pool)
    .await
    .context("snapshots for run query failed")?;

    rows.iter()
        .map(|r| {
            Ok(FeatureSnapshotRow {
                id: r.try_get("id")?,
                market: r.try_get("market")?,
                ts: r.try_get("ts")?,
                features: r.try_get("features_json")?,
                labels: LabeledSnapshot {
                    ret_60m: r.try_get("label_ret_60m")?,
                    ret_240m: r.try_get("label_ret_240m")?,
                    mfe_240m: r.try_get("label_mfe_240m")?,
                    mae_240m: r.try_get("label_mae_240m")?,
                    dd_240m: r.try_get("label_dd_240m")?,
                },
            })
        })
        .collect()
}

/// Write the forward-return labels for one snapshot.
pub async fn update_labels(pool: &PgPool, snapshot_id: i64, labels: &LabeledSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        update feature_snapshots set
          label_ret_60m = $2,
          label_ret_240m = $3,
          label_mfe_240m = $4,
          label_mae_240m = $5,
          label_dd_240m = $6
        where id = $1
        "#,
    )
    .bind(snapshot_id)
    .bind(labels.ret_60m)
    .bind(labels.ret_240m)
    .bind(labels.mfe_240m)
    .bind(labels.mae_240m)
    .bind(labels.dd_240m)
    .execute(pool)
    .await
    .context("update labels failed")?;
    Ok(())
}
