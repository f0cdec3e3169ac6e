//! `events` table access — the structured worker/system event feed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub trader_name: Option<String>,
    pub level: String,
    pub kind: String,
    pub message: String,
}

pub async fn insert(
    pool: &PgPool,
    trader_name: Option<&str>,
    level: &str,
    kind: &str,
    message: &str,
) -> Result<()> {
    sqlx::query("insert into events (trader_name, level, kind, message) values ($1, $2, $3, $4)")
        .bind(trader_name)
        .bind(level)
        .bind(kind)
        .bind(message)
        .execute(pool)
        .await
        .context("insert event failed")?;
    Ok(())
}

pub async fn list(pool: &PgPool, trader_name: Option<&str>, limit: i64) -> Result<Vec<EventRow>> {
    let rows = sqlx::query(
        r#"
        select id, ts, trader_name, level, kind, message
        from events
        where ($1::text is null or trader_name = $1)
        order by ts desc
        limit $2
        "#,
    )
    .bind(trader_name)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
    .context("list events failed")?;

    rows.iter()
        .map(|r| {
            Ok(EventRow {
                id: r.try_get("id")?,
                ts: r.try_get("ts")?,
                trader_name: r.try_get("trader_name")?,
                level: r.try_get("level")?,
                kind: r.try_get("kind")?,
                message: r.try_get("message")?,
            })
        })
        .collect()
}
