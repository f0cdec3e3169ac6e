//! `traders` table access.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

use ats_schemas::{RiskMode, RunMode, TraderStatus};

#[derive(Debug, Clone)]
pub struct TraderRow {
    pub name: String,
    pub strategy: String,
    pub risk_mode: RiskMode,
    pub run_mode: RunMode,
    pub seed_krw: f64,
    pub pnl_krw: f64,
    pub credential_name: Option<String>,
    pub status: TraderStatus,
    pub paper_started_at: Option<DateTime<Utc>>,
    pub armed_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TraderRow {
    /// Seconds of PAPER protection still to run; 0 once LIVE is allowed.
    pub fn paper_protect_remaining_sec(&self, protect_hours: i64, now: DateTime<Utc>) -> i64 {
        let Some(started) = self.paper_started_at else {
            // no recorded start = the full window still applies
            return protect_hours * 3600;
        };
        let elapsed = now - started;
        (Duration::hours(protect_hours) - elapsed).num_seconds().max(0)
    }
}

fn row_to_trader(row: &sqlx::postgres::PgRow) -> Result<TraderRow> {
    let risk_mode: String = row.try_get("risk_mode")?;
    let run_mode: String = row.try_get("run_mode")?;
    let status: String = row.try_get("status")?;
    Ok(TraderRow {
        name: row.try_get("name")?,
        strategy: row.try_get("strategy")?,
        risk_mode: RiskMode::parse(&risk_mode)
            .ok_or_else(|| anyhow!("invalid risk_mode: {risk_mode}"))?,
        run_mode: RunMode::parse(&run_mode)
            .ok_or_else(|| anyhow!("invalid run_mode: {run_mode}"))?,
        seed_krw: row.try_get("seed_krw")?,
        pnl_krw: row.try_get("pnl_krw")?,
        credential_name: row.try_get("credential_name")?,
        status: TraderStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid status: {status}"))?,
        paper_started_at: row.try_get("paper_started_at")?,
        armed_at: row.try_get("armed_at")?,
        last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        created_at: row.try_get("created_at")?,
    })
}

const SELECT_COLS: &str = r#"
    name, strategy, risk_mode, run_mode, seed_krw, pnl_krw, credential_name,
    status, paper_started_at, armed_at, last_heartbeat_at, created_at
"#;

pub async fn fetch(pool: &PgPool, name: &str) -> Result<Option<TraderRow>> {
    let row = sqlx::query(&format!("select {SELECT_COLS} from traders where name = $1"))
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("fetch trader failed")?;
    row.as_ref().map(row_to_trader).transpose()
}

pub async fn list(pool: &PgPool) -> Result<Vec<TraderRow>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLS} from traders order by created_at desc"
    ))
    .fetch_all(pool)
    .await
    .context("list traders failed")?;
    rows.iter().map(row_to_trader).collect()
}

/// Every trader bound to one strategy (drift rollback scans their streaks).
pub async fn list_by_strategy(pool: &PgPool, strategy: &str) -> Result<Vec<TraderRow>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLS} from traders where strategy = $1"
    ))
    .bind(strategy)
    .fetch_all(pool)
    .await
    .context("list traders by strategy failed")?;
    rows.iter().map(row_to_trader).collect()
}

/// Insert a new trader: STOP'd, PAPER-protected from now.
pub async fn insert(
    pool: &PgPool,
    name: &str,
    strategy: &str,
    risk_mode: RiskMode,
    run_mode: RunMode,
    seed_krw: f64,
    credential_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into traders (name, strategy, risk_mode, run_mode, seed_krw,
                             credential_name, status, paper_started_at)
        values ($1, $2, $3, $4, $5, $6, 'STOP', now())
        "#,
    )
    .bind(name)
    .bind(strategy)
    .bind(risk_mode.as_str())
    .bind(run_mode.as_str())
    .bind(seed_krw)
    .bind(credential_name)
    .execute(pool)
    .await
    .context("insert trader failed")?;
    Ok(())
}

pub async fn set_armed(pool: &PgPool, name: &str, armed_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("update traders set armed_at = $2 where name = $1")
        .bind(name)
        .bind(armed_at)
        .execute(pool)
        .await
        .context("arm trader failed")?;
    Ok(())
}

pub async fn set_run_mode_and_status(
    pool: &PgPool,
    name: &str,
    run_mode: RunMode,
    status: TraderStatus,
) -> Result<()> {
    sqlx::query("update traders set run_mode = $2, status = $3 where name = $1")
        .bind(name)
        .bind(run_mode.as_str())
        .bind(status.as_str())
        .execute(pool)
        .await
        .context("set trader run mode failed")?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, name: &str, status: TraderStatus) -> Result<()> {
    sqlx::query("update traders set status = $2 where name = $1")
        .bind(name)
        .bind(status.as_str())
        .execute(pool)
        .await
        .context("set trader status failed")?;
    Ok(())
}

pub async fn touch_heartbeat(pool: &PgPool, name: &str) -> Result<()> {
    sqlx::query("update traders set last_heartbeat_at = now() where name = $1")
        .bind(name)
        .execute(pool)
        .await
        .context("heartbeat update failed")?;
    Ok(())
}

pub async fn add_pnl(pool: &PgPool, name: &str, delta_krw: f64) -> Result<()> {
    sqlx::query("update traders set pnl_krw = pnl_krw + $2 where name = $1")
        .bind(name)
        .bind(delta_krw)
        .execute(pool)
        .await
        .context("pnl update failed")?;
    Ok(())
}

pub async fn delete(pool: &PgPool, name: &str) -> Result<bool> {
    let res = sqlx::query("delete from traders where name = $1")
        .bind(name)
        .execute(pool)
        .await
        .context("delete trader failed")?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trader(paper_started_hours_ago: Option<i64>) -> TraderRow {
        let now = Utc::now();
        TraderRow {
            name: "t1".into(),
            strategy: "standard".into(),
            risk_mode: RiskMode::Standard,
            run_mode: RunMode::Paper,
            seed_krw: 1_000_000.0,
            pnl_krw: 0.0,
            credential_name: None,
            status: TraderStatus::Stop,
            paper_started_at: paper_started_hours_ago.map(|h| now - Duration::hours(h)),
            armed_at: None,
            last_heartbeat_at: None,
            created_at: now,
        }
    }

    #[test]
    fn fresh_trader_has_full_protection_window() {
        let t = trader(Some(0));
        let remaining = t.paper_protect_remaining_sec(24, Utc::now());
        assert!(remaining > 24 * 3600 - 5);
    }

    #[test]
    fn protection_expires_after_the_window() {
        let t = trader(Some(25));
        assert_eq!(t.paper_protect_remaining_sec(24, Utc::now()), 0);
    }

    #[test]
    fn missing_start_counts_as_unprotected_start() {
        let t = trader(None);
        assert_eq!(t.paper_protect_remaining_sec(24, Utc::now()), 24 * 3600);
    }
}
