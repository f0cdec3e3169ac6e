//! `bandit_states` table access: one Beta posterior per (regime, strategy).

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

use ats_schemas::Regime;

pub const DEFAULT_STRATEGY: &str = "standard";

#[derive(Debug, Clone, Copy)]
pub struct BanditRow {
    pub alpha: f64,
    pub beta: f64,
}

/// Seed a Beta(1,1) row for every regime × the default strategy so the
/// planner never samples a missing arm for the stock configuration.
pub async fn seed_defaults(pool: &PgPool) -> Result<()> {
    for regime in Regime::ALL {
        sqlx::query(
            r#"
            insert into bandit_states (regime, strategy_id)
            values ($1, $2)
            on conflict (regime, strategy_id) do nothing
            "#,
        )
        .bind(regime.as_str())
        .bind(DEFAULT_STRATEGY)
        .execute(pool)
        .await
        .context("bandit seed failed")?;
    }
    Ok(())
}

pub async fn fetch(pool: &PgPool, regime: &str, strategy_id: &str) -> Result<Option<BanditRow>> {
    let row = sqlx::query(
        "select alpha, beta from bandit_states where regime = $1 and strategy_id = $2",
    )
    .bind(regime)
    .bind(strategy_id)
    .fetch_optional(pool)
    .await
    .context("fetch bandit state failed")?;

    row.map(|r| Ok(BanditRow { alpha: r.try_get("alpha")?, beta: r.try_get("beta")? }))
        .transpose()
}

/// Upsert the posterior update: +1 on α for positive reward, else +1 on β.
/// Per-arm updates are a single statement so concurrent reward reports for
/// the same arm serialize at the row and simply sum.
pub async fn update(
    pool: &PgPool,
    regime: &str,
    strategy_id: &str,
    reward_positive: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into bandit_states (regime, strategy_id, alpha, beta, updated_at)
        values ($1, $2,
                1 + case when $3 then 1 else 0 end,
                1 + case when $3 then 0 else 1 end,
                now())
        on conflict (regime, strategy_id) do update set
          alpha = bandit_states.alpha + case when $3 then 1 else 0 end,
          beta  = bandit_states.beta  + case when $3 then 0 else 1 end,
          updated_at = now()
        "#,
    )
    .bind(regime)
    .bind(strategy_id)
    .bind(reward_positive)
    .execute(pool)
    .await
    .context("bandit update failed")?;
    Ok(())
}
