//! Postgres data-access layer for the Control Store.
//!
//! One module per entity, hand-written queries, explicit transactions for
//! the multi-row invariants (safety trip, config activation). Schema setup
//! is idempotent DDL executed at startup: `CREATE TABLE IF NOT EXISTS` plus
//! additive `ADD COLUMN IF NOT EXISTS` so pre-existing deployments upgrade
//! in place.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod bandit;
pub mod configs;
pub mod credentials;
pub mod events;
pub mod models;
pub mod regimes;
pub mod safety;
pub mod traders;
pub mod trades;
pub mod trainer;

pub const ENV_DB_URL: &str = "DATABASE_URL";

/// Connect to Postgres using DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

const DDL: &[&str] = &[
    r#"
    create table if not exists credentials (
      name           varchar(64) primary key,
      access_key_enc text not null,
      secret_key_enc text not null,
      created_at     timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists traders (
      name              varchar(64) primary key,
      strategy          varchar(64) not null default 'standard',
      risk_mode         varchar(16) not null default 'STANDARD',
      run_mode          varchar(8)  not null default 'PAPER',
      seed_krw          double precision not null default 1000000,
      pnl_krw           double precision not null default 0,
      credential_name   varchar(64),
      status            varchar(16) not null default 'STOP',
      paper_started_at  timestamptz,
      armed_at          timestamptz,
      last_heartbeat_at timestamptz,
      created_at        timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists regime_snapshots (
      id           bigserial primary key,
      ts           timestamptz not null default now(),
      market       varchar(32) not null default 'KRW-BTC',
      regime_id    integer not null default 0,
      regime_label varchar(32) not null default 'RANGE',
      confidence   double precision not null default 0,
      metrics_json jsonb not null default '{}'
    )
    "#,
    r#"
    create index if not exists idx_regime_snapshots_market_ts
      on regime_snapshots (market, ts desc)
    "#,
    r#"
    create table if not exists bandit_states (
      regime      varchar(32) not null,
      strategy_id varchar(64) not null,
      alpha       double precision not null default 1,
      beta        double precision not null default 1,
      updated_at  timestamptz not null default now(),
      primary key (regime, strategy_id)
    )
    "#,
    r#"
    create table if not exists trader_safety_states (
      trader_name            varchar(64) primary key,
      daily_loss_krw         double precision not null default 0,
      consecutive_losses     bigint not null default 0,
      slippage_anomaly_count bigint not null default 0,
      api_error_count        bigint not null default 0,
      db_error_count         bigint not null default 0,
      last_loss_at           timestamptz,
      blocked                boolean not null default false,
      block_reason           text,
      updated_at             timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists signals (
      id                bigserial primary key,
      trader_name       varchar(64) not null,
      symbol            varchar(32) not null,
      ts                timestamptz not null default now(),
      total_score       double precision not null default 0,
      scores_json       jsonb not null default '{}',
      regime            varchar(32) not null default 'RANGE',
      action            varchar(16) not null default 'HOLD',
      reason_codes_json jsonb not null default '[]'
    )
    "#,
    r#"
    create index if not exists idx_signals_trader_ts on signals (trader_name, ts desc)
    "#,
    r#"
    create table if not exists orders (
      id          bigserial primary key,
      order_id    varchar(128) not null,
      trader_name varchar(64) not null,
      symbol      varchar(32) not null,
      side        varchar(8) not null,
      price       double precision not null default 0,
      size        double precision not null default 0,
      status      varchar(16) not null default 'PENDING',
      filled_qty  double precision not null default 0,
      avg_price   double precision,
      created_at  timestamptz not null default now()
    )
    "#,
    r#"
    create index if not exists idx_orders_trader_created on orders (trader_name, created_at)
    "#,
    r#"
    create table if not exists config_versions (
      id          bigserial primary key,
      strategy_id varchar(64) not null,
      version     integer not null default 1,
      params_json jsonb not null default '{}',
      is_active   boolean not null default false,
      created_at  timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists model_versions (
      id              bigserial primary key,
      strategy_id     varchar(64) not null,
      version         varchar(64) not null,
      status          varchar(32) not null default 'DRAFT',
      metrics_json    jsonb not null default '{}',
      created_at      timestamptz not null default now(),
      deployed_at     timestamptz,
      rolled_back_at  timestamptz,
      rollback_reason text
    )
    "#,
    r#"
    create table if not exists model_candidates (
      id          bigserial primary key,
      strategy_id varchar(64) not null,
      params_json jsonb not null default '{}',
      metrics_json jsonb not null default '{}',
      score       double precision not null default 0,
      status      varchar(16) not null default 'REJECT',
      created_at  timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists model_baselines (
      id                     bigserial primary key,
      strategy_id            varchar(64) not null,
      baseline_model_id      bigint not null,
      baseline_metrics_json  jsonb not null default '{}',
      reference_window_start timestamptz not null,
      reference_window_end   timestamptz not null,
      drift_warn_count       bigint not null default 0,
      last_drift_check       timestamptz,
      created_at             timestamptz not null default now(),
      updated_at             timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists model_metrics_24h (
      id             bigserial primary key,
      model_id       bigint not null,
      strategy_id    varchar(64) not null,
      ts             timestamptz not null default now(),
      net_return_24h double precision not null default 0,
      metrics_json   jsonb not null default '{}'
    )
    "#,
    r#"
    create table if not exists scan_runs (
      id           bigserial primary key,
      strategy_id  varchar(64) not null,
      market_count integer not null default 0,
      top_n        integer not null default 5,
      params_json  jsonb not null default '{}',
      ts           timestamptz not null default now()
    )
    "#,
    r#"
    create table if not exists feature_snapshots (
      id             bigserial primary key,
      scan_run_id    bigint not null references scan_runs(id),
      market         varchar(32) not null,
      ts             timestamptz not null default now(),
      features_json  jsonb not null default '{}',
      label_ret_60m  double precision,
      label_ret_240m double precision,
      label_mfe_240m double precision,
      label_mae_240m double precision,
      label_dd_240m  double precision
    )
    "#,
    r#"
    create table if not exists events (
      id          bigserial primary key,
      ts          timestamptz not null default now(),
      trader_name varchar(64),
      level       varchar(16) not null default 'INFO',
      kind        varchar(64) not null default 'system',
      message     text not null default ''
    )
    "#,
];

/// Additive column migrations tolerated against pre-existing tables.
const COLUMN_MIGRATIONS: &[&str] = &[
    "alter table traders add column if not exists seed_krw double precision not null default 1000000",
    "alter table traders add column if not exists pnl_krw double precision not null default 0",
    "alter table traders add column if not exists paper_started_at timestamptz",
    "alter table traders add column if not exists armed_at timestamptz",
    "alter table regime_snapshots add column if not exists market varchar(32) not null default 'KRW-BTC'",
    "alter table trader_safety_states add column if not exists slippage_anomaly_count bigint not null default 0",
    "alter table trader_safety_states add column if not exists api_error_count bigint not null default 0",
    "alter table trader_safety_states add column if not exists db_error_count bigint not null default 0",
];

/// Create missing tables, apply additive column migrations, then seed the
/// bandit posterior for the five regimes × default strategy.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for ddl in DDL {
        sqlx::query(ddl).execute(pool).await.context("schema DDL failed")?;
    }
    for stmt in COLUMN_MIGRATIONS {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .with_context(|| format!("column migration failed: {stmt}"))?;
    }
    bandit::seed_defaults(pool).await?;
    Ok(())
}

/// Connectivity + schema presence, surfaced in the health endpoint.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (has_traders,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='traders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok: one == 1, has_traders_table: has_traders })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_traders_table: bool,
}
