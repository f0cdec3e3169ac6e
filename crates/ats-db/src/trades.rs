//! `signals` and `orders` tables, and holdings reconstruction.
//!
//! The order ledger is the source of truth for "is this symbol held":
//! [`holdings`] replays FILLED orders chronologically per symbol, so a
//! restarted worker recovers its dedup set without trusting any cached
//! position flag.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

use ats_schemas::{HoldingView, OrderIn, SignalIn};

pub async fn insert_signal(pool: &PgPool, signal: &SignalIn) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into signals (trader_name, symbol, total_score, scores_json, regime, action, reason_codes_json)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id
        "#,
    )
    .bind(&signal.trader_name)
    .bind(&signal.symbol)
    .bind(signal.total_score)
    .bind(&signal.scores)
    .bind(&signal.regime)
    .bind(&signal.action)
    .bind(serde_json::to_value(&signal.reason_codes).unwrap_or(Value::Array(Vec::new())))
    .fetch_one(pool)
    .await
    .context("insert signal failed")?;
    Ok(row.try_get("id")?)
}

pub async fn insert_order(pool: &PgPool, order: &OrderIn) -> Result<i64> {
    let row = sqlx::query(
        r#"
        insert into orders (order_id, trader_name, symbol, side, price, size, status, filled_qty, avg_price)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        returning id
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.trader_name)
    .bind(&order.symbol)
    .bind(order.side.as_str())
    .bind(order.price)
    .bind(order.size)
    .bind(&order.status)
    .bind(order.filled_qty)
    .bind(order.avg_price)
    .fetch_one(pool)
    .await
    .context("insert order failed")?;
    Ok(row.try_get("id")?)
}

#[derive(Debug, Clone)]
pub struct SignalRow {
    pub id: i64,
    pub trader_name: String,
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub total_score: f64,
    pub scores: Value,
    pub regime: String,
    pub action: String,
    pub reason_codes: Value,
}

pub async fn list_signals(
    pool: &PgPool,
    trader_name: Option<&str>,
    limit: i64,
) -> Result<Vec<SignalRow>> {
    let rows = sqlx::query(
        r#"
        select id, trader_name, symbol, ts, total_score, scores_json, regime, action, reason_codes_json
        from signals
        where ($1::text is null or trader_name = $1)
        order by ts desc
        limit $2
        "#,
    )
    .bind(trader_name)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
    .context("list signals failed")?;

    rows.iter()
        .map(|r| {
            Ok(SignalRow {
                id: r.try_get("id")?,
                trader_name: r.try_get("trader_name")?,
                symbol: r.try_get("symbol")?,
                ts: r.try_get("ts")?,
                total_score: r.try_get("total_score")?,
                scores: r.try_get("scores_json")?,
                regime: r.try_get("regime")?,
                action: r.try_get("action")?,
                reason_codes: r.try_get("reason_codes_json")?,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FilledOrderRow {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub size: f64,
    pub filled_qty: f64,
    pub avg_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// FILLED orders for one trader, oldest first (replay order).
pub async fn filled_orders(pool: &PgPool, trader_name: &str) -> Result<Vec<FilledOrderRow>> {
    let rows = sqlx::query(
        r#"
        select order_id, symbol, side, price, size, filled_qty, avg_price, created_at
        from orders
        where trader_name = $1 and status = 'FILLED'
        order by created_at asc, id asc
        "#,
    )
    .bind(trader_name)
    .fetch_all(pool)
    .await
    .context("filled orders query failed")?;

    rows.iter()
        .map(|r| {
            Ok(FilledOrderRow {
                order_id: r.try_get("order_id")?,
                symbol: r.try_get("symbol")?,
                side: r.try_get("side")?,
                price: r.try_get("price")?,
                size: r.try_get("size")?,
                filled_qty: r.try_get("filled_qty")?,
                avg_price: r.try_get("avg_price")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

/// Recent FILLED orders newest-first (the dashboard's trade view).
pub async fn list_trades(
    pool: &PgPool,
    trader_name: Option<&str>,
    limit: i64,
) -> Result<Vec<FilledOrderRow>> {
    let rows = sqlx::query(
        r#"
        select order_id, symbol, side, price, size, filled_qty, avg_price, created_at
        from orders
        where status = 'FILLED' and ($1::text is null or trader_name = $1)
        order by created_at desc
        limit $2
        "#,
    )
    .bind(trader_name)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
    .context("list trades failed")?;

    rows.iter()
        .map(|r| {
            Ok(FilledOrderRow {
                order_id: r.try_get("order_id")?,
                symbol: r.try_get("symbol")?,
                side: r.try_get("side")?,
                price: r.try_get("price")?,
                size: r.try_get("size")?,
                filled_qty: r.try_get("filled_qty")?,
                avg_price: r.try_get("avg_price")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

/// Replay FILLED orders into current holdings. BUY accumulates quantity and
/// blends the average entry price; SELL decrements, floored at zero (the
/// average resets when flat). Only positive quantities are returned, so
/// reconstructed holdings are non-negative by construction.
pub fn replay_holdings(orders: &[FilledOrderRow]) -> Vec<HoldingView> {
    #[derive(Default)]
    struct Acc {
        qty: f64,
        avg_entry_price: f64,
        last_ts: Option<DateTime<Utc>>,
    }

    let mut book: BTreeMap<String, Acc> = BTreeMap::new();

    for order in orders {
        let qty = if order.filled_qty > 0.0 { order.filled_qty } else { order.size };
        let price = order.avg_price.unwrap_or(order.price);
        if qty <= 0.0 || price <= 0.0 {
            continue;
        }

        let acc = book.entry(order.symbol.clone()).or_default();
        match order.side.as_str() {
            "BUY" => {
                let new_qty = acc.qty + qty;
                acc.avg_entry_price = if new_qty > 0.0 {
                    (acc.avg_entry_price * acc.qty + price * qty) / new_qty
                } else {
                    0.0
                };
                acc.qty = new_qty;
            }
            "SELL" => {
                acc.qty = (acc.qty - qty).max(0.0);
                if acc.qty == 0.0 {
                    acc.avg_entry_price = 0.0;
                }
            }
            _ => continue,
        }
        acc.last_ts = Some(order.created_at);
    }

    book.into_iter()
        .filter(|(_, acc)| acc.qty > 0.0)
        .map(|(market, acc)| HoldingView {
            market,
            qty: acc.qty,
            avg_entry_price: acc.avg_entry_price,
            last_ts: acc.last_ts,
        })
        .collect()
}

/// Reconstructed holdings for a trader, straight from the ledger.
pub async fn holdings(pool: &PgPool, trader_name: &str) -> Result<Vec<HoldingView>> {
    let orders = filled_orders(pool, trader_name).await?;
    Ok(replay_holdings(&orders))
}
