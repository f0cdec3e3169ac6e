//! Signal/order append endpoints and ledger-derived read views.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ats_db::trades;
use ats_schemas::{HoldingView, OrderIn, SignalIn};

use crate::api_types::ItemsResponse;
use crate::routes::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub(crate) struct CreatedResponse {
    pub ok: bool,
    pub id: i64,
}

pub(crate) async fn post_signal(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SignalIn>,
) -> ApiResult<Json<CreatedResponse>> {
    let id = trades::insert_signal(&st.pool, &req).await?;
    Ok(Json(CreatedResponse { ok: true, id }))
}

pub(crate) async fn post_order(
    State(st): State<Arc<AppState>>,
    Json(req): Json<OrderIn>,
) -> ApiResult<Json<CreatedResponse>> {
    let id = trades::insert_order(&st.pool, &req).await?;
    Ok(Json(CreatedResponse { ok: true, id }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    trader_name: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub(crate) struct SignalView {
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

pub(crate) async fn list_signals(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<ItemsResponse<SignalView>>> {
    let rows = trades::list_signals(&st.pool, q.trader_name.as_deref(), q.limit).await?;
    Ok(Json(ItemsResponse {
        items: rows
            .into_iter()
            .map(|r| SignalView {
                id: r.id,
                trader_name: r.trader_name,
                symbol: r.symbol,
                ts: r.ts,
                total_score: r.total_score,
                scores: r.scores,
                regime: r.regime,
                action: r.action,
                reason_codes: r.reason_codes,
            })
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct TradeView {
    pub order_id: String,
    pub market: String,
    pub side: String,
    pub qty: f64,
    pub price: f64,
    pub ts: DateTime<Utc>,
}

/// FILLED orders presented as executions, newest first.
pub(crate) async fn list_trades(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<ItemsResponse<TradeView>>> {
    let rows = trades::list_trades(&st.pool, q.trader_name.as_deref(), q.limit).await?;
    Ok(Json(ItemsResponse {
        items: rows
            .into_iter()
            .map(|r| TradeView {
                order_id: r.order_id,
                market: r.symbol,
                side: r.side,
                qty: if r.filled_qty > 0.0 { r.filled_qty } else { r.size },
                price: r.avg_price.unwrap_or(r.price),
                ts: r.created_at,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct HoldingsQuery {
    trader_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HoldingsResponse {
    pub trader_name: String,
    pub items: Vec<HoldingView>,
}

/// Holdings reconstructed from FILLED orders — the cold-start dedup source
/// for workers.
pub(crate) async fn holdings(
    State(st): State<Arc<AppState>>,
    Query(q): Query<HoldingsQuery>,
) -> ApiResult<Json<HoldingsResponse>> {
    let items = trades::holdings(&st.pool, &q.trader_name).await?;
    Ok(Json(HoldingsResponse { trader_name: q.trader_name, items }))
}
