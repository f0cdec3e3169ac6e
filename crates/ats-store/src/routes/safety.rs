//! Runtime Guard endpoints.
//!
//! Every mutation goes through `ats_db::safety::mutate_counters`, which
//! locks the row for the duration of the increment-and-check so concurrent
//! reports cannot double-trip. Trip reasons returned by the guard rules are
//! forwarded to Telegram as CRITICAL.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use ats_db::{safety, traders};
use ats_guard::{GuardLimits, SafetyCounters};

use crate::api_types::{
    BlockedResponse, EntryAllowedResponse, ItemsResponse, OkResponse, PnlUpdateReq, SafetyView,
    SlippageReq,
};
use crate::routes::{ApiError, ApiResult, AppState};

fn to_view(row: &safety::SafetyRow) -> SafetyView {
    SafetyView {
        trader_name: row.trader_name.clone(),
        daily_loss_krw: row.counters.daily_loss_krw,
        consecutive_losses: row.counters.consecutive_losses,
        slippage_anomaly_count: row.counters.slippage_anomaly_count,
        api_error_count: row.counters.api_error_count,
        db_error_count: row.counters.db_error_count,
        last_loss_at: row.last_loss_at,
        blocked: row.counters.blocked,
        block_reason: row.counters.block_reason.clone(),
    }
}

fn guard_limits(st: &AppState) -> GuardLimits {
    GuardLimits {
        daily_loss_limit_pct: st.settings.daily_loss_limit_pct,
        consecutive_loss_limit: st.settings.consecutive_loss_limit,
    }
}

async fn alert_if_tripped(st: &AppState, trader: &str, reason: Option<String>) {
    if let Some(reason) = reason {
        st.notifier.send("CRITICAL", &format!("[{trader}] 블록: {reason}")).await;
    }
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> ApiResult<Json<ItemsResponse<SafetyView>>> {
    let rows = safety::list(&st.pool).await?;
    Ok(Json(ItemsResponse { items: rows.iter().map(to_view).collect() }))
}

pub(crate) async fn get(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SafetyView>> {
    match safety::fetch(&st.pool, &name).await? {
        Some(row) => Ok(Json(to_view(&row))),
        // absent row = pristine counters
        None => Ok(Json(SafetyView {
            trader_name: name,
            daily_loss_krw: 0.0,
            consecutive_losses: 0,
            slippage_anomaly_count: 0,
            api_error_count: 0,
            db_error_count: 0,
            last_loss_at: None,
            blocked: false,
            block_reason: None,
        })),
    }
}

/// Accumulate realized loss and the losing streak; may trip the block.
pub(crate) async fn update_pnl(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<PnlUpdateReq>,
) -> ApiResult<Json<BlockedResponse>> {
    if req.loss_krw < 0.0 {
        return Err(ApiError::bad_request("loss_krw must be >= 0"));
    }

    let seed_krw = traders::fetch(&st.pool, &name)
        .await?
        .map(|t| t.seed_krw)
        .unwrap_or(0.0);
    let limits = guard_limits(&st);

    let (counters, tripped) =
        safety::mutate_counters(&st.pool, &name, req.consecutive, |c: &mut SafetyCounters| {
            c.record_loss(req.loss_krw, req.consecutive, seed_krw, &limits)
        })
        .await?;

    if req.loss_krw > 0.0 {
        traders::add_pnl(&st.pool, &name, -req.loss_krw).await?;
    }

    alert_if_tripped(&st, &name, tripped).await;
    Ok(Json(BlockedResponse { ok: true, blocked: counters.blocked }))
}

/// Report an execution's expected vs actual price; anomalies count toward
/// the slippage trip.
pub(crate) async fn slippage(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<SlippageReq>,
) -> ApiResult<Json<BlockedResponse>> {
    let (counters, outcome) = safety::mutate_counters(&st.pool, &name, false, |c| {
        c.record_slippage(req.expected_price, req.actual_price)
    })
    .await?;

    if outcome.anomaly && outcome.tripped.is_none() {
        st.notifier
            .send(
                "WARN",
                &format!("[{name}] Slippage 이상 감지: {:.2}%", outcome.slippage_pct),
            )
            .await;
    }
    alert_if_tripped(&st, &name, outcome.tripped).await;
    Ok(Json(BlockedResponse { ok: true, blocked: counters.blocked }))
}

pub(crate) async fn api_error(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<BlockedResponse>> {
    let (counters, tripped) =
        safety::mutate_counters(&st.pool, &name, false, |c| c.record_api_error()).await?;
    alert_if_tripped(&st, &name, tripped).await;
    Ok(Json(BlockedResponse { ok: true, blocked: counters.blocked }))
}

pub(crate) async fn db_error(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<BlockedResponse>> {
    let (counters, tripped) =
        safety::mutate_counters(&st.pool, &name, false, |c| c.record_db_error()).await?;
    alert_if_tripped(&st, &name, tripped).await;
    Ok(Json(BlockedResponse { ok: true, blocked: counters.blocked }))
}

/// Soft + hard entry gate for one trader, consulted before every ENTRY.
pub(crate) async fn entry_allowed(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<EntryAllowedResponse>> {
    let reason = safety::fetch(&st.pool, &name)
        .await?
        .and_then(|row| row.counters.entry_block_reason());
    Ok(Json(EntryAllowedResponse { allowed: reason.is_none(), reason }))
}

/// Explicit operator reset: counters to zero, block cleared.
pub(crate) async fn reset(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    if safety::fetch(&st.pool, &name).await?.is_none() {
        return Err(ApiError::not_found("not found"));
    }
    safety::mutate_counters(&st.pool, &name, false, |c| c.reset()).await?;
    st.notifier.send("INFO", &format!("[{name}] Runtime Guard 블록 해제됨")).await;
    Ok(Json(OkResponse { ok: true }))
}
