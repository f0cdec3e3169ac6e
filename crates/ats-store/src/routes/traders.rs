//! Trader CRUD and the ARM / RUN admission gates.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use ats_db::traders;
use ats_schemas::{RiskMode, RunMode, TraderStatus, TraderView};

use crate::api_types::{ItemsResponse, OkResponse, TraderCreateReq, TraderCreatedResponse, TraderRunReq};
use crate::policy;
use crate::routes::{ApiError, ApiResult, AppState};

fn to_view(row: &traders::TraderRow, protect_hours: i64) -> TraderView {
    TraderView {
        name: row.name.clone(),
        strategy: row.strategy.clone(),
        risk_mode: row.risk_mode,
        run_mode: row.run_mode,
        seed_krw: row.seed_krw,
        credential_name: row.credential_name.clone(),
        status: row.status,
        paper_started_at: row.paper_started_at,
        armed_at: row.armed_at,
        paper_protect_remaining_sec: row.paper_protect_remaining_sec(protect_hours, Utc::now()),
        pnl_krw: row.pnl_krw,
    }
}

async fn load(st: &AppState, name: &str) -> ApiResult<traders::TraderRow> {
    traders::fetch(&st.pool, name)
        .await?
        .ok_or_else(|| ApiError::not_found("trader not found"))
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> ApiResult<Json<ItemsResponse<TraderView>>> {
    let rows = traders::list(&st.pool).await?;
    let protect = st.settings.paper_protect_hours;
    Ok(Json(ItemsResponse { items: rows.iter().map(|r| to_view(r, protect)).collect() }))
}

pub(crate) async fn get(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<TraderView>> {
    let row = load(&st, &name).await?;
    Ok(Json(to_view(&row, st.settings.paper_protect_hours)))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<TraderCreateReq>,
) -> ApiResult<Json<TraderCreatedResponse>> {
    let name = req.trader_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("trader_name required"));
    }
    if traders::fetch(&st.pool, name).await?.is_some() {
        return Err(ApiError::bad_request("trader already exists"));
    }
    let risk_mode = RiskMode::parse(&req.risk_mode)
        .ok_or_else(|| ApiError::bad_request("invalid risk_mode"))?;
    let run_mode = RunMode::parse(&req.run_mode)
        .ok_or_else(|| ApiError::bad_request("invalid run_mode"))?;
    if run_mode == RunMode::Live {
        // traders are born PAPER; LIVE is earned through arm + protection
        return Err(ApiError::bad_request("새 트레이더는 PAPER로 생성해야 함"));
    }

    traders::insert(
        &st.pool,
        name,
        &req.strategy,
        risk_mode,
        run_mode,
        req.seed_krw.unwrap_or(1_000_000.0),
        req.credential_name.as_deref(),
    )
    .await?;

    ats_db::events::insert(
        &st.pool,
        Some(name),
        "INFO",
        "trader",
        &format!(
            "created (mode={}, strategy={}, risk={})",
            run_mode.as_str(),
            req.strategy,
            risk_mode.as_str()
        ),
    )
    .await?;

    Ok(Json(TraderCreatedResponse { created: true, name: name.to_string() }))
}

/// Authorize a PAPER trader for a later LIVE transition. Refused while the
/// protection window still runs.
pub(crate) async fn arm(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let row = load(&st, &name).await?;
    if let Some(denial) = policy::arm_denial(&row, st.settings.paper_protect_hours, Utc::now()) {
        return Err(ApiError::bad_request(denial));
    }
    traders::set_armed(&st.pool, &name, Utc::now()).await?;
    ats_db::events::insert(&st.pool, Some(&name), "WARN", "trader", "armed for LIVE").await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Start the trader in the requested run mode. LIVE requires an armed
/// trader whose PAPER protection has elapsed.
pub(crate) async fn run(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<TraderRunReq>,
) -> ApiResult<Json<OkResponse>> {
    let row = load(&st, &name).await?;
    let run_mode = RunMode::parse(&req.run_mode)
        .ok_or_else(|| ApiError::bad_request("invalid run_mode"))?;

    if run_mode == RunMode::Live {
        if let Some(denial) =
            policy::live_run_denial(&row, st.settings.paper_protect_hours, Utc::now())
        {
            return Err(ApiError::bad_request(denial));
        }
    }

    traders::set_run_mode_and_status(&st.pool, &name, run_mode, TraderStatus::Run).await?;
    ats_db::events::insert(
        &st.pool,
        Some(&name),
        "INFO",
        "trader",
        &format!("run requested (mode={})", run_mode.as_str()),
    )
    .await?;
    Ok(Json(OkResponse { ok: true }))
}

pub(crate) async fn stop(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    load(&st, &name).await?;
    traders::set_status(&st.pool, &name, TraderStatus::Stop).await?;
    ats_db::events::insert(&st.pool, Some(&name), "INFO", "trader", "stop requested").await?;
    Ok(Json(OkResponse { ok: true }))
}

pub(crate) async fn heartbeat(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    traders::touch_heartbeat(&st.pool, &name).await?;
    Ok(Json(OkResponse { ok: true }))
}

pub(crate) async fn remove(
    State(st): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let deleted = traders::delete(&st.pool, &name).await?;
    if deleted {
        ats_db::events::insert(&st.pool, Some(&name), "WARN", "trader", "deleted").await?;
    }
    Ok(Json(OkResponse { ok: deleted }))
}
