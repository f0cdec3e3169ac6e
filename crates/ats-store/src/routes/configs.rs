//! Config versioning: insert new versions, activate exactly one per
//! strategy.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use ats_config::config_hash;
use ats_db::configs;

use crate::api_types::{ConfigCreateReq, ConfigView, ItemsResponse, OkResponse};
use crate::routes::{ApiError, ApiResult, AppState};

fn to_view(r: &configs::ConfigVersionRow) -> ConfigView {
    ConfigView {
        id: r.id,
        strategy_id: r.strategy_id.clone(),
        version: r.version,
        params: r.params.clone(),
        is_active: r.is_active,
        created_at: r.created_at,
        params_hash: config_hash(&r.params),
    }
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> ApiResult<Json<ItemsResponse<ConfigView>>> {
    let rows = configs::list(&st.pool).await?;
    Ok(Json(ItemsResponse { items: rows.iter().map(to_view).collect() }))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ConfigCreateReq>,
) -> ApiResult<Json<ConfigView>> {
    if req.strategy_id.trim().is_empty() {
        return Err(ApiError::bad_request("strategy_id required"));
    }
    if !req.params.is_object() {
        return Err(ApiError::bad_request("params must be a JSON object"));
    }
    let id = configs::insert(&st.pool, req.strategy_id.trim(), &req.params).await?;
    let rows = configs::list(&st.pool).await?;
    let row = rows
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ApiError::not_found("inserted config vanished"))?;
    Ok(Json(to_view(row)))
}

/// Activate a version; the prior active for the same strategy is cleared in
/// the same transaction so readers never see two actives.
pub(crate) async fn activate(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OkResponse>> {
    if !configs::activate(&st.pool, id).await? {
        return Err(ApiError::not_found("config version not found"));
    }
    ats_db::events::insert(
        &st.pool,
        None,
        "INFO",
        "config",
        &format!("config version {id} activated"),
    )
    .await?;
    Ok(Json(OkResponse { ok: true }))
}
