//! Event feed endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ats_schemas::EventIn;

use crate::api_types::{ItemsResponse, OkResponse};
use crate::routes::{ApiResult, AppState};

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<EventIn>,
) -> ApiResult<Json<OkResponse>> {
    ats_db::events::insert(
        &st.pool,
        req.trader_name.as_deref(),
        &req.level,
        &req.kind,
        &req.message,
    )
    .await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventsQuery {
    trader_name: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub(crate) struct EventView {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub trader_name: Option<String>,
    pub level: String,
    pub kind: String,
    pub message: String,
}

pub(crate) async fn list(
    State(st): State<Arc<AppState>>,
    Query(q): Query<EventsQuery>,
) -> ApiResult<Json<ItemsResponse<EventView>>> {
    let rows = ats_db::events::list(&st.pool, q.trader_name.as_deref(), q.limit).await?;
    Ok(Json(ItemsResponse {
        items: rows
            .into_iter()
            .map(|r| EventView {
                id: r.id,
                ts: r.ts,
                trader_name: r.trader_name,
                level: r.level,
                kind: r.kind,
                message: r.message,
            })
            .collect(),
    }))
}
