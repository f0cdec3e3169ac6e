//! Axum router and handler modules for the Control Store.
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! after this call so tests can drive the bare router.

pub mod configs;
pub mod credentials;
pub mod events;
pub mod models;
pub mod regimes;
pub mod safety;
pub mod traders;
pub mod trades;
pub mod trainer;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tracing::error;

use crate::api_types::{ErrorResponse, HealthResponse};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // traders
        .route("/api/traders", get(traders::list).post(traders::create))
        .route("/api/traders/:name", get(traders::get).delete(traders::remove))
        .route("/api/traders/:name/arm", post(traders::arm))
        .route("/api/traders/:name/run", post(traders::run))
        .route("/api/traders/:name/stop", post(traders::stop))
        .route("/api/traders/:name/heartbeat", post(traders::heartbeat))
        // credentials
        .route("/api/credentials", get(credentials::list).post(credentials::create))
        .route("/api/credentials/:name", delete(credentials::remove))
        .route("/api/credentials/:name/decrypt", get(credentials::decrypt))
        // regimes
        .route("/api/regimes/snapshot", post(regimes::post_snapshot))
        .route("/api/regimes/snapshots", get(regimes::list_snapshots))
        .route("/api/regimes/regime-weight/:label", get(regimes::regime_weight))
        .route("/api/regimes/weight/:label/:strategy", get(regimes::bandit_weight))
        .route("/api/regimes/entry-blocked", get(regimes::entry_blocked))
        // trades
        .route("/api/trades", get(trades::list_trades))
        .route("/api/trades/signal", post(trades::post_signal))
        .route("/api/trades/order", post(trades::post_order))
        .route("/api/trades/signals", get(trades::list_signals))
        .route("/api/trades/holdings", get(trades::holdings))
        // safety
        .route("/api/safety", get(safety::list))
        .route("/api/safety/:name", get(safety::get))
        .route("/api/safety/:name/update_pnl", post(safety::update_pnl))
        .route("/api/safety/:name/slippage", post(safety::slippage))
        .route("/api/safety/:name/api-error", post(safety::api_error))
        .route("/api/safety/:name/db-error", post(safety::db_error))
        .route("/api/safety/:name/entry-allowed", get(safety::entry_allowed))
        .route("/api/safety/:name/reset", post(safety::reset))
        // models
        .route("/api/models", get(models::list).post(models::create))
        .route("/api/models/:id/validate", post(models::validate))
        .route("/api/models/:id/deploy", post(models::deploy))
        .route("/api/models/:id/check_eligible", post(models::check_eligible))
        .route("/api/models/:id/arm", post(models::arm))
        .route("/api/models/:id/rollback", post(models::rollback))
        .route("/api/models/:id/baseline", post(models::pin_baseline))
        .route("/api/models/:id/metrics-24h", post(models::record_metrics_24h))
        .route("/api/models/drift-check", post(models::drift_check))
        // configs
        .route("/api/configs", get(configs::list).post(configs::create))
        .route("/api/configs/:id/activate", post(configs::activate))
        // trainer
        .route("/api/trainer/scan", post(trainer::scan))
        .route("/api/trainer/update-labels", post(trainer::update_labels))
        .route("/api/trainer/evaluate", post(trainer::evaluate))
        .route("/api/trainer/tune", post(trainer::tune))
        .route("/api/trainer/bandit-update", post(trainer::bandit_update))
        // events
        .route("/api/events", get(events::list).post(events::create))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error plumbing
// ---------------------------------------------------------------------------

/// Uniform error response: `{"detail": "..."}` with the given status.
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, detail: detail.into() }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, detail: detail.into() }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("internal error: {e:#}");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, detail: "internal error".to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// API-key auth (optional)
// ---------------------------------------------------------------------------

/// When `API_KEY` is configured, every request must carry it in `X-API-Key`.
/// Left unset, the surface is open (dev / trusted-network deployments).
pub async fn require_api_key(
    State(st): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &st.settings.api_key {
        let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse { detail: "invalid api key".to_string() }),
            )
                .into_response();
        }
    }
    next.run(req).await
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = ats_db::status(&st.pool).await.map(|s| s.ok).unwrap_or(false);
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: "ats-store",
            version: env!("CARGO_PKG_VERSION"),
            db_ok,
        }),
    )
}
