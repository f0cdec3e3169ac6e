//! Model lifecycle endpoints.
//!
//! ```text
//! DRAFT ─validate→ VALIDATED ─deploy→ PAPER_DEPLOYED ─(24h ∧ no rollback)→
//! LIVE_ELIGIBLE ─arm→ LIVE_ARMED ─rollback→ DRAFT
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use ats_db::{models, safety, traders, trainer as trainer_db};
use ats_eval::{
    check_drift, compute_metrics, evaluate_model, rollback_reason, GateDecision, RollbackInputs,
    RoundTripCost,
};
use ats_schemas::ModelStatus;

use crate::api_types::{
    ItemsResponse, LifecycleResponse, ModelCreateReq, ModelCreatedResponse, ModelView, RollbackReq,
};
use crate::lifecycle;
use crate::routes::{ApiError, ApiResult, AppState};

fn to_view(r: &models::ModelVersionRow) -> ModelView {
    ModelView {
        id: r.id,
        strategy_id: r.strategy_id.clone(),
        version: r.version.clone(),
        status: r.status.as_str().to_string(),
        metrics: r.metrics.clone(),
        created_at: r.created_at,
        deployed_at: r.deployed_at,
        rolled_back_at: r.rolled_back_at,
        rollback_reason: r.rollback_reason.clone(),
    }
}

async fn load(st: &AppState, id: i64) -> ApiResult<models::ModelVersionRow> {
    models::fetch(&st.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))
}

pub(crate) async fn list(State(st): State<Arc<AppState>>) -> ApiResult<Json<ItemsResponse<ModelView>>> {
    let rows = models::list(&st.pool).await?;
    Ok(Json(ItemsResponse { items: rows.iter().map(to_view).collect() }))
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ModelCreateReq>,
) -> ApiResult<Json<ModelCreatedResponse>> {
    let id = models::insert(&st.pool, &req.strategy_id, &req.version, &req.metrics).await?;
    Ok(Json(ModelCreatedResponse { created: true, id }))
}

/// DRAFT → VALIDATED when the gate PASSes over the strategy's latest
/// labeled snapshots; REJECT records the reason, HOLD leaves DRAFT.
pub(crate) async fn validate(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    if model.status != ModelStatus::Draft {
        return Err(ApiError::bad_request(format!(
            "현재 상태 {}에서 VALIDATED 전환 불가",
            model.status.as_str()
        )));
    }

    let labels = match trainer_db::latest_scan_run(&st.pool, &model.strategy_id).await? {
        Some(run) => trainer_db::snapshots_for_run(&st.pool, run.id)
            .await?
            .into_iter()
            .map(|s| s.labels)
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };

    let metrics = compute_metrics(&labels, RoundTripCost::default());
    let (decision, reason) = evaluate_model(metrics.as_ref());

    let metrics_json = match metrics {
        Some(m) => serde_json::to_value(m).unwrap_or_else(|_| serde_json::json!({})),
        None => serde_json::json!({}),
    };
    models::set_metrics(&st.pool, id, &metrics_json).await?;

    let status = match decision {
        GateDecision::Pass => {
            models::set_status(&st.pool, id, ModelStatus::Validated).await?;
            st.notifier
                .send("INFO", &format!("[{}] 모델 VALIDATED: {reason}", model.strategy_id))
                .await;
            ModelStatus::Validated
        }
        GateDecision::Reject => {
            models::mark_rolled_back(&st.pool, id, &format!("평가 실패: {reason}")).await?;
            st.notifier
                .send("WARN", &format!("[{}] 모델 평가 실패: {reason}", model.strategy_id))
                .await;
            ModelStatus::Draft
        }
        GateDecision::Hold => ModelStatus::Draft,
    };

    Ok(Json(LifecycleResponse {
        ok: decision == GateDecision::Pass,
        status: status.as_str().to_string(),
        message: Some(reason),
    }))
}

/// VALIDATED → PAPER_DEPLOYED, subject to the 24h redeploy cooldown.
pub(crate) async fn deploy(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    if model.status != ModelStatus::Validated {
        return Err(ApiError::bad_request(format!(
            "현재 상태 {}에서 PAPER_DEPLOYED 전환 불가. 먼저 VALIDATE 필요",
            model.status.as_str()
        )));
    }
    if let Some(remaining) = lifecycle::redeploy_cooldown_remaining_h(model.deployed_at, Utc::now())
    {
        return Err(ApiError::bad_request(format!("재배포 쿨다운 {remaining:.1}시간 남음")));
    }

    models::mark_deployed(&st.pool, id).await?;
    st.notifier
        .send(
            "INFO",
            &format!("[{}] 모델 PAPER 배포됨 (24h 보호기간 시작)", model.strategy_id),
        )
        .await;
    Ok(Json(LifecycleResponse {
        ok: true,
        status: ModelStatus::PaperDeployed.as_str().to_string(),
        message: None,
    }))
}

/// Gather the current auto-rollback inputs for one model.
async fn rollback_inputs(st: &AppState, model: &models::ModelVersionRow) -> ApiResult<RollbackInputs> {
    let net_return_24h = models::latest_net_return_24h(&st.pool, model.id).await?;
    let drift_warn_count = models::latest_baseline(&st.pool, &model.strategy_id)
        .await?
        .map(|b| b.drift_warn_count)
        .unwrap_or(0);

    let mut max_consecutive_losses = 0;
    for trader in traders::list_by_strategy(&st.pool, &model.strategy_id).await? {
        if let Some(row) = safety::fetch(&st.pool, &trader.name).await? {
            max_consecutive_losses = max_consecutive_losses.max(row.counters.consecutive_losses);
        }
    }

    Ok(RollbackInputs { net_return_24h, drift_warn_count, max_consecutive_losses })
}

async fn auto_rollback(st: &AppState, model: &models::ModelVersionRow, reason: &str) -> ApiResult<()> {
    let full = format!("AUTO_ROLLBACK: {reason}");
    models::mark_rolled_back(&st.pool, model.id, &full).await?;
    st.notifier
        .send("CRITICAL", &format!("[{}] 자동 롤백 실행: {reason}", model.strategy_id))
        .await;
    Ok(())
}

/// PAPER_DEPLOYED → LIVE_ELIGIBLE after the 24h soak, unless an
/// auto-rollback trigger fires first (which sends the model back to DRAFT).
pub(crate) async fn check_eligible(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    if model.status != ModelStatus::PaperDeployed {
        return Ok(Json(LifecycleResponse {
            ok: false,
            status: model.status.as_str().to_string(),
            message: Some("PAPER_DEPLOYED 상태가 아님".to_string()),
        }));
    }

    match lifecycle::paper_soak_elapsed(model.deployed_at, Utc::now()) {
        Err(remaining) => Ok(Json(LifecycleResponse {
            ok: false,
            status: model.status.as_str().to_string(),
            message: Some(format!("{remaining:.1}시간 남음")),
        })),
        Ok(()) => {
            let inputs = rollback_inputs(&st, &model).await?;
            if let Some(reason) = rollback_reason(&inputs) {
                auto_rollback(&st, &model, &reason).await?;
                return Ok(Json(LifecycleResponse {
                    ok: false,
                    status: ModelStatus::Draft.as_str().to_string(),
                    message: Some(format!("자동 롤백: {reason}")),
                }));
            }
            models::set_status(&st.pool, id, ModelStatus::LiveEligible).await?;
            st.notifier
                .send(
                    "INFO",
                    &format!("[{}] 모델 LIVE_ELIGIBLE 전환 (24h PAPER 완료)", model.strategy_id),
                )
                .await;
            Ok(Json(LifecycleResponse {
                ok: true,
                status: ModelStatus::LiveEligible.as_str().to_string(),
                message: Some("LIVE_ELIGIBLE로 전환됨".to_string()),
            }))
        }
    }
}

/// LIVE_ELIGIBLE (or freshly eligible PAPER_DEPLOYED) → LIVE_ARMED.
pub(crate) async fn arm(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    match model.status {
        ModelStatus::LiveEligible => {}
        ModelStatus::PaperDeployed => {
            // attempt the eligibility transition in-line
            let result = check_eligible(State(Arc::clone(&st)), Path(id)).await?;
            if !result.0.ok {
                return Err(ApiError::bad_request(
                    result.0.message.unwrap_or_else(|| "LIVE_ELIGIBLE 전환 실패".to_string()),
                ));
            }
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "현재 상태 {}에서 LIVE_ARMED 불가",
                other.as_str()
            )));
        }
    }

    models::set_status(&st.pool, id, ModelStatus::LiveArmed).await?;
    st.notifier
        .send("WARN", &format!("[{}] 모델 LIVE_ARMED - LIVE 거래 가능", model.strategy_id))
        .await;
    Ok(Json(LifecycleResponse {
        ok: true,
        status: ModelStatus::LiveArmed.as_str().to_string(),
        message: None,
    }))
}

/// Manual rollback to DRAFT.
pub(crate) async fn rollback(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RollbackReq>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    let reason = if req.reason.is_empty() { "manual rollback".to_string() } else { req.reason };
    models::mark_rolled_back(&st.pool, id, &reason).await?;
    st.notifier
        .send("WARN", &format!("[{}] 모델 롤백: {reason}", model.strategy_id))
        .await;
    Ok(Json(LifecycleResponse {
        ok: true,
        status: ModelStatus::Draft.as_str().to_string(),
        message: Some(reason),
    }))
}

// ---------------------------------------------------------------------------
// Baseline / drift endpoints (trainer-facing)
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
pub(crate) struct BaselineReq {
    #[serde(default = "ats_schemas::default_json_object")]
    pub metrics: serde_json::Value,
}

/// Pin the model as its strategy's 14-day reference baseline.
pub(crate) async fn pin_baseline(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<BaselineReq>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    models::insert_baseline(&st.pool, &model.strategy_id, id, &req.metrics).await?;
    Ok(Json(LifecycleResponse {
        ok: true,
        status: model.status.as_str().to_string(),
        message: Some("baseline pinned".to_string()),
    }))
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct Metrics24hReq {
    pub net_return_24h: f64,
    #[serde(default = "ats_schemas::default_json_object")]
    pub metrics: serde_json::Value,
}

/// Record one 24h rolling metrics observation for the model.
pub(crate) async fn record_metrics_24h(
    State(st): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<Metrics24hReq>,
) -> ApiResult<Json<LifecycleResponse>> {
    let model = load(&st, id).await?;
    models::insert_metrics_24h(&st.pool, id, &model.strategy_id, req.net_return_24h, &req.metrics)
        .await?;
    Ok(Json(LifecycleResponse {
        ok: true,
        status: model.status.as_str().to_string(),
        message: None,
    }))
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct DriftCheckReq {
    pub strategy_id: String,
    pub sharpe: f64,
    pub mean_return: f64,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct DriftCheckResponse {
    pub drifted: bool,
    pub warning: Option<String>,
}

/// Trainer-driven drift check against the strategy's pinned baseline.
pub(crate) async fn drift_check(
    State(st): State<Arc<AppState>>,
    Json(req): Json<DriftCheckReq>,
) -> ApiResult<Json<DriftCheckResponse>> {
    let warning = record_drift_check(&st, &req.strategy_id, req.sharpe, req.mean_return).await?;
    Ok(Json(DriftCheckResponse { drifted: warning.is_some(), warning }))
}

/// Compare fresh metrics against the pinned baseline and bump the warning
/// counter when degraded.
async fn record_drift_check(
    st: &AppState,
    strategy_id: &str,
    current_sharpe: f64,
    current_mean_return: f64,
) -> ApiResult<Option<String>> {
    let Some(baseline) = models::latest_baseline(&st.pool, strategy_id).await? else {
        return Ok(None);
    };
    let baseline_sharpe = baseline.baseline_metrics["sharpe"].as_f64().unwrap_or(0.0);
    let baseline_return = baseline.baseline_metrics["mean_return"].as_f64().unwrap_or(0.0);

    let drift = check_drift(baseline_sharpe, baseline_return, current_sharpe, current_mean_return);
    if !drift.drifted {
        return Ok(None);
    }

    models::bump_drift_warn(&st.pool, baseline.id).await?;
    let warning = drift.warnings.join("; ");
    st.notifier
        .send("WARN", &format!("[{strategy_id}] Drift 경고: {warning}"))
        .await;
    Ok(Some(warning))
}
