//! Trainer-facing endpoints: scan persistence, labeling, evaluation,
//! tuning and bandit reward updates.
//!
//! The trainer worker collects market data itself (the store never calls
//! the exchange); these endpoints own the DB side of each step.

use std::sync::Arc;

use axum::{extract::State, Json};

use ats_db::{bandit, models, trainer as trainer_db};
use ats_eval::{compute_metrics, evaluate_model, optimize, RoundTripCost};

use crate::api_types::{
    BanditUpdateReq, EvaluateReq, EvaluateResponse, OkResponse, ScanReq, ScanResponse, TuneReq,
    TuneResponse, UpdateLabelsReq, UpdateLabelsResponse,
};
use crate::routes::{ApiError, ApiResult, AppState};

/// Persist one scan batch: a ScanRun row plus one FeatureSnapshot per
/// scanned market (labels stay null until the labeling pass).
pub(crate) async fn scan(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ScanReq>,
) -> ApiResult<Json<ScanResponse>> {
    if req.snapshots.is_empty() {
        return Err(ApiError::bad_request("snapshots required"));
    }
    let scan_run_id = trainer_db::insert_scan_run(
        &st.pool,
        &req.strategy_id,
        req.snapshots.len() as i32,
        req.top_n.unwrap_or(5),
        &req.params,
    )
    .await?;

    let mut snapshot_ids = Vec::with_capacity(req.snapshots.len());
    for snap in &req.snapshots {
        let id =
            trainer_db::insert_feature_snapshot(&st.pool, scan_run_id, &snap.market, &snap.features)
                .await?;
        snapshot_ids.push(id);
    }

    Ok(Json(ScanResponse { ok: true, scan_run_id, snapshot_ids }))
}

/// Attach forward-return labels computed by the trainer.
pub(crate) async fn update_labels(
    State(st): State<Arc<AppState>>,
    Json(req): Json<UpdateLabelsReq>,
) -> ApiResult<Json<UpdateLabelsResponse>> {
    // restrict updates to snapshots of the named run
    let known: std::collections::HashSet<i64> = trainer_db::snapshots_for_run(&st.pool, req.scan_run_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    let mut updated_count = 0;
    for label in &req.labels {
        if !known.contains(&label.snapshot_id) {
            continue;
        }
        trainer_db::update_labels(&st.pool, label.snapshot_id, &label.labels).await?;
        updated_count += 1;
    }
    Ok(Json(UpdateLabelsResponse { ok: true, updated_count }))
}

/// Gate the strategy's latest scan run.
pub(crate) async fn evaluate(
    State(st): State<Arc<AppState>>,
    Json(req): Json<EvaluateReq>,
) -> ApiResult<Json<EvaluateResponse>> {
    let run = trainer_db::latest_scan_run(&st.pool, &req.strategy_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Scan run not found"))?;

    let labels: Vec<_> = trainer_db::snapshots_for_run(&st.pool, run.id)
        .await?
        .into_iter()
        .map(|s| s.labels)
        .collect();

    let metrics = compute_metrics(&labels, RoundTripCost::default());
    let (decision, reason) = evaluate_model(metrics.as_ref());

    Ok(Json(EvaluateResponse {
        ok: true,
        status: decision.as_str().to_string(),
        reason,
        metrics: serde_json::to_value(metrics).unwrap_or_default(),
    }))
}

/// Run the TPE search over the latest scan run, persisting every trial as a
/// ModelCandidate row.
pub(crate) async fn tune(
    State(st): State<Arc<AppState>>,
    Json(req): Json<TuneReq>,
) -> ApiResult<Json<TuneResponse>> {
    let run = trainer_db::latest_scan_run(&st.pool, &req.strategy_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Scan run not found"))?;

    let labels: Vec<_> = trainer_db::snapshots_for_run(&st.pool, run.id)
        .await?
        .into_iter()
        .map(|s| s.labels)
        .collect();

    let n_trials = req.n_trials.unwrap_or(ats_eval::tuner::DEFAULT_TRIALS).clamp(1, 500);
    let outcome = optimize(
        &mut rand::thread_rng(),
        &labels,
        &ats_eval::default_param_space(),
        n_trials,
        RoundTripCost::default(),
    );

    for trial in &outcome.trials {
        models::insert_candidate(
            &st.pool,
            &req.strategy_id,
            &serde_json::to_value(&trial.params).unwrap_or_default(),
            &serde_json::to_value(trial.metrics).unwrap_or_default(),
            trial.score,
            &trial.status,
        )
        .await?;
    }

    Ok(Json(TuneResponse {
        ok: true,
        best_params: serde_json::to_value(&outcome.best_params).unwrap_or_default(),
        best_score: if outcome.best_score.is_finite() { outcome.best_score } else { 0.0 },
        trial_count: outcome.trials.len(),
    }))
}

/// Reward feedback for the (regime, strategy) bandit arm.
pub(crate) async fn bandit_update(
    State(st): State<Arc<AppState>>,
    Json(req): Json<BanditUpdateReq>,
) -> ApiResult<Json<OkResponse>> {
    bandit::update(&st.pool, &req.regime, &req.strategy_id, req.reward_positive).await?;
    Ok(Json(OkResponse { ok: true }))
}
