//! Regime snapshots and the two weighting endpoints.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use ats_db::{bandit, regimes, safety, traders};
use ats_schemas::{Regime, RegimeSnapshotIn, RegimeSnapshotView};
use ats_weights::BanditPosterior;

use crate::api_types::{
    BanditWeightResponse, EntryBlockedResponse, ItemsResponse, OkResponse, RegimeWeightResponse,
};
use crate::routes::{ApiError, ApiResult, AppState};

pub(crate) async fn post_snapshot(
    State(st): State<Arc<AppState>>,
    Json(req): Json<RegimeSnapshotIn>,
) -> ApiResult<Json<OkResponse>> {
    regimes::append(
        &st.pool,
        &req.market,
        req.regime_id,
        &req.regime_label,
        req.confidence,
        &req.metrics,
    )
    .await?;

    ats_db::events::insert(
        &st.pool,
        None,
        "INFO",
        "regime",
        &format!("{} {} conf={:.2}", req.market, req.regime_label, req.confidence),
    )
    .await?;

    // PANIC alert + trader auto-block fire once per episode; any non-PANIC
    // snapshot re-arms them
    if req.regime_label == Regime::Panic.as_str() {
        if !st.panic_notified.swap(true, Ordering::SeqCst) {
            st.notifier
                .send(
                    "CRITICAL",
                    &format!(
                        "PANIC 레짐 감지: {} (신뢰도 {:.0}%)",
                        req.market,
                        req.confidence * 100.0
                    ),
                )
                .await;
            block_all_traders_on_panic(&st).await?;
        }
    } else {
        st.panic_notified.store(false, Ordering::SeqCst);
    }

    Ok(Json(OkResponse { ok: true }))
}

/// PANIC trips the Runtime Guard for every trader still unblocked. Only the
/// transition into the block alerts; already-blocked traders are untouched.
async fn block_all_traders_on_panic(st: &AppState) -> ApiResult<()> {
    for trader in traders::list(&st.pool).await? {
        let (_, tripped) =
            safety::mutate_counters(&st.pool, &trader.name, false, |c| c.record_panic()).await?;
        if tripped.is_some() {
            st.notifier
                .send("CRITICAL", &format!("[{}] PANIC 레짐으로 인한 자동 차단", trader.name))
                .await;
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub(crate) async fn list_snapshots(
    State(st): State<Arc<AppState>>,
    Query(q): Query<SnapshotsQuery>,
) -> ApiResult<Json<ItemsResponse<RegimeSnapshotView>>> {
    let rows = regimes::latest(&st.pool, q.limit).await?;
    Ok(Json(ItemsResponse {
        items: rows
            .into_iter()
            .map(|r| RegimeSnapshotView {
                ts: r.ts,
                market: r.market,
                regime_id: r.regime_id,
                regime_label: r.regime_label,
                confidence: r.confidence,
                metrics: r.metrics,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegimeWeightQuery {
    #[serde(default = "default_base_weight")]
    base_weight: f64,
    #[serde(default = "default_market")]
    market: String,
}

fn default_base_weight() -> f64 {
    1.0
}

fn default_market() -> String {
    "KRW-BTC".to_string()
}

/// `applied = 1 + (w − 1)·confidence`, with CHOP/PANIC hard-zeroed. The
/// confidence comes from the market's current snapshot when its label
/// matches; otherwise a neutral 0.5 is assumed.
pub(crate) async fn regime_weight_handler_inner(
    st: &AppState,
    label: &str,
    base_weight: f64,
    market: &str,
) -> ApiResult<f64> {
    let regime =
        Regime::parse(label).ok_or_else(|| ApiError::bad_request("unknown regime label"))?;

    let confidence = match regimes::current(&st.pool, market).await? {
        Some(snap) if snap.regime_label == regime.as_str() => snap.confidence,
        _ => 0.5,
    };
    Ok(ats_weights::regime_weight(regime, confidence, base_weight))
}

pub(crate) async fn regime_weight(
    State(st): State<Arc<AppState>>,
    Path(label): Path<String>,
    Query(q): Query<RegimeWeightQuery>,
) -> ApiResult<Json<RegimeWeightResponse>> {
    let applied = regime_weight_handler_inner(&st, &label, q.base_weight, &q.market).await?;
    Ok(Json(RegimeWeightResponse {
        regime: label,
        base_weight: q.base_weight,
        applied_weight: (applied * 10_000.0).round() / 10_000.0,
    }))
}

/// Thompson-sampled bandit weight in [0.5, 1.5]; a missing posterior row
/// samples as neutral 1.0.
pub(crate) async fn bandit_weight(
    State(st): State<Arc<AppState>>,
    Path((label, strategy)): Path<(String, String)>,
) -> ApiResult<Json<BanditWeightResponse>> {
    let weight = match bandit::fetch(&st.pool, &label, &strategy).await? {
        Some(row) => {
            let posterior = BanditPosterior::new(row.alpha, row.beta);
            posterior.sample_weight(&mut rand::thread_rng())
        }
        None => 1.0,
    };
    Ok(Json(BanditWeightResponse {
        regime: label,
        strategy_id: strategy,
        weight: (weight * 10_000.0).round() / 10_000.0,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntryBlockedQuery {
    #[serde(default = "default_market")]
    market: String,
}

/// Whether the market's current regime forbids new entries.
pub(crate) async fn entry_blocked(
    State(st): State<Arc<AppState>>,
    Query(q): Query<EntryBlockedQuery>,
) -> ApiResult<Json<EntryBlockedResponse>> {
    let current = regimes::current(&st.pool, &q.market).await?;
    let response = match current {
        Some(snap) => match Regime::parse(&snap.regime_label) {
            Some(regime) if regime.blocks_entries() => EntryBlockedResponse {
                blocked: true,
                reason: format!("{} 레짐: 신규 진입 금지", regime.as_str()),
            },
            _ => EntryBlockedResponse { blocked: false, reason: String::new() },
        },
        None => EntryBlockedResponse { blocked: false, reason: String::new() },
    };
    Ok(Json(response))
}
