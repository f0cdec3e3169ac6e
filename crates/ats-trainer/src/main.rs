//! Trainer worker.
//!
//! Periodic offline loop: scan the top markets into feature snapshots,
//! label the previous scan once its forward window has elapsed, evaluate
//! the latest labeled run against the gate, tune, and drive the model
//! lifecycle (24h metrics, drift checks, eligibility) through the Control
//! Store. This process never submits orders.

use std::sync::Arc;
use std::time::Duration;

use ats_exchange::{ClientConfig, UpbitClient};
use ats_schemas::Candle;
use ats_trainer::{compute_features, compute_labels};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

const SCAN_MARKET_COUNT: usize = 20;
const LABEL_HORIZON_MIN: i64 = 240;

struct Config {
    api_base: String,
    strategy_id: String,
    interval: Duration,
}

impl Config {
    fn from_env() -> Self {
        let env = |name: &str, default: &str| {
            std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
        };
        Self {
            api_base: env("DASHBOARD_API_BASE", "http://dashboard-api:8000"),
            strategy_id: env("TRAINER_STRATEGY_ID", "standard"),
            interval: Duration::from_secs(
                env("TRAINER_INTERVAL_SEC", "3600").parse().unwrap_or(3600),
            ),
        }
    }
}

/// One completed scan awaiting its labeling pass.
struct PendingScan {
    scan_run_id: i64,
    scanned_at: DateTime<Utc>,
    /// (snapshot_id, market, entry_price)
    entries: Vec<(i64, String, f64)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let exchange = Arc::new(UpbitClient::new(ClientConfig::default()));
    let http = store_http_client(Duration::from_secs(10))?;

    info!(strategy = %config.strategy_id, interval = ?config.interval, "trainer started");

    let mut pending: Option<PendingScan> = None;
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        // label the previous scan first so evaluation sees fresh labels
        if let Some(scan) = pending.take() {
            if (Utc::now() - scan.scanned_at).num_minutes() >= LABEL_HORIZON_MIN {
                if let Err(e) = label_scan(&exchange, &http, &config, &scan).await {
                    error!("labeling failed: {e:#}");
                    pending = Some(scan);
                }
            } else {
                pending = Some(scan);
            }
        }

        match run_scan(&exchange, &http, &config).await {
            Ok(scan) => {
                // only one scan awaits labeling at a time; evaluation always
                // works off the latest labeled run
                if pending.is_none() {
                    pending = Some(scan);
                }
            }
            Err(e) => error!("scan failed: {e:#}"),
        }

        if let Err(e) = evaluate_and_advance(&http, &config).await {
            error!("evaluation pass failed: {e:#}");
        }
    }
}

/// HTTP client for the Control Store; carries `X-API-Key` when configured.
fn store_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(key) = std::env::var("API_KEY").ok().filter(|k| !k.is_empty()) {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-API-Key", reqwest::header::HeaderValue::from_str(&key)?);
        builder = builder.default_headers(headers);
    }
    Ok(builder.build()?)
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

async fn top_markets(exchange: &UpbitClient, count: usize) -> anyhow::Result<Vec<String>> {
    let markets = exchange.get_krw_markets().await?;
    let tickers = exchange.get_tickers(&markets).await?;
    let mut ranked: Vec<(String, f64)> = tickers
        .into_iter()
        .map(|(m, t)| (m, t.acc_trade_price_24h))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(ranked.into_iter().take(count).map(|(m, _)| m).collect())
}

async fn run_scan(
    exchange: &UpbitClient,
    http: &reqwest::Client,
    config: &Config,
) -> anyhow::Result<PendingScan> {
    let markets = top_markets(exchange, SCAN_MARKET_COUNT).await?;

    let mut snapshots = Vec::new();
    let mut entry_prices = Vec::new();
    for market in &markets {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let candles: Vec<Candle> = match exchange.get_candles_minutes(market, 60, 200).await {
            Ok(c) if !c.is_empty() => c,
            _ => continue,
        };
        let features = compute_features(&candles);
        if features.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            continue;
        }
        entry_prices.push((market.clone(), candles[candles.len() - 1].close));
        snapshots.push(json!({ "market": market, "features": features }));
    }
    anyhow::ensure!(!snapshots.is_empty(), "no scannable markets");

    #[derive(Deserialize)]
    struct ScanResp {
        scan_run_id: i64,
        snapshot_ids: Vec<i64>,
    }

    let resp: ScanResp = http
        .post(format!("{}/api/trainer/scan", config.api_base))
        .json(&json!({
            "strategy_id": config.strategy_id,
            "top_n": 5,
            "params": {},
            "snapshots": snapshots,
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    info!(scan_run_id = resp.scan_run_id, count = resp.snapshot_ids.len(), "scan persisted");

    let entries = resp
        .snapshot_ids
        .into_iter()
        .zip(entry_prices)
        .map(|(id, (market, price))| (id, market, price))
        .collect();
    Ok(PendingScan { scan_run_id: resp.scan_run_id, scanned_at: Utc::now(), entries })
}

// ---------------------------------------------------------------------------
// Labeling
// ---------------------------------------------------------------------------

async fn label_scan(
    exchange: &UpbitClient,
    http: &reqwest::Client,
    config: &Config,
    scan: &PendingScan,
) -> anyhow::Result<()> {
    let mut labels = Vec::new();
    for (snapshot_id, market, entry_price) in &scan.entries {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let candles = match exchange.get_candles_minutes(market, 60, 8).await {
            Ok(c) => c,
            Err(e) => {
                warn!(%market, "label candle fetch failed: {e}");
                continue;
            }
        };
        // bars strictly after the scan instant
        let forward: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.ts > scan.scanned_at.timestamp())
            .collect();
        let computed = compute_labels(*entry_price, &forward);

        let mut row = serde_json::to_value(computed)?;
        row["snapshot_id"] = json!(snapshot_id);
        labels.push(row);
    }
    anyhow::ensure!(!labels.is_empty(), "nothing to label");
    let count = labels.len();

    http.post(format!("{}/api/trainer/update-labels", config.api_base))
        .json(&json!({ "scan_run_id": scan.scan_run_id, "labels": labels }))
        .send()
        .await?
        .error_for_status()?;

    info!(scan_run_id = scan.scan_run_id, count, "labels attached");
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluate → tune → lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EvaluateResp {
    status: String,
    reason: String,
    metrics: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ModelRow {
    id: i64,
    strategy_id: String,
    status: String,
}

async fn evaluate_and_advance(http: &reqwest::Client, config: &Config) -> anyhow::Result<()> {
    let eval: EvaluateResp = match http
        .post(format!("{}/api/trainer/evaluate", config.api_base))
        .json(&json!({ "strategy_id": config.strategy_id }))
        .send()
        .await?
        .error_for_status()
    {
        Ok(resp) => resp.json().await?,
        Err(e) => {
            // no scan run yet is routine on a fresh deployment
            warn!("evaluate unavailable: {e}");
            return Ok(());
        }
    };
    info!(status = %eval.status, reason = %eval.reason, "gate decision");

    if eval.status == "PASS" {
        let tuned: serde_json::Value = http
            .post(format!("{}/api/trainer/tune", config.api_base))
            .json(&json!({ "strategy_id": config.strategy_id }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(best_score = %tuned["best_score"], "tuning finished");

        // promote a fresh DRAFT through validation
        let created: serde_json::Value = http
            .post(format!("{}/api/models", config.api_base))
            .json(&json!({
                "strategy_id": config.strategy_id,
                "version": format!("auto-{}", Utc::now().format("%Y%m%d%H%M%S")),
                "metrics": eval.metrics,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(id) = created["id"].as_i64() {
            let _ = http
                .post(format!("{}/api/models/{id}/validate", config.api_base))
                .send()
                .await;
        }
    }

    // lifecycle upkeep for deployed models of this strategy
    let models: serde_json::Value = http
        .get(format!("{}/api/models", config.api_base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let rows: Vec<ModelRow> =
        serde_json::from_value(models["items"].clone()).unwrap_or_default();

    let sharpe = eval.metrics["Sharpe"].as_f64().unwrap_or(0.0);
    let mean_return = eval.metrics["E"].as_f64().unwrap_or(0.0);

    for model in rows.iter().filter(|m| m.strategy_id == config.strategy_id) {
        if model.status != "PAPER_DEPLOYED" {
            continue;
        }
        // fresh 24h observation, drift check, then the eligibility gate
        let _ = http
            .post(format!("{}/api/models/{}/metrics-24h", config.api_base, model.id))
            .json(&json!({ "net_return_24h": mean_return, "metrics": eval.metrics }))
            .send()
            .await;
        let _ = http
            .post(format!("{}/api/models/drift-check", config.api_base))
            .json(&json!({
                "strategy_id": config.strategy_id,
                "sharpe": sharpe,
                "mean_return": mean_return,
            }))
            .send()
            .await;
        let _ = http
            .post(format!("{}/api/models/{}/check_eligible", config.api_base, model.id))
            .send()
            .await;
    }

    Ok(())
}
