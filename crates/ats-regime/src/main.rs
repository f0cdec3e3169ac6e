//! Regime classifier worker.
//!
//! On each tick: sample candles, compute market-wide metrics, classify,
//! POST the snapshot to the Control Store. A failed tick is logged and
//! retried on the next interval; this process never trades.

use std::sync::Arc;
use std::time::Duration;

use ats_exchange::{ClientConfig, UpbitClient};
use ats_regime::{classify, compute_metrics, BREADTH_MARKETS};
use ats_schemas::{Candle, RegimeSnapshotIn};
use tracing::{error, info, warn};

struct Config {
    api_base: String,
    market: String,
    interval: Duration,
}

impl Config {
    fn from_env() -> Self {
        let env = |name: &str, default: &str| {
            std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
        };
        Self {
            api_base: env("DASHBOARD_API_BASE", "http://dashboard-api:8000"),
            market: env("MARKET", "KRW-BTC"),
            interval: Duration::from_secs(
                env("REGIME_INTERVAL_SEC", "300").parse().unwrap_or(300),
            ),
        }
    }
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
    let http = store_http_client(Duration::from_secs(5))?;

    info!("regime classifier started (market={}, interval={:?})", config.market, config.interval);

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = run_tick(&exchange, &http, &config).await {
            error!("regime tick failed: {e:#}");
        }
    }
}

async fn run_tick(
    exchange: &UpbitClient,
    http: &reqwest::Client,
    config: &Config,
) -> anyhow::Result<()> {
    let btc_4h = fetch_or_empty(exchange, &config.market, 240, 200).await;
    let btc_5m = fetch_or_empty(exchange, &config.market, 5, 100).await;

    let mut market_hourlies = Vec::with_capacity(BREADTH_MARKETS.len());
    for market in BREADTH_MARKETS {
        market_hourlies.push(fetch_or_empty(exchange, market, 60, 24).await);
    }

    let metrics = compute_metrics(&btc_4h, &btc_5m, &market_hourlies);
    let (regime, confidence) = classify(&metrics);
    info!(
        regime = regime.as_str(),
        confidence,
        adx = metrics.btc_adx_4h,
        atr_pct = metrics.btc_atr_pct_4h,
        whipsaw = metrics.whipsaw_5m,
        "classified"
    );

    let snapshot = RegimeSnapshotIn {
        market: config.market.clone(),
        regime_id: regime.id(),
        regime_label: regime.as_str().to_string(),
        confidence,
        metrics: metrics.to_json(),
    };

    let resp = http
        .post(format!("{}/api/regimes/snapshot", config.api_base))
        .json(&snapshot)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("snapshot rejected: HTTP {}", resp.status());
    }
    Ok(())
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

async fn fetch_or_empty(exchange: &UpbitClient, market: &str, unit: u32, count: u32) -> Vec<Candle> {
    match exchange.get_candles_minutes(market, unit, count).await {
        Ok(candles) => candles,
        Err(e) => {
            warn!(%market, unit, "candle fetch failed: {e}");
            Vec::new()
        }
    }
}
