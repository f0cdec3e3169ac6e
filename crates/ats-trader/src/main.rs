//! Trader worker entry point.
//!
//! One process per configured trader. The driver sleeps a startup jitter so
//! a fleet does not hit the venue in lockstep, then loops on
//! `TRADING_INTERVAL_SEC`: load self-config, rebuild the engine when the
//! trader's shape changed, run one cycle, heartbeat, sleep. Iterations never
//! overlap and a failed iteration only costs a short sleep.

use std::sync::Arc;
use std::time::Duration;

use ats_config::Settings;
use ats_exchange::auth::UpbitPrivateClient;
use ats_exchange::{ClientConfig, OrderExecutor, UpbitClient};
use ats_schemas::{RunMode, TraderStatus};
use ats_trader::client::StoreClient;
use ats_trader::engine::{EngineIdentity, TradingEngine};
use clap::Parser;
use rand::Rng;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ats-trader", about = "Per-trader worker process")]
struct Args {
    /// Trader name as registered in the Control Store.
    #[arg(long, env = "TRADER_NAME")]
    trader_name: String,

    /// Control Store base URL.
    #[arg(long, env = "DASHBOARD_API_BASE", default_value = "http://dashboard-api:8000")]
    api_base: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::from_env();

    let store = Arc::new(StoreClient::new(args.api_base.clone()));
    let exchange = Arc::new(UpbitClient::new(ClientConfig {
        group_rps: settings.upbit_group_rps,
        batch_chunk_size: settings.upbit_batch_chunk_size,
        max_retry: settings.upbit_api_max_retry,
        ..Default::default()
    }));

    // desynchronize the fleet
    let jitter_sec = if settings.trader_startup_jitter_sec > 0 {
        rand::thread_rng().gen_range(0..=settings.trader_startup_jitter_sec)
    } else {
        0
    };
    info!(trader = %args.trader_name, jitter_sec, "starting after jitter");
    tokio::time::sleep(Duration::from_secs(jitter_sec)).await;

    let interval = Duration::from_secs(settings.trading_interval_sec.max(1));
    let short_sleep = Duration::from_secs(10);
    let ohlcv_interval = Duration::from_secs_f64(settings.upbit_ohlcv_call_interval_sec.max(0.0));

    let mut engine: Option<TradingEngine> = None;

    loop {
        let trader = match store.get_trader(&args.trader_name).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                warn!(trader = %args.trader_name, "not registered in the store");
                engine = None;
                tokio::time::sleep(short_sleep).await;
                continue;
            }
            Err(e) => {
                // store unreachable: keep the last-good engine, retry soon
                warn!("self-config fetch failed: {e}");
                tokio::time::sleep(short_sleep).await;
                continue;
            }
        };

        if trader.status != TraderStatus::Run {
            if engine.take().is_some() {
                info!(trader = %args.trader_name, "stopped; engine released");
            }
            tokio::time::sleep(short_sleep).await;
            continue;
        }

        let identity = EngineIdentity {
            trader_name: trader.name.clone(),
            strategy: trader.strategy.clone(),
            risk_mode: trader.risk_mode,
            run_mode: trader.run_mode,
            seed_krw: trader.seed_krw,
        };

        let rebuild = engine.as_ref().map(|e| e.identity() != &identity).unwrap_or(true);
        if rebuild {
            info!(
                trader = %identity.trader_name,
                strategy = %identity.strategy,
                run_mode = identity.run_mode.as_str(),
                "building engine"
            );
            match build_engine(&identity, trader.credential_name.as_deref(), &store, &exchange, ohlcv_interval)
                .await
            {
                Ok(e) => engine = Some(e),
                Err(e) => {
                    error!("engine build failed: {e:#}");
                    store
                        .post_event(&args.trader_name, "ERROR", "engine", &format!("engine build failed: {e}"))
                        .await;
                    tokio::time::sleep(short_sleep).await;
                    continue;
                }
            }
        }

        if let Some(engine) = engine.as_mut() {
            // loop boundary: a failed iteration is logged, never fatal
            if let Err(e) = engine.run_cycle().await {
                error!("trading cycle failed: {e:#}");
                store
                    .post_event(&args.trader_name, "ERROR", "cycle", &format!("cycle failed: {e}"))
                    .await;
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }

        store.heartbeat(&args.trader_name).await;
        store
            .post_event(&args.trader_name, "INFO", "heartbeat", &chrono::Utc::now().to_rfc3339())
            .await;
        tokio::time::sleep(interval).await;
    }
}

/// Assemble an engine for the trader's current shape. LIVE needs a working
/// credential; a missing or undecryptable one degrades to PAPER execution
/// so the loop keeps running without real-capital risk.
async fn build_engine(
    identity: &EngineIdentity,
    credential_name: Option<&str>,
    store: &Arc<StoreClient>,
    exchange: &Arc<UpbitClient>,
    ohlcv_interval: Duration,
) -> anyhow::Result<TradingEngine> {
    let executor = match identity.run_mode {
        RunMode::Paper => OrderExecutor::paper(Arc::clone(exchange), Arc::clone(store) as _),
        RunMode::Live => match credential_name {
            Some(name) => match store.decrypt_credential(name).await {
                Ok((access_key, secret_key)) => {
                    let submitter = Arc::new(UpbitPrivateClient::new(access_key, secret_key));
                    OrderExecutor::live(Arc::clone(exchange), Arc::clone(store) as _, submitter)
                }
                Err(e) => {
                    warn!("credential '{name}' unavailable ({e}); falling back to PAPER execution");
                    store
                        .post_event(
                            &identity.trader_name,
                            "ERROR",
                            "engine",
                            &format!("credential unavailable, LIVE downgraded to PAPER: {e}"),
                        )
                        .await;
                    OrderExecutor::paper(Arc::clone(exchange), Arc::clone(store) as _)
                }
            },
            None => {
                warn!("LIVE requested without a credential; using PAPER execution");
                OrderExecutor::paper(Arc::clone(exchange), Arc::clone(store) as _)
            }
        },
    };

    Ok(TradingEngine::new(
        identity.clone(),
        Arc::clone(store),
        Arc::clone(exchange),
        executor,
        ohlcv_interval,
    ))
}
