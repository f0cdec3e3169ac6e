//! Upbit exchange gateway.
//!
//! This crate is the only place that talks to the venue. It owns:
//! - per-group sliding-window rate limiting with `Remaining-Req` awareness,
//! - the retry/backoff ladder for transient failures,
//! - chunked batch fetching for tickers and orderbooks,
//! - the order executor unifying paper and live execution, and
//! - the time-boxed symbol blacklist fed by repeated order failures.

pub mod auth;
pub mod blacklist;
pub mod executor;
pub mod rate_limit;

pub use blacklist::SymbolBlacklist;
pub use executor::{ExecuteParams, OrderExecutor, OrderRecorder, OrderSubmitter};
pub use rate_limit::SlidingWindowLimiter;

use std::collections::HashMap;
use std::time::Duration;

use ats_schemas::{Candle, Orderbook, OrderbookUnit, Ticker};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use rate_limit::parse_remaining_sec;

pub const DEFAULT_BASE_URL: &str = "https://api.upbit.com";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced by the gateway. Transient conditions (429, timeouts,
/// 5xx) are retried internally and only reach the caller once the retry
/// budget is spent.
#[derive(Debug)]
pub enum ExchangeError {
    /// Network or transport failure after all retries.
    Transport(String),
    /// Non-2xx response after all retries.
    Api { status: u16, message: String },
    /// HTTP 418: the venue temporarily banned this client.
    Banned,
    /// A response payload could not be decoded.
    Decode(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Transport(msg) => write!(f, "transport error: {msg}"),
            ExchangeError::Api { status, message } => {
                write!(f, "exchange api error status={status}: {message}")
            }
            ExchangeError::Banned => write!(f, "exchange temp ban (418)"),
            ExchangeError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub group_rps: f64,
    pub batch_chunk_size: usize,
    pub max_retry: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            group_rps: 8.0,
            batch_chunk_size: 70,
            max_retry: 4,
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct MarketInfo {
    market: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerPayload {
    market: String,
    #[serde(default)]
    trade_price: f64,
    #[serde(default)]
    high_price: f64,
    #[serde(default)]
    low_price: f64,
    #[serde(default)]
    acc_trade_volume_24h: f64,
    #[serde(default)]
    acc_trade_price_24h: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderbookPayload {
    market: String,
    #[serde(default)]
    orderbook_units: Vec<OrderbookUnitPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderbookUnitPayload {
    #[serde(default)]
    ask_price: f64,
    #[serde(default)]
    bid_price: f64,
    #[serde(default)]
    ask_size: f64,
    #[serde(default)]
    bid_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CandlePayload {
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    opening_price: f64,
    #[serde(default)]
    high_price: f64,
    #[serde(default)]
    low_price: f64,
    #[serde(default)]
    trade_price: f64,
    #[serde(default)]
    candle_acc_trade_volume: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Rate-limited, batching public-API client. One instance per process.
#[derive(Debug)]
pub struct UpbitClient {
    http: reqwest::Client,
    config: ClientConfig,
    ticker_limiter: SlidingWindowLimiter,
    orderbook_limiter: SlidingWindowLimiter,
    market_limiter: SlidingWindowLimiter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Ticker,
    Orderbook,
    Market,
}

impl UpbitClient {
    pub fn new(config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            ticker_limiter: SlidingWindowLimiter::new(config.group_rps),
            orderbook_limiter: SlidingWindowLimiter::new(config.group_rps),
            // market listing is the cheapest endpoint; run it at half rate
            market_limiter: SlidingWindowLimiter::new((config.group_rps / 2.0).max(2.0)),
            http,
            config,
        }
    }

    fn limiter(&self, group: Group) -> &SlidingWindowLimiter {
        match group {
            Group::Ticker => &self.ticker_limiter,
            Group::Orderbook => &self.orderbook_limiter,
            Group::Market => &self.market_limiter,
        }
    }

    /// One GET with the full backoff ladder. Returns the decoded JSON body,
    /// or an error once the retry budget is spent. A 418 aborts immediately.
    async fn get_with_backoff<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        group: Group,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut last_err = ExchangeError::Transport("no attempt made".to_string());

        for attempt in 0..self.config.max_retry {
            self.limiter(group).acquire().await;

            let resp = match self.http.get(&url).query(query).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = ExchangeError::Transport(e.to_string());
                    let backoff = Duration::from_secs_f64(
                        (0.2 * 2f64.powi(attempt as i32)).min(2.0) + jitter(0.15),
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                if let Some(raw) = resp
                    .headers()
                    .get("Remaining-Req")
                    .and_then(|v| v.to_str().ok())
                {
                    if let Some(sec_left) = parse_remaining_sec(raw) {
                        self.limiter(group).respect_remaining(sec_left).await;
                    }
                }
                return resp
                    .json::<T>()
                    .await
                    .map_err(|e| ExchangeError::Decode(e.to_string()));
            }

            match status.as_u16() {
                429 => {
                    let backoff = Duration::from_secs_f64(
                        (0.25 * 2f64.powi(attempt as i32)).min(3.0) + jitter(0.2),
                    );
                    debug!(attempt, "rate limited (429), backing off {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    last_err = ExchangeError::Api { status: 429, message: "rate limited".into() };
                }
                418 => {
                    // temp ban: stop hammering immediately
                    warn!("418 from exchange — pausing and aborting call");
                    tokio::time::sleep(Duration::from_secs_f64(3.0 + jitter(2.0))).await;
                    return Err(ExchangeError::Banned);
                }
                code => {
                    let backoff =
                        Duration::from_secs_f64((0.15 * (attempt + 1) as f64).min(1.5));
                    tokio::time::sleep(backoff).await;
                    last_err = ExchangeError::Api {
                        status: code,
                        message: format!("unexpected status on {path}"),
                    };
                }
            }
        }
        Err(last_err)
    }

    /// All KRW markets (e.g. `KRW-BTC`).
    pub async fn get_krw_markets(&self) -> Result<Vec<String>, ExchangeError> {
        let infos: Vec<MarketInfo> = self
            .get_with_backoff(
                "/v1/market/all",
                &[("isDetails", "false".to_string())],
                Group::Market,
            )
            .await?;
        Ok(infos
            .into_iter()
            .map(|m| m.market)
            .filter(|m| m.starts_with("KRW-"))
            .collect())
    }

    /// Batched 24h tickers. Symbols are deduplicated and fetched in chunks;
    /// a failed chunk is skipped rather than failing the whole map.
    pub async fn get_tickers(
        &self,
        markets: &[String],
    ) -> Result<HashMap<String, Ticker>, ExchangeError> {
        let mut result = HashMap::new();
        for batch in chunks(&dedupe(markets), self.config.batch_chunk_size) {
            let payload: Result<Vec<TickerPayload>, _> = self
                .get_with_backoff(
                    "/v1/ticker",
                    &[("markets", batch.join(","))],
                    Group::Ticker,
                )
                .await;
            match payload {
                Ok(items) => {
                    for item in items {
                        result.insert(
                            item.market.clone(),
                            Ticker {
                                trade_price: item.trade_price,
                                high_price: item.high_price,
                                low_price: item.low_price,
                                acc_trade_volume_24h: item.acc_trade_volume_24h,
                                acc_trade_price_24h: item.acc_trade_price_24h,
                            },
                        );
                    }
                }
                Err(ExchangeError::Banned) => return Err(ExchangeError::Banned),
                Err(e) => {
                    warn!("ticker chunk failed, skipping: {e}");
                }
            }
        }
        Ok(result)
    }

    /// Batched orderbooks, same contract as [`UpbitClient::get_tickers`].
    pub async fn get_orderbooks(
        &self,
        markets: &[String],
    ) -> Result<HashMap<String, Orderbook>, ExchangeError> {
        let mut result = HashMap::new();
        for batch in chunks(&dedupe(markets), self.config.batch_chunk_size) {
            let payload: Result<Vec<OrderbookPayload>, _> = self
                .get_with_backoff(
                    "/v1/orderbook",
                    &[("markets", batch.join(","))],
                    Group::Orderbook,
                )
                .await;
            match payload {
                Ok(items) => {
                    for item in items {
                        if item.orderbook_units.is_empty() {
                            continue;
                        }
                        result.insert(
                            item.market.clone(),
                            Orderbook {
                                orderbook_units: item
                                    .orderbook_units
                                    .iter()
                                    .map(|u| OrderbookUnit {
                                        ask_price: u.ask_price,
                                        bid_price: u.bid_price,
                                        ask_size: u.ask_size,
                                        bid_size: u.bid_size,
                                    })
                                    .collect(),
                            },
                        );
                    }
                }
                Err(ExchangeError::Banned) => return Err(ExchangeError::Banned),
                Err(e) => {
                    warn!("orderbook chunk failed, skipping: {e}");
                }
            }
        }
        Ok(result)
    }

    /// Single-symbol ticker, routed through the batched path so it inherits
    /// the same rate-limit discipline.
    pub async fn get_ticker(&self, market: &str) -> Result<Option<Ticker>, ExchangeError> {
        let map = self.get_tickers(&[market.to_string()]).await?;
        Ok(map.get(market).copied())
    }

    /// Minute candles, returned oldest-first (the venue serves newest-first).
    pub async fn get_candles_minutes(
        &self,
        market: &str,
        unit: u32,
        count: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let payload: Vec<CandlePayload> = self
            .get_with_backoff(
                &format!("/v1/candles/minutes/{unit}"),
                &[
                    ("market", market.to_string()),
                    ("count", count.to_string()),
                ],
                Group::Market,
            )
            .await?;
        let mut candles: Vec<Candle> = payload
            .into_iter()
            .map(|c| Candle {
                ts: c.timestamp / 1000,
                open: c.opening_price,
                high: c.high_price,
                low: c.low_price,
                close: c.trade_price,
                volume: c.candle_acc_trade_volume,
            })
            .collect();
        candles.reverse();
        Ok(candles)
    }
}

fn jitter(max: f64) -> f64 {
    rand::thread_rng().gen_range(0.0..max)
}

fn dedupe(markets: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    markets
        .iter()
        .filter(|m| !m.is_empty() && seen.insert(m.as_str()))
        .cloned()
        .collect()
}

fn chunks(values: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    values
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(base_url: String) -> UpbitClient {
        UpbitClient::new(ClientConfig {
            base_url,
            group_rps: 100.0,
            batch_chunk_size: 2,
            max_retry: 3,
            request_timeout: Duration::from_secs(2),
        })
    }

    #[test]
    fn dedupe_preserves_order() {
        let xs = vec!["a".to_string(), "b".to_string(), "a".to_string(), "".to_string()];
        assert_eq!(dedupe(&xs), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn krw_markets_are_filtered() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/market/all");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-BTC"},
                {"market": "BTC-ETH"},
                {"market": "KRW-XRP"}
            ]));
        });
        let c = client(server.base_url());
        let markets = c.get_krw_markets().await.unwrap();
        assert_eq!(markets, vec!["KRW-BTC".to_string(), "KRW-XRP".to_string()]);
    }

    #[tokio::test]
    async fn tickers_merge_across_chunks() {
        let server = MockServer::start();
        // chunk size 2 → three symbols issue two requests
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker").query_param("markets", "KRW-BTC,KRW-ETH");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-BTC", "trade_price": 50000000.0, "acc_trade_volume_24h": 10.0},
                {"market": "KRW-ETH", "trade_price": 3000000.0, "acc_trade_volume_24h": 100.0}
            ]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker").query_param("markets", "KRW-XRP");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-XRP", "trade_price": 700.0, "acc_trade_volume_24h": 1000.0}
            ]));
        });
        let c = client(server.base_url());
        let map = c
            .get_tickers(&[
                "KRW-BTC".to_string(),
                "KRW-ETH".to_string(),
                "KRW-XRP".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["KRW-XRP"].trade_price, 700.0);
    }

    #[tokio::test]
    async fn single_ticker_routes_through_batch_path() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker").query_param("markets", "KRW-BTC");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-BTC", "trade_price": 1234.0}
            ]));
        });
        let c = client(server.base_url());
        let t = c.get_ticker("KRW-BTC").await.unwrap().unwrap();
        assert_eq!(t.trade_price, 1234.0);
        assert!(c.get_ticker("KRW-NONE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retries_429_until_budget_exhausted() {
        let server = MockServer::start();
        let fail = server.mock(|when, then| {
            when.method(GET).path("/v1/ticker");
            then.status(429);
        });
        let c = client(server.base_url());
        // first run exhausts retries against permanent 429s
        let err = c
            .get_with_backoff::<Vec<TickerPayload>>(
                "/v1/ticker",
                &[("markets", "KRW-BTC".to_string())],
                Group::Ticker,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status: 429, .. }));
        assert_eq!(fail.hits(), 3);
    }

    #[tokio::test]
    async fn ban_418_aborts_without_retrying() {
        let server = MockServer::start();
        let banned = server.mock(|when, then| {
            when.method(GET).path("/v1/orderbook");
            then.status(418);
        });
        let c = client(server.base_url());
        let err = c.get_orderbooks(&["KRW-BTC".to_string()]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Banned));
        assert_eq!(banned.hits(), 1);
    }

    #[tokio::test]
    async fn failed_ticker_chunk_is_skipped_not_fatal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker").query_param("markets", "KRW-BTC,KRW-ETH");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker").query_param("markets", "KRW-XRP");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-XRP", "trade_price": 700.0}
            ]));
        });
        let c = client(server.base_url());
        let map = c
            .get_tickers(&[
                "KRW-BTC".to_string(),
                "KRW-ETH".to_string(),
                "KRW-XRP".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("KRW-XRP"));
    }

    #[tokio::test]
    async fn candles_come_back_oldest_first() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/candles/minutes/60");
            then.status(200).json_body(serde_json::json!([
                {"timestamp": 2000000, "opening_price": 2.0, "high_price": 2.5, "low_price": 1.5, "trade_price": 2.2, "candle_acc_trade_volume": 1.0},
                {"timestamp": 1000000, "opening_price": 1.0, "high_price": 1.5, "low_price": 0.5, "trade_price": 1.2, "candle_acc_trade_volume": 1.0}
            ]));
        });
        let c = client(server.base_url());
        let candles = c.get_candles_minutes("KRW-BTC", 60, 2).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].ts < candles[1].ts);
        assert_eq!(candles[0].close, 1.2);
    }
}
