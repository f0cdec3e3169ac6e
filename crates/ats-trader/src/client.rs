//! HTTP client for the Control Store.
//!
//! Every call has a short deadline and degrades softly: the loop must keep
//! running through store hiccups, so read helpers return `Option`/defaults
//! and write helpers log-and-continue unless the caller needs the outcome.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use ats_schemas::{EventIn, HoldingView, OrderIn, Regime, SignalIn, TraderView};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeInfo {
    pub regime: Regime,
    pub confidence: f64,
}

impl Default for RegimeInfo {
    fn default() -> Self {
        // store unreachable or empty: assume a neutral RANGE
        Self { regime: Regime::Range, confidence: 0.5 }
    }
}

impl StoreClient {
    pub fn new(api_base: String) -> Self {
        let mut builder = reqwest::Client::builder().timeout(std::time::Duration::from_secs(5));
        // the store enforces X-API-Key when API_KEY is configured
        if let Some(key) = std::env::var("API_KEY").ok().filter(|k| !k.is_empty()) {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&key) {
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert("X-API-Key", value);
                builder = builder.default_headers(headers);
            }
        }
        Self {
            http: builder.build().unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    // -- trader self-config ----------------------------------------------

    pub async fn get_trader(&self, name: &str) -> Result<Option<TraderView>> {
        let resp = self
            .http
            .get(self.url(&format!("/api/traders/{name}")))
            .send()
            .await
            .context("trader fetch failed")?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(anyhow!("trader fetch: HTTP {}", resp.status()));
        }
        Ok(Some(resp.json().await.context("trader decode failed")?))
    }

    pub async fn heartbeat(&self, name: &str) {
        let res = self
            .http
            .post(self.url(&format!("/api/traders/{name}/heartbeat")))
            .send()
            .await;
        if let Err(e) = res {
            warn!("heartbeat failed: {e}");
        }
    }

    // -- regime & weights --------------------------------------------------

    /// Most recent snapshot; neutral RANGE when unavailable.
    pub async fn current_regime(&self) -> RegimeInfo {
        #[derive(Deserialize)]
        struct Snap {
            regime_label: String,
            confidence: f64,
        }

        let fetched: Option<Snap> = async {
            let resp = self
                .http
                .get(self.url("/api/regimes/snapshots"))
                .query(&[("limit", "1")])
                .send()
                .await
                .ok()?;
            let items: Items<Snap> = resp.json().await.ok()?;
            items.items.into_iter().next()
        }
        .await;

        match fetched {
            Some(snap) => match Regime::parse(&snap.regime_label) {
                Some(regime) => RegimeInfo { regime, confidence: snap.confidence },
                None => RegimeInfo::default(),
            },
            None => RegimeInfo::default(),
        }
    }

    /// Applied regime weight; falls back to the built-in table offline.
    pub async fn regime_weight(&self, regime: Regime, confidence: f64) -> f64 {
        #[derive(Deserialize)]
        struct Resp {
            applied_weight: f64,
        }

        let base = ats_weights::default_base_weight(regime);
        let fetched: Option<Resp> = async {
            let resp = self
                .http
                .get(self.url(&format!("/api/regimes/regime-weight/{}", regime.as_str())))
                .query(&[("base_weight", base.to_string())])
                .send()
                .await
                .ok()?;
            resp.json().await.ok()
        }
        .await;

        match fetched {
            Some(r) => r.applied_weight,
            None => ats_weights::regime_weight(regime, confidence, base),
        }
    }

    /// Thompson-sampled bandit weight; neutral 1.0 offline.
    pub async fn bandit_weight(&self, regime: Regime, strategy: &str) -> f64 {
        #[derive(Deserialize)]
        struct Resp {
            weight: f64,
        }

        let fetched: Option<Resp> = async {
            let resp = self
                .http
                .get(self.url(&format!("/api/regimes/weight/{}/{strategy}", regime.as_str())))
                .send()
                .await
                .ok()?;
            resp.json().await.ok()
        }
        .await;
        fetched.map(|r| r.weight).unwrap_or(1.0)
    }

    pub async fn bandit_update(&self, regime: Regime, strategy: &str, reward_positive: bool) {
        let body = json!({
            "regime": regime.as_str(),
            "strategy_id": strategy,
            "reward_positive": reward_positive,
        });
        let res = self
            .http
            .post(self.url("/api/trainer/bandit-update"))
            .json(&body)
            .send()
            .await;
        if let Err(e) = res {
            warn!("bandit update failed: {e}");
        }
    }

    // -- config -----------------------------------------------------------

    /// Params of the active config for a strategy. `Ok(None)` means no
    /// active row exists; `Err` means the store could not be read (the
    /// engine keeps its last-good params in that case).
    pub async fn active_config_params(&self, strategy: &str) -> Result<Option<Value>> {
        #[derive(Deserialize)]
        struct ConfigRow {
            strategy_id: String,
            params: Value,
            is_active: bool,
        }

        let resp = self
            .http
            .get(self.url("/api/configs"))
            .send()
            .await
            .context("config fetch failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("config fetch: HTTP {}", resp.status()));
        }
        let items: Items<ConfigRow> = resp.json().await.context("config decode failed")?;
        Ok(items
            .items
            .into_iter()
            .find(|c| c.is_active && c.strategy_id == strategy)
            .map(|c| c.params))
    }

    // -- credentials --------------------------------------------------------

    pub async fn decrypt_credential(&self, name: &str) -> Result<(String, String)> {
        #[derive(Deserialize)]
        struct Resp {
            access_key: String,
            secret_key: String,
        }
        let resp = self
            .http
            .get(self.url(&format!("/api/credentials/{name}/decrypt")))
            .send()
            .await
            .context("credential decrypt call failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("credential decrypt: HTTP {}", resp.status()));
        }
        let body: Resp = resp.json().await.context("credential decode failed")?;
        Ok((body.access_key, body.secret_key))
    }

    // -- ledger ------------------------------------------------------------

    /// Symbols currently held per the order ledger — the cold-start dedup
    /// source. Errors degrade to an empty set (the engine's own in-memory
    /// guard still applies).
    pub async fn held_symbols(&self, trader: &str) -> HashSet<String> {
        #[derive(Deserialize)]
        struct Resp {
            items: Vec<HoldingView>,
        }

        let fetched: Option<Resp> = async {
            let resp = self
                .http
                .get(self.url("/api/trades/holdings"))
                .query(&[("trader_name", trader)])
                .send()
                .await
                .ok()?;
            resp.json().await.ok()
        }
        .await;

        fetched
            .map(|r| r.items.into_iter().map(|h| h.market).collect())
            .unwrap_or_default()
    }

    pub async fn post_signal(&self, signal: &SignalIn) {
        let res = self.http.post(self.url("/api/trades/signal")).json(signal).send().await;
        if let Err(e) = res {
            warn!("signal post failed: {e}");
        }
    }

    pub async fn post_order(&self, order: &OrderIn) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/api/trades/order"))
            .json(order)
            .send()
            .await
            .context("order post failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("order post: HTTP {}", resp.status()));
        }
        Ok(())
    }

    pub async fn post_event(&self, trader: &str, level: &str, kind: &str, message: &str) {
        let body = EventIn {
            trader_name: Some(trader.to_string()),
            level: level.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
        };
        let res = self.http.post(self.url("/api/events")).json(&body).send().await;
        if let Err(e) = res {
            warn!("event post failed: {e}");
        }
    }

    // -- safety -------------------------------------------------------------

    /// Whether the Runtime Guard currently allows new entries.
    pub async fn entry_allowed(&self, trader: &str) -> (bool, Option<String>) {
        #[derive(Deserialize)]
        struct Resp {
            allowed: bool,
            reason: Option<String>,
        }

        let fetched: Option<Resp> = async {
            let resp = self
                .http
                .get(self.url(&format!("/api/safety/{trader}/entry-allowed")))
                .send()
                .await
                .ok()?;
            resp.json().await.ok()
        }
        .await;

        match fetched {
            Some(r) => (r.allowed, r.reason),
            // store unreachable: fail open for exits, closed for entries
            None => (false, Some("safety 상태 확인 불가".to_string())),
        }
    }

    pub async fn report_pnl(&self, trader: &str, loss_krw: f64, consecutive: bool) {
        let body = json!({ "loss_krw": loss_krw, "consecutive": consecutive });
        let res = self
            .http
            .post(self.url(&format!("/api/safety/{trader}/update_pnl")))
            .json(&body)
            .send()
            .await;
        if let Err(e) = res {
            warn!("pnl report failed: {e}");
        }
    }

    pub async fn report_slippage(&self, trader: &str, expected_price: f64, actual_price: f64) {
        let body = json!({ "expected_price": expected_price, "actual_price": actual_price });
        let res = self
            .http
            .post(self.url(&format!("/api/safety/{trader}/slippage")))
            .json(&body)
            .send()
            .await;
        if let Err(e) = res {
            warn!("slippage report failed: {e}");
        }
    }

    pub async fn report_api_error(&self, trader: &str) {
        let res = self
            .http
            .post(self.url(&format!("/api/safety/{trader}/api-error")))
            .send()
            .await;
        if let Err(e) = res {
            warn!("api-error report failed: {e}");
        }
    }
}

/// The executor records acknowledged fills through the store.
#[async_trait::async_trait]
impl ats_exchange::OrderRecorder for StoreClient {
    async fn record_order(&self, order: OrderIn) -> Result<()> {
        self.post_order(&order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn missing_trader_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/traders/ghost");
            then.status(404).json_body(serde_json::json!({"detail": "trader not found"}));
        });
        let client = StoreClient::new(server.base_url());
        assert!(client.get_trader("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn current_regime_parses_snapshot() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/regimes/snapshots");
            then.status(200).json_body(serde_json::json!({
                "items": [{
                    "ts": "2026-01-01T00:00:00Z",
                    "market": "KRW-BTC",
                    "regime_id": 2,
                    "regime_label": "CHOP",
                    "confidence": 0.7,
                    "metrics": {}
                }]
            }));
        });
        let client = StoreClient::new(server.base_url());
        let info = client.current_regime().await;
        assert_eq!(info.regime, Regime::Chop);
        assert_eq!(info.confidence, 0.7);
    }

    #[tokio::test]
    async fn unreachable_store_defaults_to_neutral_range() {
        let client = StoreClient::new("http://127.0.0.1:1".to_string());
        let info = client.current_regime().await;
        assert_eq!(info.regime, Regime::Range);
        assert_eq!(info.confidence, 0.5);
    }

    #[tokio::test]
    async fn unreachable_store_blocks_entries() {
        let client = StoreClient::new("http://127.0.0.1:1".to_string());
        let (allowed, reason) = client.entry_allowed("t1").await;
        assert!(!allowed);
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn held_symbols_collects_markets() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/trades/holdings")
                .query_param("trader_name", "t1");
            then.status(200).json_body(serde_json::json!({
                "trader_name": "t1",
                "items": [
                    {"market": "KRW-BTC", "qty": 0.1, "avg_entry_price": 5.0e7, "last_ts": null},
                    {"market": "KRW-ETH", "qty": 2.0, "avg_entry_price": 3.0e6, "last_ts": null}
                ]
            }));
        });
        let client = StoreClient::new(server.base_url());
        let held = client.held_symbols("t1").await;
        assert!(held.contains("KRW-BTC") && held.contains("KRW-ETH"));
    }

    #[tokio::test]
    async fn regime_weight_falls_back_offline() {
        let client = StoreClient::new("http://127.0.0.1:1".to_string());
        // CHOP blocks entries regardless of the store being down
        assert_eq!(client.regime_weight(Regime::Chop, 0.7).await, 0.0);
        let trend = client.regime_weight(Regime::Trend, 1.0).await;
        assert!((trend - 1.2).abs() < 1e-9);
    }
}
