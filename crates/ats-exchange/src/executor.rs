//! Order execution: one entry point for paper and live orders.
//!
//! Size contract: BUY takes `size` in KRW and reports `filled_qty` in coin
//! (`size / fill_price`); SELL takes and reports coin quantity. Every
//! terminal fill is recorded in the Control Store *after* the gateway
//! returns, so the ledger only ever holds acknowledged outcomes.

use std::sync::Arc;
use std::time::Duration;

use ats_schemas::{OrderIn, OrderResult, OrderSide};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::LiveFill;
use crate::blacklist::SymbolBlacklist;
use crate::{ExchangeError, UpbitClient};

/// Persists acknowledged order rows (the trader's store client in
/// production, a collector in tests).
#[async_trait::async_trait]
pub trait OrderRecorder: Send + Sync {
    async fn record_order(&self, order: OrderIn) -> anyhow::Result<()>;
}

/// Live-venue market order submission.
#[async_trait::async_trait]
pub trait OrderSubmitter: Send + Sync {
    /// Market buy spending `krw_amount`; returns coin qty + avg price.
    async fn market_buy(&self, symbol: &str, krw_amount: f64) -> Result<LiveFill, ExchangeError>;
    /// Market sell of `qty` coins.
    async fn market_sell(&self, symbol: &str, qty: f64) -> Result<LiveFill, ExchangeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteParams {
    pub split_count: u32,
    pub max_retries: u32,
}

impl Default for ExecuteParams {
    fn default() -> Self {
        Self { split_count: 1, max_retries: 3 }
    }
}

const PAPER_SLIPPAGE: f64 = 0.001;

pub struct OrderExecutor {
    client: Arc<UpbitClient>,
    recorder: Arc<dyn OrderRecorder>,
    /// `None` = paper mode; `Some` = live submitter.
    submitter: Option<Arc<dyn OrderSubmitter>>,
    blacklist: Mutex<SymbolBlacklist>,
}

impl OrderExecutor {
    pub fn paper(client: Arc<UpbitClient>, recorder: Arc<dyn OrderRecorder>) -> Self {
        Self { client, recorder, submitter: None, blacklist: Mutex::new(SymbolBlacklist::default()) }
    }

    pub fn live(
        client: Arc<UpbitClient>,
        recorder: Arc<dyn OrderRecorder>,
        submitter: Arc<dyn OrderSubmitter>,
    ) -> Self {
        Self {
            client,
            recorder,
            submitter: Some(submitter),
            blacklist: Mutex::new(SymbolBlacklist::default()),
        }
    }

    pub fn is_paper(&self) -> bool {
        self.submitter.is_none()
    }

    /// Execute one order to a terminal outcome. Never returns `Err`: all
    /// failure paths land in `OrderResult { success: false, .. }` so the
    /// trading loop can log and move on.
    pub async fn execute_order(
        &self,
        trader_name: &str,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        params: ExecuteParams,
    ) -> OrderResult {
        if size <= 0.0 {
            return OrderResult::failed("주문 수량 없음");
        }

        {
            let mut blacklist = self.blacklist.lock().await;
            if let Some(remaining) = blacklist.remaining(symbol) {
                return OrderResult::failed(format!(
                    "블랙리스트 차단 ({symbol}, {remaining}초 남음)"
                ));
            }
        }

        match &self.submitter {
            None => self.execute_paper(trader_name, symbol, side, price, size).await,
            Some(submitter) => {
                self.execute_live(submitter.clone(), trader_name, symbol, side, price, size, params)
                    .await
            }
        }
    }

    // -- paper ------------------------------------------------------------

    async fn execute_paper(
        &self,
        trader_name: &str,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
    ) -> OrderResult {
        let ticker = match self.client.get_ticker(symbol).await {
            Ok(Some(t)) if t.trade_price > 0.0 => t,
            Ok(_) => return OrderResult::failed("티커 조회 실패"),
            Err(e) => return OrderResult::failed(format!("티커 조회 실패: {e}")),
        };

        let slippage = rand::thread_rng().gen_range(-PAPER_SLIPPAGE..=PAPER_SLIPPAGE);
        let fill_price = ticker.trade_price * (1.0 + slippage);
        let filled_qty = match side {
            OrderSide::Buy => size / fill_price,
            OrderSide::Sell => size,
        };

        let order_id = format!("PAPER_{trader_name}_{symbol}_{}", Uuid::new_v4().simple());

        let row = OrderIn {
            trader_name: trader_name.to_string(),
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            size,
            status: "FILLED".to_string(),
            filled_qty,
            avg_price: Some(fill_price),
        };
        if let Err(e) = self.recorder.record_order(row).await {
            warn!("failed to record paper order: {e}");
        }

        info!(%symbol, side = side.as_str(), filled_qty, fill_price, "paper fill");
        OrderResult {
            success: true,
            order_id: Some(order_id),
            filled_qty,
            avg_price: Some(fill_price),
            error: None,
        }
    }

    // -- live -------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn execute_live(
        &self,
        submitter: Arc<dyn OrderSubmitter>,
        trader_name: &str,
        symbol: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        params: ExecuteParams,
    ) -> OrderResult {
        let split_count = params.split_count.max(1);
        let part_size = size / split_count as f64;

        let mut total_qty = 0.0;
        let mut weighted_price = 0.0;
        let mut last_error: Option<String> = None;
        let mut blacklisted = false;

        'parts: for part in 0..split_count {
            let mut attempt = 0;
            loop {
                let fill = match side {
                    OrderSide::Buy => submitter.market_buy(symbol, part_size).await,
                    OrderSide::Sell => submitter.market_sell(symbol, part_size).await,
                };
                match fill {
                    Ok(f) if f.qty > 0.0 => {
                        total_qty += f.qty;
                        weighted_price += f.qty * f.price;
                        break;
                    }
                    Ok(_) => {
                        last_error = Some("체결 수량 0".to_string());
                    }
                    Err(e) => {
                        last_error = Some(e.to_string());
                    }
                }

                attempt += 1;
                if attempt >= params.max_retries.max(1) {
                    // repeated failure: cool this symbol down and stop
                    warn!(%symbol, part, "order part failed {attempt} times — blacklisting");
                    self.blacklist.lock().await.insert(symbol);
                    blacklisted = true;
                    break 'parts;
                }
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
        }

        if total_qty <= 0.0 {
            let mut msg = last_error.unwrap_or_else(|| "주문 실패".to_string());
            if blacklisted {
                msg = format!("{msg} (블랙리스트 등록)");
            }
            return OrderResult::failed(msg);
        }

        let avg_price = weighted_price / total_qty;
        let order_id = format!("LIVE_{trader_name}_{symbol}_{}", Uuid::new_v4().simple());

        let row = OrderIn {
            trader_name: trader_name.to_string(),
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            size,
            status: "FILLED".to_string(),
            filled_qty: total_qty,
            avg_price: Some(avg_price),
        };
        if let Err(e) = self.recorder.record_order(row).await {
            warn!("failed to record live order: {e}");
        }

        info!(%symbol, side = side.as_str(), total_qty, avg_price, partial = blacklisted, "live fill");
        OrderResult {
            success: true,
            order_id: Some(order_id),
            filled_qty: total_qty,
            avg_price: Some(avg_price),
            // partial success still reports what went wrong with the tail
            error: if blacklisted { last_error } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NullRecorder;

    #[async_trait::async_trait]
    impl OrderRecorder for NullRecorder {
        async fn record_order(&self, _order: OrderIn) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct CollectingRecorder(Mutex<Vec<OrderIn>>);

    #[async_trait::async_trait]
    impl OrderRecorder for CollectingRecorder {
        async fn record_order(&self, order: OrderIn) -> anyhow::Result<()> {
            self.0.lock().await.push(order);
            Ok(())
        }
    }

    /// Fails the first `fail_first` calls, then fills at a fixed price.
    struct FlakySubmitter {
        fail_first: u32,
        calls: AtomicU32,
        fill_price: f64,
    }

    #[async_trait::async_trait]
    impl OrderSubmitter for FlakySubmitter {
        async fn market_buy(&self, _symbol: &str, krw: f64) -> Result<LiveFill, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ExchangeError::Api { status: 500, message: "boom".into() });
            }
            Ok(LiveFill { qty: krw / self.fill_price, price: self.fill_price })
        }

        async fn market_sell(&self, _symbol: &str, qty: f64) -> Result<LiveFill, ExchangeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ExchangeError::Api { status: 500, message: "boom".into() });
            }
            Ok(LiveFill { qty, price: self.fill_price })
        }
    }

    fn paper_client(server: &MockServer) -> Arc<UpbitClient> {
        Arc::new(UpbitClient::new(ClientConfig {
            base_url: server.base_url(),
            group_rps: 100.0,
            max_retry: 2,
            ..Default::default()
        }))
    }

    fn mock_ticker(server: &MockServer, price: f64) {
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker");
            then.status(200).json_body(serde_json::json!([
                {"market": "KRW-ETH", "trade_price": price}
            ]));
        });
    }

    #[tokio::test]
    async fn paper_buy_converts_krw_to_coin_qty() {
        let server = MockServer::start();
        mock_ticker(&server, 1000.0);
        let recorder = Arc::new(CollectingRecorder(Mutex::new(Vec::new())));
        let exec = OrderExecutor::paper(paper_client(&server), recorder.clone());

        let res = exec
            .execute_order("t1", "KRW-ETH", OrderSide::Buy, 1000.0, 500_000.0, ExecuteParams::default())
            .await;

        assert!(res.success);
        let fill_price = res.avg_price.unwrap();
        // ±0.1% simulated slippage around the ticker price
        assert!((fill_price - 1000.0).abs() <= 1.0 + 1e-9);
        assert!((res.filled_qty - 500_000.0 / fill_price).abs() < 1e-9);
        assert!(res.order_id.unwrap().starts_with("PAPER_t1_KRW-ETH_"));

        let rows = recorder.0.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "FILLED");
        assert_eq!(rows[0].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn paper_sell_keeps_coin_qty() {
        let server = MockServer::start();
        mock_ticker(&server, 2000.0);
        let exec = OrderExecutor::paper(paper_client(&server), Arc::new(NullRecorder));

        let res = exec
            .execute_order("t1", "KRW-ETH", OrderSide::Sell, 2000.0, 3.5, ExecuteParams::default())
            .await;
        assert!(res.success);
        assert_eq!(res.filled_qty, 3.5);
    }

    #[tokio::test]
    async fn paper_fails_without_ticker() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/ticker");
            then.status(200).json_body(serde_json::json!([]));
        });
        let exec = OrderExecutor::paper(paper_client(&server), Arc::new(NullRecorder));
        let res = exec
            .execute_order("t1", "KRW-ETH", OrderSide::Buy, 1000.0, 1000.0, ExecuteParams::default())
            .await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("티커"));
    }

    #[tokio::test]
    async fn live_splits_and_aggregates_fills() {
        let server = MockServer::start();
        let submitter = Arc::new(FlakySubmitter {
            fail_first: 0,
            calls: AtomicU32::new(0),
            fill_price: 1000.0,
        });
        let exec = OrderExecutor::live(paper_client(&server), Arc::new(NullRecorder), submitter.clone());

        let res = exec
            .execute_order(
                "t1",
                "KRW-ETH",
                OrderSide::Buy,
                1000.0,
                900_000.0,
                ExecuteParams { split_count: 3, max_retries: 2 },
            )
            .await;

        assert!(res.success);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 3);
        assert!((res.filled_qty - 900.0).abs() < 1e-9);
        assert_eq!(res.avg_price, Some(1000.0));
    }

    #[tokio::test]
    async fn live_retries_then_fills() {
        let server = MockServer::start();
        let submitter = Arc::new(FlakySubmitter {
            fail_first: 1,
            calls: AtomicU32::new(0),
            fill_price: 1000.0,
        });
        let exec = OrderExecutor::live(paper_client(&server), Arc::new(NullRecorder), submitter);

        let res = exec
            .execute_order(
                "t1",
                "KRW-ETH",
                OrderSide::Buy,
                1000.0,
                100_000.0,
                ExecuteParams { split_count: 1, max_retries: 3 },
            )
            .await;
        assert!(res.success);
        assert!((res.filled_qty - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeated_failure_blacklists_and_blocks_next_call() {
        let server = MockServer::start();
        let submitter = Arc::new(FlakySubmitter {
            fail_first: u32::MAX,
            calls: AtomicU32::new(0),
            fill_price: 1000.0,
        });
        let exec = OrderExecutor::live(paper_client(&server), Arc::new(NullRecorder), submitter);

        let params = ExecuteParams { split_count: 1, max_retries: 3 };
        let res = exec
            .execute_order("t1", "KRW-DOGE", OrderSide::Buy, 100.0, 100_000.0, params)
            .await;
        assert!(!res.success);
        assert!(res.error.unwrap().contains("블랙리스트"));

        // within the 10-minute window: immediate refusal, no submit attempts
        let res2 = exec
            .execute_order("t1", "KRW-DOGE", OrderSide::Buy, 100.0, 100_000.0, params)
            .await;
        assert!(!res2.success);
        assert!(res2.error.unwrap().contains("블랙리스트 차단"));
    }

    #[tokio::test]
    async fn partial_fill_reports_success_with_error_note() {
        let server = MockServer::start();
        // two parts succeed, then everything fails
        struct TwoThenFail(FlakySubmitter);
        #[async_trait::async_trait]
        impl OrderSubmitter for TwoThenFail {
            async fn market_buy(&self, s: &str, krw: f64) -> Result<LiveFill, ExchangeError> {
                if self.0.calls.load(Ordering::SeqCst) >= 2 {
                    self.0.calls.fetch_add(1, Ordering::SeqCst);
                    return Err(ExchangeError::Api { status: 500, message: "down".into() });
                }
                self.0.market_buy(s, krw).await
            }
            async fn market_sell(&self, s: &str, qty: f64) -> Result<LiveFill, ExchangeError> {
                self.0.market_sell(s, qty).await
            }
        }
        let wrapped = Arc::new(TwoThenFail(FlakySubmitter {
            fail_first: 0,
            calls: AtomicU32::new(0),
            fill_price: 1000.0,
        }));
        let exec = OrderExecutor::live(paper_client(&server), Arc::new(NullRecorder), wrapped);

        let res = exec
            .execute_order(
                "t1",
                "KRW-ETH",
                OrderSide::Buy,
                1000.0,
                900_000.0,
                ExecuteParams { split_count: 3, max_retries: 2 },
            )
            .await;
        // two of three parts filled
        assert!(res.success);
        assert!((res.filled_qty - 600.0).abs() < 1e-9);
        assert!(res.error.is_some(), "partial fill should carry the tail error");
    }
}
