//! The trading engine: one `run_cycle` per scheduling tick.
//!
//! Pipeline: load config → regime + weights → (PANIC? reduce-only) →
//! screen → score → entry gate → size → execute → manage positions.
//! The engine owns all in-memory derived state (positions, score history);
//! everything it persists goes through the Control Store, and everything it
//! persists is rebuildable from there.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ats_config::StrategyParams;
use ats_exchange::{ExecuteParams, OrderExecutor, UpbitClient};
use ats_schemas::{Candle, OrderSide, Regime, RiskMode, RunMode, SignalIn};
use ats_strategy::{
    aggregator::ScoreWeights, scoring, screener, Candidate, ChecklistInput, Position,
    PositionManager, PositionUpdate, PreTradeChecker, PositionSizer, ScoreAggregator,
};
use serde_json::json;
use tracing::{info, warn};

use crate::client::{RegimeInfo, StoreClient};

/// What a trader *is*; changing any of these forces an engine rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineIdentity {
    pub trader_name: String,
    pub strategy: String,
    pub risk_mode: RiskMode,
    pub run_mode: RunMode,
    pub seed_krw: f64,
}

pub struct TradingEngine {
    identity: EngineIdentity,
    store: Arc<StoreClient>,
    exchange: Arc<UpbitClient>,
    executor: OrderExecutor,
    aggregator: ScoreAggregator,
    manager: PositionManager,
    positions: Vec<Position>,
    params: StrategyParams,
    equity: f64,
    ohlcv_call_interval: Duration,
}

/// A candidate carried through scoring with both score flavors attached.
struct ScoredCandidate {
    candidate: Candidate,
    base_score: f64,
    final_score: f64,
    scores: scoring::ScoreSet,
    reason_codes: Vec<String>,
}

/// Σ risk-at-stop of open positions as a fraction of equity (the sizing
/// definition of portfolio risk in use).
pub fn portfolio_risk_at_stop(positions: &[Position], equity: f64) -> f64 {
    if equity <= 0.0 {
        return 0.0;
    }
    positions
        .iter()
        .map(|p| {
            let stop = p.stop_price.unwrap_or(p.avg_entry_price * 0.98);
            (p.avg_entry_price - stop).abs() * p.size / equity
        })
        .sum()
}

impl TradingEngine {
    pub fn new(
        identity: EngineIdentity,
        store: Arc<StoreClient>,
        exchange: Arc<UpbitClient>,
        executor: OrderExecutor,
        ohlcv_call_interval: Duration,
    ) -> Self {
        let params = StrategyParams::preset(&identity.strategy);
        let equity = identity.seed_krw;
        Self {
            identity,
            store,
            exchange,
            executor,
            aggregator: ScoreAggregator::new(ScoreWeights::default()),
            manager: PositionManager,
            positions: Vec::new(),
            params,
            equity,
            ohlcv_call_interval,
        }
    }

    pub fn identity(&self) -> &EngineIdentity {
        &self.identity
    }

    fn name(&self) -> &str {
        &self.identity.trader_name
    }

    /// One full trading iteration.
    pub async fn run_cycle(&mut self) -> anyhow::Result<()> {
        let trader = self.name().to_string();
        info!(%trader, "trading cycle started");
        self.store.post_event(&trader, "INFO", "cycle", "trading cycle started").await;

        // (a) strategy params: active config merged over the preset; a
        // store read failure keeps the last-good params
        match self.store.active_config_params(&self.identity.strategy).await {
            Ok(active) => {
                self.params = StrategyParams::resolve(&self.identity.strategy, active.as_ref());
            }
            Err(e) => {
                warn!("config read failed, reusing last-good params: {e}");
            }
        }

        // (b) regime + composite weights
        let regime_info = self.store.current_regime().await;
        let regime_weight = self
            .store
            .regime_weight(regime_info.regime, regime_info.confidence)
            .await;
        let bandit_weight = self
            .store
            .bandit_weight(regime_info.regime, &self.identity.strategy)
            .await;
        let risk_mult = self.identity.risk_mode.multiplier();

        self.store
            .post_event(
                &trader,
                "INFO",
                "regime",
                &format!(
                    "regime={} confidence={:.2} regime_w={:.2} bandit_w={:.2} risk_w={:.2}",
                    regime_info.regime, regime_info.confidence, regime_weight, bandit_weight,
                    risk_mult
                ),
            )
            .await;
        self.store
            .post_event(
                &trader,
                "INFO",
                "config",
                &format!(
                    "strategy={} entry={:.1} exit={:.1} risk_per_trade={:.4}",
                    self.identity.strategy,
                    self.params.entry_threshold,
                    self.params.exit_threshold,
                    self.params.risk_per_trade
                ),
            )
            .await;

        // (c) PANIC: no entries are even evaluated, shed half of everything
        if regime_info.regime == Regime::Panic {
            warn!(%trader, "PANIC regime — reducing positions, blocking entries");
            self.store
                .post_event(
                    &trader,
                    "WARN",
                    "risk",
                    "PANIC detected: reducing positions by 50% and blocking new entries",
                )
                .await;
            self.reduce_positions_half(regime_info).await;
            return Ok(());
        }

        // (d) screen the universe
        let candidates = self.screen().await?;
        info!(%trader, count = candidates.len(), "screened candidates");
        self.store
            .post_event(&trader, "INFO", "screen", &format!("screened candidates={}", candidates.len()))
            .await;

        // (e)(f) score + rank
        let btc_candles = self.fetch_hourly("KRW-BTC").await.unwrap_or_default();
        let mut scored = Vec::new();
        for candidate in candidates {
            if !self.ohlcv_call_interval.is_zero() {
                tokio::time::sleep(self.ohlcv_call_interval).await;
            }
            match self.fetch_hourly(&candidate.symbol).await {
                Some(candles) if !candles.is_empty() => {
                    scored.push(self.score_candidate(
                        candidate,
                        &candles,
                        &btc_candles,
                        regime_info,
                        regime_weight,
                        bandit_weight,
                        risk_mult,
                    ));
                }
                _ => continue,
            }
        }
        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // (g) entries for the top 10
        self.enter_positions(&scored, regime_info).await;

        // (h) position management
        self.manage_positions(regime_info).await;

        self.store
            .post_event(
                &trader,
                "INFO",
                "cycle",
                &format!("trading cycle finished open_positions={}", self.positions.len()),
            )
            .await;
        Ok(())
    }

    // -- screening ---------------------------------------------------------

    async fn screen(&self) -> anyhow::Result<Vec<Candidate>> {
        let markets = self.exchange.get_krw_markets().await?;
        let tickers = self.exchange.get_tickers(&markets).await?;
        let survivors: Vec<String> = {
            let cfg = screener::ScreenerConfig::default();
            tickers
                .iter()
                .filter(|(_, t)| t.acc_trade_volume_24h * t.trade_price >= cfg.min_24h_volume_krw)
                .map(|(m, _)| m.clone())
                .collect()
        };
        let orderbooks = self.exchange.get_orderbooks(&survivors).await?;
        Ok(screener::screen_markets(&tickers, &orderbooks, &screener::ScreenerConfig::default()))
    }

    async fn fetch_hourly(&self, market: &str) -> Option<Vec<Candle>> {
        match self.exchange.get_candles_minutes(market, 60, 200).await {
            Ok(candles) => Some(candles),
            Err(e) => {
                warn!(%market, "candle fetch failed: {e}");
                self.store.report_api_error(self.name()).await;
                None
            }
        }
    }

    // -- scoring -----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn score_candidate(
        &mut self,
        candidate: Candidate,
        candles: &[Candle],
        btc_candles: &[Candle],
        regime_info: RegimeInfo,
        regime_weight: f64,
        bandit_weight: f64,
        risk_mult: f64,
    ) -> ScoredCandidate {
        let scores = scoring::ScoreSet {
            tp: scoring::score_trend_pullback(candles),
            vcb: scoring::score_volatility_contraction_breakout(candles),
            lsr: scoring::score_liquidity_sweep_reversal(candles),
            lf: scoring::score_leader_follower(candles, btc_candles),
            regime: scoring::score_regime_modifier(regime_info.regime, regime_info.confidence),
        };
        let aggregated = self.aggregator.aggregate(&candidate.symbol, &scores);

        // base = intrinsic quality (gating); final = weighted (ranking only)
        let base_score = aggregated.smoothed_score;
        let final_score = base_score * regime_weight * bandit_weight * risk_mult;

        ScoredCandidate {
            candidate,
            base_score,
            final_score,
            scores,
            reason_codes: aggregated.all_reason_codes,
        }
    }

    // -- entries -----------------------------------------------------------

    async fn enter_positions(&mut self, ranked: &[ScoredCandidate], regime_info: RegimeInfo) {
        let trader = self.name().to_string();

        let (entry_allowed, block_reason) = self.store.entry_allowed(&trader).await;
        if !entry_allowed {
            let reason = block_reason.unwrap_or_else(|| "entry blocked".to_string());
            info!(%trader, %reason, "entries suppressed by runtime guard");
            self.store.post_event(&trader, "WARN", "risk", &format!("entry blocked: {reason}")).await;
            return;
        }

        let held_symbols: HashSet<String> = self.store.held_symbols(&trader).await;
        let checker = PreTradeChecker::new(self.params.entry_threshold);
        let sizer = PositionSizer::new(
            self.equity,
            self.params.risk_per_trade,
            self.params.max_portfolio_risk,
            self.params.slippage_limit,
        );
        let mut current_positions_risk = portfolio_risk_at_stop(&self.positions, self.equity);

        for entry in ranked.iter().take(10) {
            let symbol = &entry.candidate.symbol;
            let existing_idx = self.positions.iter().position(|p| &p.symbol == symbol);
            let is_held = existing_idx.is_some() || held_symbols.contains(symbol);

            let mut is_add_buy = false;
            let mut size_multiplier = 1.0;

            if is_held {
                // ledger says held but memory disagrees: cold-start ambiguity,
                // never double-enter
                let Some(idx) = existing_idx else { continue };
                let buy_count = self.positions[idx].buy_count;

                if !self.params.allow_add_buy
                    || buy_count >= 1 + self.params.max_add_count
                    || entry.base_score < self.params.add_min_base_score
                    || self.params.add_position_ratio <= 0.0
                {
                    continue;
                }
                is_add_buy = true;
                size_multiplier = self.params.add_position_ratio;
            }

            // the duplicate rule is bypassed on the explicit add-buy path
            let held_for_check: Vec<String> =
                if is_add_buy { Vec::new() } else { held_symbols.iter().cloned().collect() };

            let (passed, failed_reasons) = checker.check_all(&ChecklistInput {
                base_score: entry.base_score,
                regime: regime_info.regime,
                expected_order_krw: entry.candidate.avg_depth5_krw * 0.3,
                avg_depth5_krw: entry.candidate.avg_depth5_krw,
                remaining_budget_krw: self.equity * 0.9,
                per_trade_risk_krw: self.equity * self.params.risk_per_trade,
                held_symbols: &held_for_check,
                symbol,
                api_healthy: true,
            });
            if !passed {
                info!(%symbol, ?failed_reasons, "failed pre-trade checklist");
                continue;
            }

            let entry_price = entry.candidate.current_price;
            let stop_price = entry_price * 0.98;
            let sizing = sizer.calculate(entry_price, stop_price, current_positions_risk);
            if sizing.position_size <= 0.0 {
                continue;
            }

            let order_krw = sizing.expected_order_krw * size_multiplier;
            if order_krw <= 0.0 {
                continue;
            }

            // ordering: the ENTRY signal is appended before the BUY order it
            // derives, which in turn precedes the position update
            self.store
                .post_signal(&SignalIn {
                    trader_name: trader.clone(),
                    symbol: symbol.clone(),
                    total_score: entry.final_score,
                    scores: json!({
                        "tp": entry.scores.tp.score,
                        "vcb": entry.scores.vcb.score,
                        "lsr": entry.scores.lsr.score,
                        "lf": entry.scores.lf.score,
                        "regime": entry.scores.regime.score,
                    }),
                    regime: regime_info.regime.as_str().to_string(),
                    action: "ENTRY".to_string(),
                    reason_codes: entry.reason_codes.clone(),
                })
                .await;

            let result = self
                .executor
                .execute_order(
                    &trader,
                    symbol,
                    OrderSide::Buy,
                    entry_price,
                    order_krw,
                    ExecuteParams::default(),
                )
                .await;

            if !result.success {
                let error = result.error.unwrap_or_default();
                warn!(%symbol, %error, "entry order failed");
                self.store
                    .post_event(&trader, "ERROR", "order", &format!("ENTRY FAILED {symbol}: {error}"))
                    .await;
                continue;
            }

            let fill_price = result.avg_price.unwrap_or(entry_price);
            let fill_qty = result.filled_qty;
            self.store.report_slippage(&trader, entry_price, fill_price).await;

            match existing_idx {
                Some(idx) => {
                    self.positions[idx].apply_add_buy(fill_price, fill_qty, entry.base_score);
                }
                None => {
                    self.positions.push(Position::new(
                        symbol.clone(),
                        fill_price,
                        fill_qty,
                        sizing.stop_price,
                        sizing.take_prices.clone(),
                        entry.base_score,
                    ));
                }
            }
            current_positions_risk += (entry_price - stop_price).abs() * fill_qty / self.equity;

            info!(%symbol, fill_price, fill_qty, base = entry.base_score, "entry");
            self.store
                .post_event(
                    &trader,
                    "INFO",
                    "order",
                    &format!(
                        "{} {symbol} base_score={:.2} final_score={:.2} price={fill_price:.0} size={fill_qty:.6}",
                        if is_add_buy { "ADD" } else { "ENTRY" },
                        entry.base_score,
                        entry.final_score,
                    ),
                )
                .await;
        }
    }

    // -- position management -------------------------------------------------

    async fn current_price(&self, symbol: &str) -> Option<f64> {
        match self.exchange.get_ticker(symbol).await {
            Ok(Some(t)) if t.trade_price > 0.0 => Some(t.trade_price),
            _ => None,
        }
    }

    /// PANIC branch: sell 50% of every open position; the rest stays open.
    async fn reduce_positions_half(&mut self, regime_info: RegimeInfo) {
        let trader = self.name().to_string();
        let mut kept = Vec::with_capacity(self.positions.len());

        for mut pos in std::mem::take(&mut self.positions) {
            let sell_size = pos.size * 0.5;
            if sell_size <= 0.0 {
                continue;
            }
            let price = self.current_price(&pos.symbol).await.unwrap_or(pos.avg_entry_price);
            let result = self
                .executor
                .execute_order(
                    &trader,
                    &pos.symbol,
                    OrderSide::Sell,
                    price,
                    sell_size,
                    ExecuteParams::default(),
                )
                .await;

            if result.success {
                let remaining = pos.size - result.filled_qty;
                self.store
                    .post_signal(&SignalIn {
                        trader_name: trader.clone(),
                        symbol: pos.symbol.clone(),
                        total_score: 0.0,
                        scores: json!({}),
                        regime: regime_info.regime.as_str().to_string(),
                        action: "EXIT".to_string(),
                        reason_codes: vec!["PANIC 50% REDUCE".to_string()],
                    })
                    .await;
                self.store
                    .post_event(
                        &trader,
                        "WARN",
                        "order",
                        &format!("PANIC REDUCE {} sold={:.6}", pos.symbol, result.filled_qty),
                    )
                    .await;
                if remaining > 0.0 {
                    pos.size = remaining;
                    kept.push(pos);
                }
            } else {
                let error = result.error.unwrap_or_default();
                warn!(symbol = %pos.symbol, %error, "PANIC reduce failed");
                self.store
                    .post_event(
                        &trader,
                        "ERROR",
                        "order",
                        &format!("PANIC REDUCE FAILED {}: {error}", pos.symbol),
                    )
                    .await;
                kept.push(pos);
            }
        }
        self.positions = kept;
    }

    async fn manage_positions(&mut self, regime_info: RegimeInfo) {
        let trader = self.name().to_string();
        let mut still_open = Vec::with_capacity(self.positions.len());

        for mut pos in std::mem::take(&mut self.positions) {
            let Some(price) = self.current_price(&pos.symbol).await else {
                still_open.push(pos);
                continue;
            };

            let size_before = pos.size;
            let update = self.manager.update_position(&mut pos, price, regime_info.regime);

            match update {
                PositionUpdate::ScaleOut { level, remaining_size } => {
                    let sell_qty = size_before - remaining_size;
                    let result = self
                        .executor
                        .execute_order(
                            &trader,
                            &pos.symbol,
                            OrderSide::Sell,
                            price,
                            sell_qty,
                            ExecuteParams::default(),
                        )
                        .await;
                    if result.success {
                        self.store
                            .post_event(
                                &trader,
                                "INFO",
                                "order",
                                &format!(
                                    "SCALE_OUT {} level={level} sold={:.6} remaining={:.6}",
                                    pos.symbol, result.filled_qty, pos.size
                                ),
                            )
                            .await;
                    } else {
                        // fill failed: restore the fuse so the level re-fires
                        pos.size = size_before;
                        if level == 1 {
                            pos.scale_out_1 = false;
                        } else {
                            pos.scale_out_2 = false;
                        }
                    }
                    still_open.push(pos);
                }
                PositionUpdate::Close { reason } => {
                    self.close_position(&mut pos, price, regime_info, &reason).await;
                }
                PositionUpdate::Hold => {
                    // score-decay exit applies per-symbol policy on top
                    match self.manager.should_close_position(&pos, price, self.params.exit_threshold)
                    {
                        Some(reason) => self.close_position(&mut pos, price, regime_info, &reason).await,
                        None => still_open.push(pos),
                    }
                }
            }
        }
        self.positions = still_open;
    }

    /// SELL the whole position, persist the EXIT, feed safety + bandit.
    async fn close_position(
        &self,
        pos: &mut Position,
        price: f64,
        regime_info: RegimeInfo,
        reason: &str,
    ) {
        let trader = self.name().to_string();
        let result = self
            .executor
            .execute_order(
                &trader,
                &pos.symbol,
                OrderSide::Sell,
                price,
                pos.size,
                ExecuteParams::default(),
            )
            .await;

        self.store
            .post_signal(&SignalIn {
                trader_name: trader.clone(),
                symbol: pos.symbol.clone(),
                total_score: 0.0,
                scores: json!({}),
                regime: regime_info.regime.as_str().to_string(),
                action: "EXIT".to_string(),
                reason_codes: vec![reason.to_string()],
            })
            .await;

        if result.success {
            let fill_price = result.avg_price.unwrap_or(price);
            let realized = (fill_price - pos.avg_entry_price) * result.filled_qty;

            self.store.report_slippage(&trader, price, fill_price).await;
            self.store
                .report_pnl(&trader, (-realized).max(0.0), realized < 0.0)
                .await;
            self.store
                .bandit_update(regime_info.regime, &self.identity.strategy, realized > 0.0)
                .await;

            info!(symbol = %pos.symbol, %reason, realized, "exit");
            self.store
                .post_event(&trader, "INFO", "order", &format!("EXIT {} reason={reason}", pos.symbol))
                .await;
        } else {
            warn!(symbol = %pos.symbol, %reason, "exit order failed");
            self.store
                .post_event(
                    &trader,
                    "ERROR",
                    "order",
                    &format!("EXIT FAILED {} reason={reason}", pos.symbol),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entry: f64, stop: f64, size: f64) -> Position {
        Position::new("KRW-ETH".to_string(), entry, size, stop, vec![], 70.0)
    }

    #[test]
    fn portfolio_risk_sums_risk_at_stop() {
        let positions = vec![position(1000.0, 980.0, 10.0), position(500.0, 490.0, 20.0)];
        // (20·10 + 10·20) / 10_000 = 0.04
        let risk = portfolio_risk_at_stop(&positions, 10_000.0);
        assert!((risk - 0.04).abs() < 1e-12);
    }

    #[test]
    fn missing_stop_assumes_two_percent() {
        let mut p = position(1000.0, 980.0, 10.0);
        p.stop_price = None;
        let risk = portfolio_risk_at_stop(&[p], 10_000.0);
        assert!((risk - 0.02).abs() < 1e-12);
    }

    #[test]
    fn zero_equity_reports_zero_risk() {
        assert_eq!(portfolio_risk_at_stop(&[position(1000.0, 980.0, 1.0)], 0.0), 0.0);
    }
}
