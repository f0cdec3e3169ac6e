//! Open-position bookkeeping: trailing stops, scale-outs, and close rules.
//!
//! The in-memory [`Position`] carries the richer per-position fields (stop,
//! takes, scale-out fuses) that the order ledger does not. The ledger stays
//! the source of truth for *whether* a symbol is held; these values only
//! shape how the hold is managed.

use serde::{Deserialize, Serialize};

use ats_schemas::Regime;

const TRAIL_ACTIVATE_PCT: f64 = 2.0;
const TRAIL_STOP_FACTOR: f64 = 1.01;
const CHOP_CLOSE_PCT: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub avg_entry_price: f64,
    /// Coin quantity currently held.
    pub size: f64,
    pub stop_price: Option<f64>,
    pub take_prices: Vec<f64>,
    pub entry_score: f64,
    pub buy_count: u32,
    pub scale_out_1: bool,
    pub scale_out_2: bool,
    pub status: PositionStatus,
    pub current_price: f64,
    pub unreal_pnl: f64,
    pub unreal_pnl_pct: f64,
}

impl Position {
    pub fn new(symbol: String, avg_entry_price: f64, size: f64, stop_price: f64, take_prices: Vec<f64>, entry_score: f64) -> Self {
        Self {
            symbol,
            avg_entry_price,
            size,
            stop_price: Some(stop_price),
            take_prices,
            entry_score,
            buy_count: 1,
            scale_out_1: false,
            scale_out_2: false,
            status: PositionStatus::Open,
            current_price: avg_entry_price,
            unreal_pnl: 0.0,
            unreal_pnl_pct: 0.0,
        }
    }

    /// Blend an add-buy fill into the average entry price.
    pub fn apply_add_buy(&mut self, fill_price: f64, fill_qty: f64, new_entry_score: f64) {
        let new_size = self.size + fill_qty;
        if new_size > 0.0 {
            self.avg_entry_price =
                (self.avg_entry_price * self.size + fill_price * fill_qty) / new_size;
        } else {
            self.avg_entry_price = fill_price;
        }
        self.size = new_size;
        self.entry_score = new_entry_score;
        self.buy_count += 1;
    }
}

/// What one update pass decided for a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionUpdate {
    Hold,
    /// A scale-out level fired; sell down to `remaining_size`.
    ScaleOut { level: u8, remaining_size: f64 },
    Close { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct PositionManager;

impl PositionManager {
    /// Refresh one position against the current price and apply the
    /// management ladder in order: trailing stop, scale-outs, regime close,
    /// stop hit. The returned update tells the engine what to execute; the
    /// position's own fields (stop, fuses, pnl) are already advanced.
    pub fn update_position(
        &self,
        pos: &mut Position,
        current_price: f64,
        regime: Regime,
    ) -> PositionUpdate {
        if current_price <= 0.0 || pos.size <= 0.0 {
            return PositionUpdate::Hold;
        }

        pos.current_price = current_price;
        pos.unreal_pnl = (current_price - pos.avg_entry_price) * pos.size;
        pos.unreal_pnl_pct = if pos.avg_entry_price > 0.0 {
            (current_price / pos.avg_entry_price - 1.0) * 100.0
        } else {
            0.0
        };

        // trailing: once +2%, stop ratchets up to entry·1.01
        if pos.unreal_pnl_pct > TRAIL_ACTIVATE_PCT {
            let new_stop = pos.avg_entry_price * TRAIL_STOP_FACTOR;
            if pos.stop_price.map_or(true, |s| new_stop > s) {
                pos.stop_price = Some(new_stop);
            }
        }

        // scale-outs fire at most once each
        if pos.unreal_pnl_pct > 0.0 && !pos.take_prices.is_empty() {
            if !pos.scale_out_1 && current_price >= pos.take_prices[0] {
                pos.scale_out_1 = true;
                let remaining = pos.size * 2.0 / 3.0;
                pos.size = remaining;
                return PositionUpdate::ScaleOut { level: 1, remaining_size: remaining };
            }
            if pos.scale_out_1
                && !pos.scale_out_2
                && pos.take_prices.len() > 1
                && current_price >= pos.take_prices[1]
            {
                pos.scale_out_2 = true;
                let remaining = pos.size * 0.5; // 2/3 → 1/3 of the original
                pos.size = remaining;
                return PositionUpdate::ScaleOut { level: 2, remaining_size: remaining };
            }
        }

        if regime == Regime::Chop && pos.unreal_pnl_pct < CHOP_CLOSE_PCT {
            pos.status = PositionStatus::Closed;
            return PositionUpdate::Close {
                reason: format!("CHOP 레짐 손실 청산 ({:.2}%)", pos.unreal_pnl_pct),
            };
        }

        if let Some(stop) = pos.stop_price {
            if current_price <= stop {
                pos.status = PositionStatus::Closed;
                return PositionUpdate::Close {
                    reason: format!("손절 도달 ({:.0} <= {:.0})", current_price, stop),
                };
            }
        }

        PositionUpdate::Hold
    }

    /// Score-decay exit: close when the position's entry score has fallen
    /// under the strategy's exit threshold.
    pub fn should_close_position(
        &self,
        pos: &Position,
        current_price: f64,
        exit_threshold: f64,
    ) -> Option<String> {
        if pos.entry_score < exit_threshold {
            return Some(format!("점수 하락 ({:.1} < {})", pos.entry_score, exit_threshold));
        }
        if let Some(stop) = pos.stop_price {
            if current_price > 0.0 && current_price <= stop {
                return Some(format!("손절 도달 ({:.0} <= {:.0})", current_price, stop));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new("KRW-ETH".to_string(), 1000.0, 9.0, 980.0, vec![1030.0, 1050.0, 1080.0], 70.0)
    }

    #[test]
    fn pnl_is_refreshed() {
        let mgr = PositionManager;
        let mut p = pos();
        let upd = mgr.update_position(&mut p, 1010.0, Regime::Trend);
        assert_eq!(upd, PositionUpdate::Hold);
        assert!((p.unreal_pnl - 90.0).abs() < 1e-9);
        assert!((p.unreal_pnl_pct - 1.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_arms_above_two_percent() {
        let mgr = PositionManager;
        let mut p = pos();
        mgr.update_position(&mut p, 1025.0, Regime::Trend);
        assert_eq!(p.stop_price, Some(1010.0));
        // never ratchets down
        mgr.update_position(&mut p, 1026.0, Regime::Trend);
        assert_eq!(p.stop_price, Some(1010.0));
    }

    #[test]
    fn first_take_scales_to_two_thirds_once() {
        let mgr = PositionManager;
        let mut p = pos();
        let upd = mgr.update_position(&mut p, 1031.0, Regime::Trend);
        assert_eq!(upd, PositionUpdate::ScaleOut { level: 1, remaining_size: 6.0 });
        assert!(p.scale_out_1);
        // the same level does not fire twice
        let upd2 = mgr.update_position(&mut p, 1032.0, Regime::Trend);
        assert_eq!(upd2, PositionUpdate::Hold);
        assert_eq!(p.size, 6.0);
    }

    #[test]
    fn second_take_scales_to_one_third() {
        let mgr = PositionManager;
        let mut p = pos();
        mgr.update_position(&mut p, 1031.0, Regime::Trend);
        let upd = mgr.update_position(&mut p, 1051.0, Regime::Trend);
        assert_eq!(upd, PositionUpdate::ScaleOut { level: 2, remaining_size: 3.0 });
        assert!(p.scale_out_2);
    }

    #[test]
    fn chop_regime_closes_losers_only() {
        let mgr = PositionManager;
        let mut winner = pos();
        assert_eq!(mgr.update_position(&mut winner, 1005.0, Regime::Chop), PositionUpdate::Hold);

        let mut loser = pos();
        loser.stop_price = Some(900.0); // keep the stop out of the way
        match mgr.update_position(&mut loser, 985.0, Regime::Chop) {
            PositionUpdate::Close { reason } => assert!(reason.contains("CHOP")),
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(loser.status, PositionStatus::Closed);
    }

    #[test]
    fn stop_hit_closes() {
        let mgr = PositionManager;
        let mut p = pos();
        match mgr.update_position(&mut p, 975.0, Regime::Trend) {
            PositionUpdate::Close { reason } => assert!(reason.contains("손절")),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[test]
    fn score_decay_triggers_exit() {
        let mgr = PositionManager;
        let mut p = pos();
        p.entry_score = 30.0;
        let reason = mgr.should_close_position(&p, 1000.0, 40.0).unwrap();
        assert!(reason.contains("점수 하락"));
    }

    #[test]
    fn healthy_position_is_not_closed() {
        let mgr = PositionManager;
        let p = pos();
        assert!(mgr.should_close_position(&p, 1000.0, 40.0).is_none());
    }

    #[test]
    fn add_buy_blends_average_price() {
        let mut p = pos();
        p.apply_add_buy(1100.0, 3.0, 75.0);
        // (1000·9 + 1100·3) / 12 = 1025
        assert!((p.avg_entry_price - 1025.0).abs() < 1e-9);
        assert_eq!(p.size, 12.0);
        assert_eq!(p.buy_count, 2);
        assert_eq!(p.entry_score, 75.0);
    }
}
