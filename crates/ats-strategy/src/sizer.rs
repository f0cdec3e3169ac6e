//! Risk-based position sizing.

use serde::{Deserialize, Serialize};

const FEE_RATE: f64 = 0.0005;
const TAKE_MULTIPLES: [f64; 3] = [1.5, 2.5, 4.0];

#[derive(Debug, Clone)]
pub struct PositionSizer {
    pub equity: f64,
    pub risk_per_trade: f64,
    pub max_portfolio_risk: f64,
    pub slippage_limit: f64,
}

/// One sizing decision. `position_size` is in coin units; `take_prices`
/// holds the three scale-out levels in trade direction at 1.5R/2.5R/4R.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sizing {
    pub position_size: f64,
    pub dollar_risk: f64,
    pub expected_order_krw: f64,
    pub stop_price: f64,
    pub take_prices: Vec<f64>,
    pub estimated_fee: f64,
    pub max_position_size: f64,
}

impl PositionSizer {
    pub fn new(equity: f64, risk_per_trade: f64, max_portfolio_risk: f64, slippage_limit: f64) -> Self {
        Self { equity, risk_per_trade, max_portfolio_risk, slippage_limit }
    }

    /// Size a trade from entry/stop distance under the per-trade and
    /// portfolio risk caps. `current_open_positions_risk` is the summed
    /// risk-at-stop of open positions as a fraction of equity.
    pub fn calculate(
        &self,
        entry_price: f64,
        stop_price: f64,
        current_open_positions_risk: f64,
    ) -> Sizing {
        let mut out = Sizing { stop_price, ..Default::default() };

        if entry_price <= 0.0 || stop_price <= 0.0 {
            return out;
        }
        let price_risk_per_unit = (entry_price - stop_price).abs();
        if price_risk_per_unit == 0.0 {
            return out;
        }

        let dollar_risk = self.equity * self.risk_per_trade;
        let mut position_size = dollar_risk / price_risk_per_unit;

        let remaining = self.max_portfolio_risk - current_open_positions_risk;
        if remaining <= 0.0 {
            position_size = 0.0;
            out.max_position_size = 0.0;
        } else {
            let max_dollar_risk = self.equity * remaining;
            out.max_position_size = max_dollar_risk / price_risk_per_unit;
            position_size = position_size.min(out.max_position_size);
        }

        out.position_size = position_size;
        out.dollar_risk = dollar_risk;
        out.expected_order_krw = position_size * entry_price;
        out.estimated_fee = out.expected_order_krw * FEE_RATE * 2.0;

        let direction = if entry_price > stop_price { 1.0 } else { -1.0 };
        out.take_prices = TAKE_MULTIPLES
            .iter()
            .map(|m| entry_price + direction * price_risk_per_unit * m)
            .collect();

        out
    }

    /// Check an actual fill price against the configured slippage limit.
    /// Returns `(acceptable, slippage_fraction)`.
    pub fn check_slippage(&self, expected_price: f64, actual_price: f64) -> (bool, f64) {
        if expected_price == 0.0 {
            return (false, 999.0);
        }
        let slippage = ((actual_price - expected_price) / expected_price).abs();
        (slippage <= self.slippage_limit, slippage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(10_000_000.0, 0.01, 0.05, 0.005)
    }

    #[test]
    fn risk_at_stop_never_exceeds_per_trade_budget() {
        let s = sizer();
        let out = s.calculate(1000.0, 980.0, 0.0);
        let risk = out.position_size * 20.0;
        assert!(risk <= s.equity * s.risk_per_trade + 1e-9);
        assert!((risk - 100_000.0).abs() < 1e-6);
    }

    #[test]
    fn portfolio_cap_clamps_the_size() {
        let s = sizer();
        // 4.5% already at risk leaves only 0.5% headroom
        let out = s.calculate(1000.0, 980.0, 0.045);
        let risk = out.position_size * 20.0;
        assert!(risk <= s.equity * (s.max_portfolio_risk - 0.045) + 1e-9);
        assert!(out.position_size < s.calculate(1000.0, 980.0, 0.0).position_size);
    }

    #[test]
    fn exhausted_portfolio_risk_sizes_zero() {
        let s = sizer();
        let out = s.calculate(1000.0, 980.0, 0.05);
        assert_eq!(out.position_size, 0.0);
        assert_eq!(out.max_position_size, 0.0);
    }

    #[test]
    fn zero_stop_distance_sizes_zero() {
        let s = sizer();
        let out = s.calculate(1000.0, 1000.0, 0.0);
        assert_eq!(out.position_size, 0.0);
        assert!(out.take_prices.is_empty());
    }

    #[test]
    fn takes_ladder_up_for_longs() {
        let s = sizer();
        let out = s.calculate(1000.0, 980.0, 0.0);
        assert_eq!(out.take_prices, vec![1030.0, 1050.0, 1080.0]);
    }

    #[test]
    fn round_trip_fee_is_five_bps_each_way() {
        let s = sizer();
        let out = s.calculate(1000.0, 980.0, 0.0);
        assert!((out.estimated_fee - out.expected_order_krw * 0.001).abs() < 1e-9);
    }

    #[test]
    fn slippage_check_uses_the_configured_limit() {
        let s = sizer();
        let (ok, slip) = s.check_slippage(1000.0, 1004.0);
        assert!(ok);
        assert!((slip - 0.004).abs() < 1e-12);
        let (ok2, _) = s.check_slippage(1000.0, 1006.0);
        assert!(!ok2);
        let (ok3, _) = s.check_slippage(0.0, 1000.0);
        assert!(!ok3);
    }
}
