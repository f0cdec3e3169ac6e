//! Market regime classification.
//!
//! The worker samples three candle streams each tick:
//! - BTC 4h × 200 → ADX + ATR% (trend strength, volatility),
//! - hourly × 24 for a fixed top-market list → breadth, dispersion, top-5
//!   value share,
//! - BTC 5m × 100 → whipsaw (directional-change density),
//! and classifies with first-match rules. `classify` is pure so the rule
//! table is testable without market data.

use ats_indicators as ind;
use ats_schemas::{Candle, Regime};
use serde_json::json;

/// The market-wide indicator set one classification runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegimeMetrics {
    pub btc_adx_4h: f64,
    pub btc_atr_pct_4h: f64,
    pub breadth_up_1h: f64,
    pub dispersion_1h: f64,
    pub top5_value_share_1h: f64,
    pub whipsaw_5m: f64,
}

impl RegimeMetrics {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "btc_adx_4h": self.btc_adx_4h,
            "btc_atr_pct_4h": self.btc_atr_pct_4h,
            "breadth_up_1h": self.breadth_up_1h,
            "dispersion_1h": self.dispersion_1h,
            "top5_value_share_1h": self.top5_value_share_1h,
            "whipsaw_5m": self.whipsaw_5m,
        })
    }
}

/// First-match classification. Rules are ordered by severity: PANIC wins
/// over everything, RANGE is the fallback.
pub fn classify(m: &RegimeMetrics) -> (Regime, f64) {
    // panic: violent range with almost nothing rising
    if m.btc_atr_pct_4h > 5.0 && m.breadth_up_1h < 0.3 {
        return (Regime::Panic, 0.80);
    }
    // chop: constant direction flips without trend strength
    if m.whipsaw_5m > 0.6 && m.btc_adx_4h < 20.0 {
        return (Regime::Chop, 0.70);
    }
    // trend: strong ADX, stable direction
    if m.btc_adx_4h > 25.0 && m.whipsaw_5m < 0.3 {
        let confidence = if m.breadth_up_1h > 0.6 { 0.75 } else { 0.65 };
        return (Regime::Trend, confidence);
    }
    // rotation: returns spread out, leadership not concentrated
    if m.dispersion_1h > 0.05 && m.top5_value_share_1h < 0.4 {
        return (Regime::BreakoutRotation, 0.70);
    }
    let confidence = if m.btc_adx_4h < 20.0 && m.whipsaw_5m < 0.5 { 0.70 } else { 0.60 };
    (Regime::Range, confidence)
}

/// Derive the metric set from raw candle data.
///
/// `market_hourlies` holds one hourly series per watched market
/// (oldest-first, ~24 bars each).
pub fn compute_metrics(
    btc_4h: &[Candle],
    btc_5m: &[Candle],
    market_hourlies: &[Vec<Candle>],
) -> RegimeMetrics {
    let closes_5m: Vec<f64> = btc_5m.iter().map(|c| c.close).collect();

    let market_closes: Vec<Vec<f64>> = market_hourlies
        .iter()
        .map(|cs| cs.iter().map(|c| c.close).collect())
        .collect();
    let latest_bars: Vec<(f64, f64)> = market_hourlies
        .iter()
        .filter_map(|cs| cs.last().map(|c| (c.close, c.volume)))
        .collect();

    RegimeMetrics {
        btc_adx_4h: ind::adx(btc_4h, 14),
        btc_atr_pct_4h: ind::atr_pct(btc_4h, 14),
        breadth_up_1h: ind::breadth_up(&market_closes),
        dispersion_1h: ind::dispersion(&market_closes),
        top5_value_share_1h: ind::top5_value_share(&latest_bars),
        whipsaw_5m: ind::whipsaw(&closes_5m, 5),
    }
}

/// The fixed market list scanned for breadth/dispersion metrics.
pub const BREADTH_MARKETS: [&str; 10] = [
    "KRW-BTC", "KRW-ETH", "KRW-XRP", "KRW-SOL", "KRW-ADA",
    "KRW-DOGE", "KRW-AVAX", "KRW-LINK", "KRW-DOT", "KRW-TRX",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> RegimeMetrics {
        RegimeMetrics {
            btc_adx_4h: 22.0,
            btc_atr_pct_4h: 2.0,
            breadth_up_1h: 0.5,
            dispersion_1h: 0.02,
            top5_value_share_1h: 0.6,
            whipsaw_5m: 0.4,
        }
    }

    #[test]
    fn panic_wins_over_everything() {
        let m = RegimeMetrics {
            btc_atr_pct_4h: 5.5,
            breadth_up_1h: 0.2,
            // values that would otherwise classify as TREND
            btc_adx_4h: 40.0,
            whipsaw_5m: 0.1,
            ..metrics()
        };
        assert_eq!(classify(&m), (Regime::Panic, 0.80));
    }

    #[test]
    fn high_atr_alone_is_not_panic() {
        let m = RegimeMetrics { btc_atr_pct_4h: 6.0, breadth_up_1h: 0.5, ..metrics() };
        assert_ne!(classify(&m).0, Regime::Panic);
    }

    #[test]
    fn chop_needs_whipsaw_and_weak_adx() {
        let m = RegimeMetrics { whipsaw_5m: 0.7, btc_adx_4h: 15.0, ..metrics() };
        assert_eq!(classify(&m), (Regime::Chop, 0.70));

        let strong_adx = RegimeMetrics { whipsaw_5m: 0.7, btc_adx_4h: 30.0, ..metrics() };
        assert_ne!(classify(&strong_adx).0, Regime::Chop);
    }

    #[test]
    fn trend_confidence_scales_with_breadth() {
        let wide = RegimeMetrics { btc_adx_4h: 30.0, whipsaw_5m: 0.2, breadth_up_1h: 0.7, ..metrics() };
        assert_eq!(classify(&wide), (Regime::Trend, 0.75));

        let narrow = RegimeMetrics { btc_adx_4h: 30.0, whipsaw_5m: 0.2, breadth_up_1h: 0.4, ..metrics() };
        assert_eq!(classify(&narrow), (Regime::Trend, 0.65));
    }

    #[test]
    fn rotation_needs_dispersion_without_concentration() {
        let m = RegimeMetrics { dispersion_1h: 0.06, top5_value_share_1h: 0.3, ..metrics() };
        assert_eq!(classify(&m), (Regime::BreakoutRotation, 0.70));

        let concentrated = RegimeMetrics { dispersion_1h: 0.06, top5_value_share_1h: 0.5, ..metrics() };
        assert_ne!(classify(&concentrated).0, Regime::BreakoutRotation);
    }

    #[test]
    fn range_is_the_fallback_with_two_confidences() {
        let quiet = RegimeMetrics { btc_adx_4h: 15.0, whipsaw_5m: 0.3, ..metrics() };
        assert_eq!(classify(&quiet), (Regime::Range, 0.70));

        let noisy = RegimeMetrics { btc_adx_4h: 22.0, whipsaw_5m: 0.55, ..metrics() };
        assert_eq!(classify(&noisy), (Regime::Range, 0.60));
    }

    #[test]
    fn compute_metrics_handles_empty_input() {
        let m = compute_metrics(&[], &[], &[]);
        assert_eq!(m, RegimeMetrics::default());
        // empty metrics fall through to RANGE
        assert_eq!(classify(&m).0, Regime::Range);
    }
}
