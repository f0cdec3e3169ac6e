//! The five scoring modules. Each returns a [`ModuleScore`] with a value in
//! [0, 100] and the reason codes that explain it.
//!
//! Candle slices are oldest-first hourly bars (~200 of them). BTC candles
//! use the same shape so the leader-follower module can compare returns.

use ats_indicators::{bollinger, ema, realized_vol};
use ats_schemas::{Candle, Regime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleScore {
    pub score: f64,
    pub reasons: Vec<String>,
}

impl ModuleScore {
    fn zero(reason: &str) -> Self {
        Self { score: 0.0, reasons: vec![reason.to_string()] }
    }
}

/// All five module outputs for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreSet {
    pub tp: ModuleScore,
    pub vcb: ModuleScore,
    pub lsr: ModuleScore,
    pub lf: ModuleScore,
    pub regime: ModuleScore,
}

fn clamp_score(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

// ---------------------------------------------------------------------------
// TP — trend pullback
// ---------------------------------------------------------------------------

const TP_SWING_LOOKBACK: usize = 50;

/// Requires EMA50 > EMA200 (uptrend), then rewards a pullback sitting
/// 0.3–0.7 deep into the recent swing range, peaking at 0.5.
pub fn score_trend_pullback(candles: &[Candle]) -> ModuleScore {
    if candles.len() < 60 {
        return ModuleScore::zero("TP_INSUFFICIENT_DATA");
    }
    let closes = closes(candles);
    let ema50 = ema(&closes, 50);
    let ema200 = ema(&closes, 200);
    if ema50 <= ema200 {
        return ModuleScore::zero("TP_NO_UPTREND");
    }

    let window = &candles[candles.len() - TP_SWING_LOOKBACK.min(candles.len())..];
    let swing_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let swing_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range = swing_high - swing_low;
    if range <= 0.0 {
        return ModuleScore::zero("TP_FLAT_RANGE");
    }

    let last = closes[closes.len() - 1];
    // depth 0 = at the swing high, 1 = at the swing low
    let depth = (swing_high - last) / range;
    if !(0.3..=0.7).contains(&depth) {
        return ModuleScore {
            score: 0.0,
            reasons: vec!["TP_TREND_OK".to_string(), "TP_OUT_OF_PULLBACK_ZONE".to_string()],
        };
    }

    // triangular peak at depth 0.5
    let score = clamp_score(100.0 * (1.0 - (depth - 0.5).abs() / 0.2));
    ModuleScore { score, reasons: vec!["TP_TREND_OK".to_string(), "TP_PULLBACK_ZONE".to_string()] }
}

// ---------------------------------------------------------------------------
// VCB — volatility contraction breakout
// ---------------------------------------------------------------------------

const VCB_VOL_WINDOW: usize = 10;
const VCB_CONTRACTION_MAX_RATIO: f64 = 0.8;

/// Requires the recent 10-bar realized vol to be < 0.8× the prior 10-bar
/// vol, then rewards an upward Bollinger-band breakout scaled by how deep
/// the contraction is.
pub fn score_volatility_contraction_breakout(candles: &[Candle]) -> ModuleScore {
    if candles.len() < VCB_VOL_WINDOW * 2 + 21 {
        return ModuleScore::zero("VCB_INSUFFICIENT_DATA");
    }
    let closes = closes(candles);

    let recent_vol = realized_vol(&closes, VCB_VOL_WINDOW);
    let prior_vol = realized_vol(&closes[..closes.len() - VCB_VOL_WINDOW], VCB_VOL_WINDOW);
    if prior_vol <= 0.0 {
        return ModuleScore::zero("VCB_NO_PRIOR_VOL");
    }
    let ratio = recent_vol / prior_vol;
    if ratio >= VCB_CONTRACTION_MAX_RATIO {
        return ModuleScore::zero("VCB_NO_CONTRACTION");
    }

    let (upper, _lower) = bollinger(&closes[..closes.len() - 1], 20, 2.0);
    let last = closes[closes.len() - 1];
    if last <= upper {
        return ModuleScore {
            score: 0.0,
            reasons: vec!["VCB_CONTRACTION".to_string(), "VCB_NO_BREAKOUT".to_string()],
        };
    }

    // deeper contraction = more coiled spring = higher score
    let contraction_depth = (VCB_CONTRACTION_MAX_RATIO - ratio) / VCB_CONTRACTION_MAX_RATIO;
    let score = clamp_score(100.0 * contraction_depth);
    ModuleScore {
        score,
        reasons: vec!["VCB_CONTRACTION".to_string(), "VCB_UPPER_BREAKOUT".to_string()],
    }
}

// ---------------------------------------------------------------------------
// LSR — liquidity sweep reversal
// ---------------------------------------------------------------------------

const LSR_LOOKBACK: usize = 20;

/// Rewards a long-wicked last candle that pierces the 20-bar low and closes
/// back above it (a swept-then-reclaimed level). Bearish sweeps of the
/// 20-bar high score zero on a long-only book.
pub fn score_liquidity_sweep_reversal(candles: &[Candle]) -> ModuleScore {
    if candles.len() < LSR_LOOKBACK + 1 {
        return ModuleScore::zero("LSR_INSUFFICIENT_DATA");
    }
    let last = candles[candles.len() - 1];
    let prior = &candles[candles.len() - 1 - LSR_LOOKBACK..candles.len() - 1];
    let prior_low = prior.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let prior_high = prior.iter().map(|c| c.high).fold(f64::MIN, f64::max);

    let range = last.high - last.low;
    if range <= 0.0 {
        return ModuleScore::zero("LSR_NO_RANGE");
    }

    // bullish sweep: wick below the prior low, close reclaimed above it
    if last.low < prior_low && last.close > prior_low {
        let lower_wick = last.close.min(last.open) - last.low;
        let wick_ratio = (lower_wick / range).clamp(0.0, 1.0);
        let score = clamp_score(100.0 * wick_ratio * 1.5);
        return ModuleScore {
            score,
            reasons: vec!["LSR_BULL_SWEEP".to_string()],
        };
    }

    if last.high > prior_high && last.close < prior_high {
        return ModuleScore::zero("LSR_BEAR_SWEEP");
    }

    ModuleScore::zero("LSR_NO_SWEEP")
}

// ---------------------------------------------------------------------------
// LF — leader / follower
// ---------------------------------------------------------------------------

const LF_LOOKBACK: usize = 20;

/// Relative 20-bar return versus BTC. In a BTC uptrend, outperformance
/// scores; in a downtrend, resilience (losing less than BTC) scores.
pub fn score_leader_follower(candles: &[Candle], btc_candles: &[Candle]) -> ModuleScore {
    if candles.len() < LF_LOOKBACK + 1 || btc_candles.len() < LF_LOOKBACK + 1 {
        return ModuleScore::zero("LF_INSUFFICIENT_DATA");
    }
    let ret = |cs: &[Candle]| -> Option<f64> {
        let start = cs[cs.len() - 1 - LF_LOOKBACK].close;
        let end = cs[cs.len() - 1].close;
        if start > 0.0 {
            Some(end / start - 1.0)
        } else {
            None
        }
    };
    let (Some(sym_ret), Some(btc_ret)) = (ret(candles), ret(btc_candles)) else {
        return ModuleScore::zero("LF_BAD_SERIES");
    };
    let relative = sym_ret - btc_ret;

    if btc_ret >= 0.0 {
        // +5% relative outperformance saturates the score
        let score = clamp_score(50.0 + relative / 0.05 * 50.0);
        let reason = if relative > 0.0 { "LF_OUTPERFORM_UPTREND" } else { "LF_LAGGING_UPTREND" };
        ModuleScore { score, reasons: vec![reason.to_string()] }
    } else {
        // downtrend: holding flat while BTC bleeds is the signal
        let score = clamp_score(50.0 + relative / 0.05 * 40.0);
        let reason = if relative > 0.0 { "LF_RESILIENT_DOWNTREND" } else { "LF_WEAK_DOWNTREND" };
        ModuleScore { score, reasons: vec![reason.to_string()] }
    }
}

// ---------------------------------------------------------------------------
// Regime modifier
// ---------------------------------------------------------------------------

/// Fixed per-regime table scaled by classifier confidence.
pub fn score_regime_modifier(regime: Regime, confidence: f64) -> ModuleScore {
    let table = match regime {
        Regime::Trend => 80.0,
        Regime::BreakoutRotation => 70.0,
        Regime::Range => 50.0,
        Regime::Chop => 20.0,
        Regime::Panic => 0.0,
    };
    let score = clamp_score(table * confidence.clamp(0.0, 1.0));
    ModuleScore { score, reasons: vec![format!("REGIME_{}", regime.as_str())] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle { ts: 0, open, high, low, close, volume: 1.0 }
    }

    fn flat_series(n: usize, price: f64) -> Vec<Candle> {
        (0..n).map(|_| candle(price, price, price, price)).collect()
    }

    /// Rising series that then pulls back `depth` of the swing range.
    fn pullback_series(depth: f64) -> Vec<Candle> {
        let mut cs: Vec<Candle> = (0..200)
            .map(|i| {
                let p = 100.0 + i as f64;
                candle(p, p + 0.5, p - 0.5, p)
            })
            .collect();
        let high = 100.0 + 199.0 + 0.5;
        let low_in_window = 100.0 + 150.0 - 0.5; // lowest of the last 50 bars
        let range = high - low_in_window;
        let target = high - depth * range;
        let last = cs.last_mut().unwrap();
        last.close = target;
        last.high = high;
        last.low = target.min(low_in_window);
        cs
    }

    #[test]
    fn tp_rejects_downtrend() {
        let cs: Vec<Candle> = (0..200)
            .map(|i| {
                let p = 300.0 - i as f64;
                candle(p, p + 0.5, p - 0.5, p)
            })
            .collect();
        let s = score_trend_pullback(&cs);
        assert_eq!(s.score, 0.0);
        assert!(s.reasons.contains(&"TP_NO_UPTREND".to_string()));
    }

    #[test]
    fn tp_peaks_at_half_depth() {
        let mid = score_trend_pullback(&pullback_series(0.5));
        let edge = score_trend_pullback(&pullback_series(0.65));
        assert!(mid.score > edge.score, "mid={} edge={}", mid.score, edge.score);
        assert!(mid.score > 90.0);
        assert!(mid.reasons.contains(&"TP_PULLBACK_ZONE".to_string()));
    }

    #[test]
    fn tp_outside_zone_scores_zero() {
        let shallow = score_trend_pullback(&pullback_series(0.1));
        assert_eq!(shallow.score, 0.0);
        assert!(shallow.reasons.contains(&"TP_OUT_OF_PULLBACK_ZONE".to_string()));
    }

    #[test]
    fn vcb_needs_contraction() {
        // steady noisy series, no contraction
        let cs: Vec<Candle> = (0..100)
            .map(|i| {
                let p = 100.0 + if i % 2 == 0 { 5.0 } else { -5.0 };
                candle(p, p + 1.0, p - 1.0, p)
            })
            .collect();
        let s = score_volatility_contraction_breakout(&cs);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn vcb_rewards_breakout_after_contraction() {
        // wild early, quiet late, then a pop above the band
        let mut cs: Vec<Candle> = (0..80)
            .map(|i| {
                let p = 100.0 + if i % 2 == 0 { 8.0 } else { -8.0 };
                candle(p, p + 1.0, p - 1.0, p)
            })
            .collect();
        for _ in 0..9 {
            cs.push(candle(100.0, 100.3, 99.7, 100.0));
        }
        cs.push(candle(100.0, 121.0, 100.0, 120.0));
        let s = score_volatility_contraction_breakout(&cs);
        assert!(s.score > 0.0, "expected breakout score, got {:?}", s);
        assert!(s.reasons.contains(&"VCB_UPPER_BREAKOUT".to_string()));
    }

    #[test]
    fn lsr_scores_bullish_sweep() {
        let mut cs = flat_series(30, 100.0);
        // wick deep below the 20-bar low (100), close reclaimed at 101
        cs.push(candle(100.5, 101.5, 90.0, 101.0));
        let s = score_liquidity_sweep_reversal(&cs);
        assert!(s.score > 50.0, "got {:?}", s);
        assert!(s.reasons.contains(&"LSR_BULL_SWEEP".to_string()));
    }

    #[test]
    fn lsr_ignores_bearish_sweep() {
        let mut cs = flat_series(30, 100.0);
        cs.push(candle(100.0, 110.0, 99.5, 99.8));
        let s = score_liquidity_sweep_reversal(&cs);
        assert_eq!(s.score, 0.0);
        assert!(s.reasons.contains(&"LSR_BEAR_SWEEP".to_string()));
    }

    #[test]
    fn lf_outperformance_in_uptrend_scores_high() {
        let btc: Vec<Candle> = (0..30).map(|i| {
            let p = 100.0 * (1.0 + i as f64 * 0.001);
            candle(p, p, p, p)
        }).collect();
        let strong: Vec<Candle> = (0..30).map(|i| {
            let p = 100.0 * (1.0 + i as f64 * 0.004);
            candle(p, p, p, p)
        }).collect();
        let s = score_leader_follower(&strong, &btc);
        assert!(s.score > 80.0, "got {:?}", s);
        assert!(s.reasons.contains(&"LF_OUTPERFORM_UPTREND".to_string()));
    }

    #[test]
    fn lf_resilience_in_downtrend_scores_above_neutral() {
        let btc: Vec<Candle> = (0..30).map(|i| {
            let p = 100.0 * (1.0 - i as f64 * 0.003);
            candle(p, p, p, p)
        }).collect();
        let steady = flat_series(30, 100.0);
        let s = score_leader_follower(&steady, &btc);
        assert!(s.score > 50.0, "got {:?}", s);
        assert!(s.reasons.contains(&"LF_RESILIENT_DOWNTREND".to_string()));
    }

    #[test]
    fn regime_modifier_scales_with_confidence() {
        assert_eq!(score_regime_modifier(Regime::Trend, 1.0).score, 80.0);
        assert_eq!(score_regime_modifier(Regime::Trend, 0.5).score, 40.0);
        assert_eq!(score_regime_modifier(Regime::Panic, 0.9).score, 0.0);
    }
}
