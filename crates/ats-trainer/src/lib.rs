//! Trainer library: feature extraction and forward-return labeling.
//!
//! The worker loop (`main.rs`) collects candles, derives features at scan
//! time, and once enough wall-clock has passed replays the forward window
//! to attach labels. Both transforms are pure here.

use ats_eval::LabeledSnapshot;
use ats_indicators as ind;
use ats_schemas::Candle;
use serde_json::{json, Value};

/// Snapshot-time features for one market over ~200 hourly candles.
pub fn compute_features(candles: &[Candle]) -> Value {
    if candles.len() < 20 {
        return json!({});
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let (bb_upper, bb_lower) = ind::bollinger(&closes, 20, 2.0);

    json!({
        "price": closes[closes.len() - 1],
        "volume_ma_20": ind::mean(&volumes[volumes.len() - 20..]),
        "rsi_14": ind::rsi(&closes, 14),
        "macd": ind::macd(&closes),
        "bb_upper": bb_upper,
        "bb_lower": bb_lower,
    })
}

/// Forward-return labels from the candles that followed a snapshot.
///
/// `forward` holds the bars strictly after the snapshot, oldest-first.
/// Each horizon label stays `None` until the forward window actually covers
/// it (60m = 1 hourly bar, 240m = 4).
pub fn compute_labels(entry_price: f64, forward: &[Candle]) -> LabeledSnapshot {
    if entry_price <= 0.0 || forward.is_empty() {
        return LabeledSnapshot::default();
    }

    let ret_at = |bars: usize| -> Option<f64> {
        if forward.len() < bars {
            return None;
        }
        Some(forward[bars - 1].close / entry_price - 1.0)
    };

    let window_240 = &forward[..forward.len().min(4)];
    let have_240 = forward.len() >= 4;

    let high = window_240.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window_240.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    LabeledSnapshot {
        ret_60m: ret_at(1),
        ret_240m: ret_at(4),
        mfe_240m: have_240.then(|| (high - entry_price) / entry_price),
        mae_240m: have_240.then(|| (entry_price - low) / entry_price),
        dd_240m: have_240.then(|| (low - entry_price) / entry_price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle { ts: 0, open: close, high, low, close, volume: 10.0 }
    }

    #[test]
    fn features_empty_for_thin_series() {
        assert_eq!(compute_features(&[candle(1.0, 1.0, 1.0); 5]), json!({}));
    }

    #[test]
    fn features_carry_price_and_band_order() {
        let candles: Vec<Candle> =
            (0..60).map(|i| candle(101.0 + (i % 3) as f64, 99.0, 100.0 + (i % 3) as f64)).collect();
        let f = compute_features(&candles);
        assert!(f["price"].as_f64().unwrap() > 0.0);
        assert!(f["bb_upper"].as_f64().unwrap() >= f["bb_lower"].as_f64().unwrap());
        assert!(f["rsi_14"].as_f64().is_some());
    }

    #[test]
    fn labels_stay_none_until_horizon_covered() {
        let labels = compute_labels(100.0, &[candle(102.0, 99.0, 101.0)]);
        assert!(labels.ret_60m.is_some());
        assert!(labels.ret_240m.is_none());
        assert!(labels.mfe_240m.is_none());
    }

    #[test]
    fn four_hour_labels_use_the_full_window() {
        let forward = vec![
            candle(103.0, 98.0, 101.0),
            candle(106.0, 100.0, 105.0),
            candle(107.0, 95.0, 96.0),
            candle(99.0, 94.0, 98.0),
        ];
        let labels = compute_labels(100.0, &forward);
        assert!((labels.ret_60m.unwrap() - 0.01).abs() < 1e-9);
        assert!((labels.ret_240m.unwrap() - -0.02).abs() < 1e-9);
        // best excursion: high 107 → +7%; worst: low 94 → 6% adverse
        assert!((labels.mfe_240m.unwrap() - 0.07).abs() < 1e-9);
        assert!((labels.mae_240m.unwrap() - 0.06).abs() < 1e-9);
        assert!((labels.dd_240m.unwrap() - -0.06).abs() < 1e-9);
    }

    #[test]
    fn bad_entry_price_yields_no_labels() {
        let labels = compute_labels(0.0, &[candle(1.0, 1.0, 1.0); 4]);
        assert!(labels.ret_60m.is_none() && labels.ret_240m.is_none());
    }
}
