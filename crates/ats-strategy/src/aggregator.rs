//! Weighted-sum aggregation and per-symbol EMA smoothing.
//!
//! The aggregator is stateful and owned by one worker's engine: the
//! per-symbol score history must never be shared across processes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::scoring::ScoreSet;

/// Module weights for the weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub tp: f64,
    pub vcb: f64,
    pub regime: f64,
    pub lsr: f64,
    pub lf: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { tp: 0.30, vcb: 0.25, regime: 0.20, lsr: 0.15, lf: 0.10 }
    }
}

const EMA_ALPHA: f64 = 0.3;
const HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedScore {
    /// This tick's raw weighted sum.
    pub total_score: f64,
    /// EMA-smoothed score, the `base_score` used for gating.
    pub smoothed_score: f64,
    /// Deduplicated reason codes across all modules.
    pub all_reason_codes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    weights: ScoreWeights,
    history: HashMap<String, Vec<f64>>,
}

impl ScoreAggregator {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights, history: HashMap::new() }
    }

    pub fn update_weights(&mut self, weights: ScoreWeights) {
        self.weights = weights;
    }

    /// Aggregate one symbol's module scores and smooth against its history.
    ///
    /// The first observation for a symbol passes through unchanged; later
    /// observations blend `α·new + (1−α)·previous`, with the history window
    /// capped at the last 10 observations.
    pub fn aggregate(&mut self, symbol: &str, scores: &ScoreSet) -> AggregatedScore {
        let w = &self.weights;
        let total_score = scores.tp.score * w.tp
            + scores.vcb.score * w.vcb
            + scores.regime.score * w.regime
            + scores.lsr.score * w.lsr
            + scores.lf.score * w.lf;

        let history = self.history.entry(symbol.to_string()).or_default();
        let smoothed_score = match history.last() {
            Some(&prev) => EMA_ALPHA * total_score + (1.0 - EMA_ALPHA) * prev,
            None => total_score,
        };
        history.push(total_score);
        if history.len() > HISTORY_CAP {
            let excess = history.len() - HISTORY_CAP;
            history.drain(..excess);
        }

        let mut all_reason_codes: Vec<String> = Vec::new();
        for reasons in [
            &scores.tp.reasons,
            &scores.vcb.reasons,
            &scores.lsr.reasons,
            &scores.lf.reasons,
            &scores.regime.reasons,
        ] {
            for r in reasons {
                if !all_reason_codes.contains(r) {
                    all_reason_codes.push(r.clone());
                }
            }
        }

        AggregatedScore { total_score, smoothed_score, all_reason_codes }
    }

    /// Drop all history (engine rebuild).
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ModuleScore;

    fn uniform(score: f64) -> ScoreSet {
        let m = |reason: &str| ModuleScore { score, reasons: vec![reason.to_string()] };
        ScoreSet {
            tp: m("TP_X"),
            vcb: m("VCB_X"),
            lsr: m("LSR_X"),
            lf: m("LF_X"),
            regime: m("REGIME_X"),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let w = ScoreWeights::default();
        assert!((w.tp + w.vcb + w.regime + w.lsr + w.lf - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_sample_passes_through_unchanged() {
        let mut agg = ScoreAggregator::default();
        let out = agg.aggregate("KRW-BTC", &uniform(80.0));
        assert!((out.total_score - 80.0).abs() < 1e-12);
        assert_eq!(out.smoothed_score, out.total_score);
    }

    #[test]
    fn smoothing_blends_with_previous_observation() {
        let mut agg = ScoreAggregator::default();
        agg.aggregate("KRW-BTC", &uniform(100.0));
        let out = agg.aggregate("KRW-BTC", &uniform(0.0));
        // 0.3·0 + 0.7·100
        assert!((out.smoothed_score - 70.0).abs() < 1e-12);
    }

    #[test]
    fn identical_sequences_smooth_identically() {
        let mut a = ScoreAggregator::default();
        let mut b = ScoreAggregator::default();
        let inputs = [55.0, 70.0, 62.0, 90.0, 10.0];
        let run = |agg: &mut ScoreAggregator| {
            inputs.iter().map(|&s| agg.aggregate("KRW-ETH", &uniform(s)).smoothed_score).collect::<Vec<_>>()
        };
        assert_eq!(run(&mut a), run(&mut b));
    }

    #[test]
    fn symbols_smooth_independently() {
        let mut agg = ScoreAggregator::default();
        agg.aggregate("KRW-BTC", &uniform(100.0));
        let fresh = agg.aggregate("KRW-ETH", &uniform(40.0));
        assert_eq!(fresh.smoothed_score, fresh.total_score);
    }

    #[test]
    fn history_is_capped_at_ten() {
        let mut agg = ScoreAggregator::default();
        for i in 0..25 {
            agg.aggregate("KRW-BTC", &uniform(i as f64));
        }
        assert_eq!(agg.history["KRW-BTC"].len(), 10);
    }

    #[test]
    fn reason_codes_are_deduplicated() {
        let mut agg = ScoreAggregator::default();
        let mut set = uniform(50.0);
        set.vcb.reasons = vec!["TP_X".to_string()]; // duplicate of tp's code
        let out = agg.aggregate("KRW-BTC", &set);
        assert_eq!(out.all_reason_codes.iter().filter(|r| *r == "TP_X").count(), 1);
    }
}
