//! Evaluation metrics derived from labeled feature snapshots.

use ats_indicators::{mean, percentile, std};
use serde::{Deserialize, Serialize};

/// Forward-return labels of one feature snapshot. Fields stay `None` until
/// the labeling pass has seen enough elapsed time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LabeledSnapshot {
    pub ret_60m: Option<f64>,
    pub ret_240m: Option<f64>,
    pub mfe_240m: Option<f64>,
    pub mae_240m: Option<f64>,
    pub dd_240m: Option<f64>,
}

/// Round-trip execution cost subtracted from every raw return:
/// `r_net = r − (2·fee + 2·slippage)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoundTripCost {
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

impl Default for RoundTripCost {
    fn default() -> Self {
        Self { fee_rate: 0.0005, slippage_rate: 0.001 }
    }
}

impl RoundTripCost {
    pub fn total(&self) -> f64 {
        2.0 * self.fee_rate + 2.0 * self.slippage_rate
    }
}

/// The gate's input metrics. `sample_count` counts labeled 240m returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "Sharpe")]
    pub sharpe: f64,
    #[serde(rename = "Q05")]
    pub q05: f64,
    #[serde(rename = "Q01")]
    pub q01: f64,
    #[serde(rename = "MAE_mean")]
    pub mae_mean: f64,
    #[serde(rename = "MAE_95")]
    pub mae_95: f64,
    #[serde(rename = "SPD")]
    pub spd: f64,
    pub sample_count: usize,
}

/// Compute gate metrics over the 240-minute labels, net of round-trip cost.
/// Returns `None` when no snapshot carries a 240m return label yet.
pub fn compute_metrics(snapshots: &[LabeledSnapshot], cost: RoundTripCost) -> Option<EvalMetrics> {
    let returns: Vec<f64> = snapshots
        .iter()
        .filter_map(|s| s.ret_240m)
        .map(|r| r - cost.total())
        .collect();
    if returns.is_empty() {
        return None;
    }

    let maes: Vec<f64> = snapshots.iter().filter_map(|s| s.mae_240m).collect();

    let e = mean(&returns);
    let sd = std(&returns);
    let sharpe = if sd > 0.0 { e / sd } else { 0.0 };

    // Signals per day, approximating one snapshot per hour.
    let n = snapshots.len() as f64;
    let days = (n / 24.0).max(1.0);

    Some(EvalMetrics {
        e,
        sharpe,
        q05: percentile(&returns, 5.0),
        q01: percentile(&returns, 1.0),
        mae_mean: mean(&maes),
        mae_95: if maes.is_empty() { 0.0 } else { percentile(&maes, 95.0) },
        spd: n / days,
        sample_count: returns.len(),
    })
}
