//! Drift detection against a pinned baseline, and auto-rollback conditions.

/// Outcome of comparing current metrics to the baseline window.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftCheck {
    pub drifted: bool,
    pub warnings: Vec<String>,
}

/// Compare current Sharpe / mean-return to the baseline.
///
/// Drift: current Sharpe < 0.7·baseline Sharpe, or current mean return
/// < 0.5·baseline mean return (only meaningful against positive baselines).
pub fn check_drift(
    baseline_sharpe: f64,
    baseline_mean_return: f64,
    current_sharpe: f64,
    current_mean_return: f64,
) -> DriftCheck {
    let mut warnings = Vec::new();

    if baseline_sharpe > 0.0 && current_sharpe < baseline_sharpe * 0.7 {
        warnings.push(format!(
            "Sharpe ratio 하락 ({:.2} → {:.2})",
            baseline_sharpe, current_sharpe
        ));
    }
    if baseline_mean_return > 0.0 && current_mean_return < baseline_mean_return * 0.5 {
        warnings.push(format!(
            "수익률 하락 ({:.2}% → {:.2}%)",
            baseline_mean_return * 100.0,
            current_mean_return * 100.0
        ));
    }

    DriftCheck { drifted: !warnings.is_empty(), warnings }
}

/// Everything the auto-rollback decision needs, gathered by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackInputs {
    /// Latest 24h rolling net return for the model, if recorded.
    pub net_return_24h: Option<f64>,
    /// Monotonic drift warning counter from the baseline row.
    pub drift_warn_count: i64,
    /// Worst consecutive-loss streak across same-strategy traders.
    pub max_consecutive_losses: i64,
}

/// First matching auto-rollback trigger, if any:
/// 24h net return < −2%, drift warnings ≥ 3, or a same-strategy trader at
/// ≥ 5 consecutive losses.
pub fn rollback_reason(inputs: &RollbackInputs) -> Option<String> {
    if let Some(r) = inputs.net_return_24h {
        if r < -0.02 {
            return Some(format!("24시간 수익률 {:.2}% < -2%", r * 100.0));
        }
    }
    if inputs.drift_warn_count >= 3 {
        return Some(format!("Drift 경고 {}회 연속", inputs.drift_warn_count));
    }
    if inputs.max_consecutive_losses >= 5 {
        return Some(format!("연속 손실 {}회", inputs.max_consecutive_losses));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpe_collapse_is_drift() {
        let d = check_drift(1.0, 0.02, 0.5, 0.02);
        assert!(d.drifted);
        assert!(d.warnings[0].contains("Sharpe"));
    }

    #[test]
    fn return_collapse_is_drift() {
        let d = check_drift(1.0, 0.02, 0.9, 0.005);
        assert!(d.drifted);
        assert!(d.warnings[0].contains("수익률"));
    }

    #[test]
    fn negative_baseline_never_drifts() {
        let d = check_drift(-0.5, -0.01, -2.0, -0.5);
        assert!(!d.drifted);
    }

    #[test]
    fn healthy_metrics_do_not_drift() {
        let d = check_drift(1.0, 0.02, 0.9, 0.015);
        assert!(!d.drifted);
        assert!(d.warnings.is_empty());
    }

    #[test]
    fn rollback_on_24h_return() {
        let r = rollback_reason(&RollbackInputs {
            net_return_24h: Some(-0.03),
            ..Default::default()
        })
        .unwrap();
        assert!(r.contains("24시간 수익률"));
    }

    #[test]
    fn rollback_on_drift_warnings() {
        let r = rollback_reason(&RollbackInputs { drift_warn_count: 3, ..Default::default() });
        assert!(r.unwrap().contains("Drift"));
    }

    #[test]
    fn rollback_on_consecutive_losses() {
        let r = rollback_reason(&RollbackInputs {
            max_consecutive_losses: 5,
            ..Default::default()
        });
        assert!(r.unwrap().contains("연속 손실"));
    }

    #[test]
    fn no_trigger_no_rollback() {
        assert!(rollback_reason(&RollbackInputs {
            net_return_24h: Some(0.01),
            drift_warn_count: 2,
            max_consecutive_losses: 4,
        })
        .is_none());
    }
}
