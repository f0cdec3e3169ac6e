//! PASS / HOLD / REJECT gate over evaluation metrics.

use crate::metrics::EvalMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Hold,
    Reject,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Pass => "PASS",
            GateDecision::Hold => "HOLD",
            GateDecision::Reject => "REJECT",
        }
    }
}

/// Evaluate metrics against the gate.
///
/// Hard REJECTs first (E < −5%, Sharpe < −1, Q01 < −10%, thin sample),
/// then the PASS conjunction (E > 1% ∧ Sharpe > 0.5 ∧ Q05 > −3%);
/// anything in between HOLDs for more data.
pub fn evaluate_model(metrics: Option<&EvalMetrics>) -> (GateDecision, String) {
    let Some(m) = metrics else {
        return (GateDecision::Reject, "평가 지표 없음".to_string());
    };

    if m.e < -0.05 {
        return (GateDecision::Reject, format!("평균 수익률 {:.2}% < -5%", m.e * 100.0));
    }
    if m.sharpe < -1.0 {
        return (GateDecision::Reject, format!("Sharpe ratio {:.2} < -1.0", m.sharpe));
    }
    if m.q01 < -0.10 {
        return (GateDecision::Reject, format!("Q01 {:.2}% < -10%", m.q01 * 100.0));
    }
    if m.sample_count < 100 {
        return (GateDecision::Reject, format!("샘플 수 {} < 100", m.sample_count));
    }

    if m.e > 0.01 && m.sharpe > 0.5 && m.q05 > -0.03 {
        return (GateDecision::Pass, "모든 PASS 조건 충족".to_string());
    }

    (GateDecision::Hold, "추가 검증 필요".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(e: f64, sharpe: f64, q05: f64, q01: f64, n: usize) -> EvalMetrics {
        EvalMetrics {
            e,
            sharpe,
            q05,
            q01,
            mae_mean: 0.0,
            mae_95: 0.0,
            spd: 24.0,
            sample_count: n,
        }
    }

    #[test]
    fn missing_metrics_reject() {
        let (d, reason) = evaluate_model(None);
        assert_eq!(d, GateDecision::Reject);
        assert!(reason.contains("평가 지표"));
    }

    #[test]
    fn deeply_negative_mean_rejects_with_minus_5_pct() {
        let m = metrics(-0.063, 0.0, 0.0, 0.0, 200);
        let (d, reason) = evaluate_model(Some(&m));
        assert_eq!(d, GateDecision::Reject);
        assert!(reason.contains("-5%"), "reason was: {reason}");
    }

    #[test]
    fn bad_tail_rejects_on_q01() {
        let m = metrics(0.0, 0.0, -0.01, -0.12, 200);
        let (d, reason) = evaluate_model(Some(&m));
        assert_eq!(d, GateDecision::Reject);
        assert!(reason.contains("Q01"));
    }

    #[test]
    fn thin_sample_rejects() {
        let m = metrics(0.02, 1.0, 0.0, 0.0, 99);
        let (d, reason) = evaluate_model(Some(&m));
        assert_eq!(d, GateDecision::Reject);
        assert!(reason.contains("샘플"));
    }

    #[test]
    fn strong_metrics_pass() {
        let m = metrics(0.02, 0.8, -0.01, -0.05, 500);
        let (d, _) = evaluate_model(Some(&m));
        assert_eq!(d, GateDecision::Pass);
    }

    #[test]
    fn middling_metrics_hold() {
        let m = metrics(0.005, 0.3, -0.01, -0.05, 500);
        let (d, reason) = evaluate_model(Some(&m));
        assert_eq!(d, GateDecision::Hold);
        assert!(reason.contains("추가 검증"));
    }
}
