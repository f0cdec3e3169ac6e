//! Evaluation-gate scenario: a batch of deeply negative forward returns
//! must REJECT with the −5% reason, and the PASS band must still work on
//! the same pipeline.

use ats_eval::{compute_metrics, evaluate_model, GateDecision, LabeledSnapshot, RoundTripCost};

fn snapshots(ret_240m: f64, n: usize) -> Vec<LabeledSnapshot> {
    (0..n)
        .map(|i| LabeledSnapshot {
            ret_60m: Some(ret_240m / 2.0),
            // small spread so Sharpe is defined
            ret_240m: Some(ret_240m + (i % 5) as f64 * 0.001),
            mfe_240m: Some(0.01),
            mae_240m: Some(0.02),
            dd_240m: Some(-0.02),
        })
        .collect()
}

#[test]
fn two_hundred_snapshots_at_minus_six_percent_reject() {
    let snaps = snapshots(-0.06, 200);
    let metrics = compute_metrics(&snaps, RoundTripCost::default());
    let (decision, reason) = evaluate_model(metrics.as_ref());

    assert_eq!(decision, GateDecision::Reject);
    assert!(reason.contains("-5%"), "reason was: {reason}");
    assert!(reason.contains("평균 수익률"), "reason was: {reason}");
}

#[test]
fn strong_positive_batch_passes() {
    let snaps = snapshots(0.03, 200);
    let metrics = compute_metrics(&snaps, RoundTripCost::default());
    let (decision, _) = evaluate_model(metrics.as_ref());
    assert_eq!(decision, GateDecision::Pass);
}

#[test]
fn thin_batch_rejects_on_sample_count() {
    let snaps = snapshots(0.03, 50);
    let metrics = compute_metrics(&snaps, RoundTripCost::default());
    let (decision, reason) = evaluate_model(metrics.as_ref());
    assert_eq!(decision, GateDecision::Reject);
    assert!(reason.contains("샘플"), "reason was: {reason}");
}

#[test]
fn metrics_are_net_of_round_trip_cost() {
    let snaps = snapshots(0.0, 200);
    let m = compute_metrics(&snaps, RoundTripCost::default()).unwrap();
    // gross zero minus 2·fee + 2·slippage = −0.3% (plus the small spread)
    assert!(m.e < 0.0);
    assert!(m.e > -0.01);
}
