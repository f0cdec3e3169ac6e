//! Runtime-Guard scenario: three successive 0.6% slippage reports must trip
//! the block; a blocked trader emits no further entries until reset.

use ats_guard::{GuardLimits, SafetyCounters};

#[test]
fn three_point_six_permille_reports_trip_the_block() {
    let mut counters = SafetyCounters::default();

    // expected 1,000,000 vs actual 1,006,000 = 0.6% deviation
    for round in 1..=2 {
        let outcome = counters.record_slippage(1_000_000.0, 1_006_000.0);
        assert!(outcome.anomaly, "round {round} must count as anomaly");
        assert!(outcome.tripped.is_none(), "round {round} must not trip yet");
        assert!(!counters.blocked);
    }

    let third = counters.record_slippage(1_000_000.0, 1_006_000.0);
    let reason = third.tripped.expect("third anomaly must trip");
    assert!(reason.contains("Slippage"), "reason was: {reason}");
    assert!(counters.blocked);
    assert_eq!(counters.slippage_anomaly_count, 3);

    // block semantics: ENTRY suppressed until an explicit reset
    assert!(counters.entry_block_reason().is_some());
    counters.reset();
    assert!(counters.entry_block_reason().is_none());
    assert_eq!(counters.slippage_anomaly_count, 0);
}

#[test]
fn benign_slippage_never_accumulates() {
    let mut counters = SafetyCounters::default();
    for _ in 0..10 {
        let outcome = counters.record_slippage(1_000_000.0, 1_004_000.0); // 0.4%
        assert!(!outcome.anomaly);
    }
    assert_eq!(counters.slippage_anomaly_count, 0);
    assert!(!counters.blocked);
}

#[test]
fn block_reason_survives_mixed_counters() {
    let mut counters = SafetyCounters::default();
    counters.record_api_error();
    counters.record_slippage(1_000_000.0, 1_006_000.0);
    counters.record_slippage(1_000_000.0, 1_006_000.0);
    let tripped = counters.record_slippage(1_000_000.0, 1_007_000.0).tripped.unwrap();
    assert!(tripped.contains("0.70%"), "latest deviation quoted: {tripped}");
    assert_eq!(counters.block_reason.as_deref(), Some(tripped.as_str()));
}

#[test]
fn daily_loss_and_streak_limits_still_apply() {
    let limits = GuardLimits { daily_loss_limit_pct: 0.05, consecutive_loss_limit: 5 };
    let mut counters = SafetyCounters::default();
    for _ in 0..4 {
        assert!(counters.record_loss(100.0, true, 10_000_000.0, &limits).is_none());
    }
    let reason = counters.record_loss(100.0, true, 10_000_000.0, &limits).unwrap();
    assert!(reason.contains("연속 손실 5회"));
}
