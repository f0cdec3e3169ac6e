//! Regime-gate scenario: with the current regime at CHOP, no candidate can
//! clear the pre-trade checklist and entry weighting collapses to zero, so
//! a worker cycle cannot emit an ENTRY signal.

use ats_schemas::Regime;
use ats_strategy::{ChecklistInput, PreTradeChecker};
use ats_weights::{default_base_weight, regime_weight};

fn strong_candidate(regime: Regime) -> ChecklistInput<'static> {
    ChecklistInput {
        base_score: 95.0, // far above any entry threshold
        regime,
        expected_order_krw: 1_000_000.0,
        avg_depth5_krw: 50_000_000.0,
        remaining_budget_krw: 10_000_000.0,
        per_trade_risk_krw: 100_000.0,
        held_symbols: &[],
        symbol: "KRW-BTC",
        api_healthy: true,
    }
}

#[test]
fn chop_fails_the_checklist_with_a_regime_reason() {
    let checker = PreTradeChecker::new(60.0);
    let (passed, reasons) = checker.check_all(&strong_candidate(Regime::Chop));
    assert!(!passed);
    assert!(
        reasons.iter().any(|r| r.contains("레짐 차단") && r.contains("CHOP")),
        "reasons: {reasons:?}"
    );
}

#[test]
fn panic_fails_the_checklist_with_a_regime_reason() {
    let checker = PreTradeChecker::new(60.0);
    let (passed, reasons) = checker.check_all(&strong_candidate(Regime::Panic));
    assert!(!passed);
    assert!(
        reasons.iter().any(|r| r.contains("레짐 차단") && r.contains("PANIC")),
        "reasons: {reasons:?}"
    );
}

#[test]
fn the_same_candidate_passes_in_a_healthy_regime() {
    let checker = PreTradeChecker::new(60.0);
    for regime in [Regime::Trend, Regime::Range, Regime::BreakoutRotation] {
        let (passed, reasons) = checker.check_all(&strong_candidate(regime));
        assert!(passed, "regime {regime}: {reasons:?}");
    }
}

#[test]
fn blocked_regimes_zero_the_ranking_weight_too() {
    for regime in [Regime::Chop, Regime::Panic] {
        let w = regime_weight(regime, 0.9, default_base_weight(Regime::Trend));
        assert_eq!(w, 0.0, "{regime} must hard-zero the weight");
    }
    assert!(regime_weight(Regime::Trend, 0.9, default_base_weight(Regime::Trend)) > 1.0);
}
