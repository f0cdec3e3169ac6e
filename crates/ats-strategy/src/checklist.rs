//! Pre-trade checklist: every rule must pass before a BUY is sized.
//!
//! Gating runs on `base_score` (intrinsic quality); the weighted
//! `final_score` only ranks candidates. Failures return the ordered list of
//! reasons so the signal row can carry all of them.

use ats_schemas::Regime;

const LIQUIDITY_MAX_RATIO: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct PreTradeChecker {
    pub entry_threshold: f64,
    pub liquidity_max_ratio: f64,
}

/// Inputs the engine gathers per candidate before the check.
#[derive(Debug, Clone)]
pub struct ChecklistInput<'a> {
    pub base_score: f64,
    pub regime: Regime,
    pub expected_order_krw: f64,
    pub avg_depth5_krw: f64,
    pub remaining_budget_krw: f64,
    pub per_trade_risk_krw: f64,
    /// Symbols currently held; the engine bypasses the duplicate rule on its
    /// explicit add-buy path by passing an empty slice.
    pub held_symbols: &'a [String],
    pub symbol: &'a str,
    pub api_healthy: bool,
}

impl PreTradeChecker {
    pub fn new(entry_threshold: f64) -> Self {
        Self { entry_threshold, liquidity_max_ratio: LIQUIDITY_MAX_RATIO }
    }

    /// Run all rules. Returns `(passed, failed_reasons)` with reasons in
    /// checklist order.
    pub fn check_all(&self, input: &ChecklistInput<'_>) -> (bool, Vec<String>) {
        let mut failed = Vec::new();

        if input.base_score < self.entry_threshold {
            failed.push(format!(
                "점수 부족 ({:.1} < {})",
                input.base_score, self.entry_threshold
            ));
        }

        if input.regime.blocks_entries() {
            failed.push(format!("레짐 차단 ({})", input.regime));
        }

        if input.avg_depth5_krw > 0.0 {
            let ratio = input.expected_order_krw / input.avg_depth5_krw;
            if ratio > self.liquidity_max_ratio {
                failed.push(format!(
                    "유동성 부족 (ratio: {:.2} > {})",
                    ratio, self.liquidity_max_ratio
                ));
            }
        } else {
            failed.push("유동성 데이터 없음".to_string());
        }

        if input.remaining_budget_krw < input.per_trade_risk_krw {
            failed.push(format!(
                "예산 부족 ({:.0} < {:.0})",
                input.remaining_budget_krw, input.per_trade_risk_krw
            ));
        }

        if input.held_symbols.iter().any(|s| s == input.symbol) {
            failed.push("동일 심볼 중복 포지션".to_string());
        }

        if !input.api_healthy {
            failed.push("API 상태 불량".to_string());
        }

        (failed.is_empty(), failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_input<'a>(held: &'a [String]) -> ChecklistInput<'a> {
        ChecklistInput {
            base_score: 75.0,
            regime: Regime::Trend,
            expected_order_krw: 1_000_000.0,
            avg_depth5_krw: 10_000_000.0,
            remaining_budget_krw: 5_000_000.0,
            per_trade_risk_krw: 100_000.0,
            held_symbols: held,
            symbol: "KRW-ETH",
            api_healthy: true,
        }
    }

    #[test]
    fn clean_input_passes() {
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&passing_input(&[]));
        assert!(ok, "unexpected failures: {reasons:?}");
    }

    #[test]
    fn low_score_fails_first() {
        let mut input = passing_input(&[]);
        input.base_score = 40.0;
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&input);
        assert!(!ok);
        assert!(reasons[0].contains("점수 부족"));
    }

    #[test]
    fn chop_and_panic_regimes_fail_with_regime_reason() {
        for regime in [Regime::Chop, Regime::Panic] {
            let mut input = passing_input(&[]);
            input.regime = regime;
            let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&input);
            assert!(!ok);
            assert!(
                reasons.iter().any(|r| r.contains("레짐 차단") && r.contains(regime.as_str())),
                "missing regime reason for {regime}: {reasons:?}"
            );
        }
    }

    #[test]
    fn zero_depth_is_a_hard_fail() {
        let mut input = passing_input(&[]);
        input.avg_depth5_krw = 0.0;
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&input);
        assert!(!ok);
        assert!(reasons.iter().any(|r| r.contains("유동성 데이터 없음")));
    }

    #[test]
    fn oversized_order_fails_liquidity_ratio() {
        let mut input = passing_input(&[]);
        input.expected_order_krw = 4_000_000.0; // 40% of depth
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&input);
        assert!(!ok);
        assert!(reasons.iter().any(|r| r.contains("유동성 부족")));
    }

    #[test]
    fn duplicate_symbol_fails() {
        let held = vec!["KRW-ETH".to_string()];
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&passing_input(&held));
        assert!(!ok);
        assert!(reasons.iter().any(|r| r.contains("동일 심볼")));
    }

    #[test]
    fn unhealthy_api_fails() {
        let mut input = passing_input(&[]);
        input.api_healthy = false;
        let (ok, reasons) = PreTradeChecker::new(60.0).check_all(&input);
        assert!(!ok);
        assert!(reasons.iter().any(|r| r.contains("API 상태 불량")));
    }

    #[test]
    fn multiple_failures_keep_checklist_order() {
        let mut input = passing_input(&[]);
        input.base_score = 10.0;
        input.regime = Regime::Panic;
        input.api_healthy = false;
        let (_, reasons) = PreTradeChecker::new(60.0).check_all(&input);
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].contains("점수"));
        assert!(reasons[1].contains("레짐"));
        assert!(reasons[2].contains("API"));
    }
}
