//! Runtime Guard decision rules.
//!
//! This crate is pure: it owns the counters of one trader's
//! `TraderSafetyState` row and decides when they trip, but performs no I/O.
//! The Control Store loads a row, applies one operation inside the same
//! transaction that persists the result, and forwards any returned trip
//! reason to the alerting path.
//!
//! Block semantics: once `blocked` is set, ENTRY is suppressed until an
//! explicit reset; EXIT is always allowed. "Soft" entry blocks (elevated
//! API/DB error counts) suppress entries without setting `blocked`.

/// Trip thresholds. Deployment-tunable limits come from the environment;
/// the structural ones (slippage ×3, API 5/3, DB 3/2) are fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct GuardLimits {
    /// Daily loss trips at `seed_krw · daily_loss_limit_pct`.
    pub daily_loss_limit_pct: f64,
    pub consecutive_loss_limit: i64,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self { daily_loss_limit_pct: 0.05, consecutive_loss_limit: 5 }
    }
}

const SLIPPAGE_ANOMALY_PCT: f64 = 0.5;
const SLIPPAGE_TRIP_COUNT: i64 = 3;
const API_ERROR_BLOCK: i64 = 5;
const API_ERROR_ENTRY_BLOCK: i64 = 3;
const DB_ERROR_BLOCK: i64 = 3;
const DB_ERROR_ENTRY_BLOCK: i64 = 2;

/// In-memory image of one trader's safety counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafetyCounters {
    pub daily_loss_krw: f64,
    pub consecutive_losses: i64,
    pub slippage_anomaly_count: i64,
    pub api_error_count: i64,
    pub db_error_count: i64,
    pub blocked: bool,
    pub block_reason: Option<String>,
}

/// What a slippage report produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SlippageOutcome {
    pub anomaly: bool,
    pub slippage_pct: f64,
    pub tripped: Option<String>,
}

impl SafetyCounters {
    fn trip(&mut self, reason: String) -> Option<String> {
        self.blocked = true;
        self.block_reason = Some(reason.clone());
        Some(reason)
    }

    /// Record a realized loss. `consecutive` marks this loss as extending the
    /// losing streak; a profitable close reports `loss_krw = 0.0,
    /// consecutive = false` and resets the streak.
    ///
    /// Returns the trip reason when this update crosses a limit.
    pub fn record_loss(
        &mut self,
        loss_krw: f64,
        consecutive: bool,
        seed_krw: f64,
        limits: &GuardLimits,
    ) -> Option<String> {
        self.daily_loss_krw += loss_krw.max(0.0);
        if consecutive {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }

        let limit_krw = seed_krw * limits.daily_loss_limit_pct;
        if limit_krw > 0.0 && self.daily_loss_krw >= limit_krw {
            return self.trip(format!("일일 손실 한도 초과 ({:.0} KRW)", self.daily_loss_krw));
        }
        if self.consecutive_losses >= limits.consecutive_loss_limit {
            return self.trip(format!("연속 손실 {}회", self.consecutive_losses));
        }
        None
    }

    /// Compare the expected and actual fill price. Deviations above 0.5%
    /// count as anomalies; the third anomaly trips the block.
    pub fn record_slippage(&mut self, expected_price: f64, actual_price: f64) -> SlippageOutcome {
        if expected_price <= 0.0 {
            return SlippageOutcome { anomaly: false, slippage_pct: 0.0, tripped: None };
        }
        let slippage_pct = ((actual_price - expected_price) / expected_price).abs() * 100.0;
        if slippage_pct <= SLIPPAGE_ANOMALY_PCT {
            return SlippageOutcome { anomaly: false, slippage_pct, tripped: None };
        }

        self.slippage_anomaly_count += 1;
        let tripped = if self.slippage_anomaly_count >= SLIPPAGE_TRIP_COUNT {
            self.trip(format!(
                "Slippage 이상 감지 {}회 (최근: {:.2}%)",
                self.slippage_anomaly_count, slippage_pct
            ))
        } else {
            None
        };
        SlippageOutcome { anomaly: true, slippage_pct, tripped }
    }

    pub fn record_api_error(&mut self) -> Option<String> {
        self.api_error_count += 1;
        if self.api_error_count >= API_ERROR_BLOCK {
            return self.trip(format!("API 에러 {}회 연속 발생", self.api_error_count));
        }
        None
    }

    pub fn record_db_error(&mut self) -> Option<String> {
        self.db_error_count += 1;
        if self.db_error_count >= DB_ERROR_BLOCK {
            return self.trip(format!("DB 에러 {}회 연속 발생", self.db_error_count));
        }
        None
    }

    /// PANIC regime observed: block once per episode. Returns the reason only
    /// on the transition into the blocked state.
    pub fn record_panic(&mut self) -> Option<String> {
        if self.blocked {
            return None;
        }
        self.trip("PANIC 레짐 자동 차단".to_string())
    }

    /// Whether a new ENTRY is currently suppressed, and why.
    ///
    /// A hard block wins; below that, elevated API/DB error counts soft-block
    /// entries while exits continue.
    pub fn entry_block_reason(&self) -> Option<String> {
        if self.blocked {
            return Some(
                self.block_reason.clone().unwrap_or_else(|| "차단됨".to_string()),
            );
        }
        if self.api_error_count >= API_ERROR_ENTRY_BLOCK {
            return Some(format!("API 장애 감지 ({}회)", self.api_error_count));
        }
        if self.db_error_count >= DB_ERROR_ENTRY_BLOCK {
            return Some(format!("DB 장애 감지 ({}회)", self.db_error_count));
        }
        None
    }

    /// Explicit operator reset: zero every counter and clear the block.
    pub fn reset(&mut self) {
        *self = SafetyCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_loss_limit_trips_block() {
        let mut c = SafetyCounters::default();
        let limits = GuardLimits::default();
        // seed 1,000,000 · 5% = 50,000 KRW limit
        assert!(c.record_loss(30_000.0, true, 1_000_000.0, &limits).is_none());
        let reason = c.record_loss(25_000.0, true, 1_000_000.0, &limits).unwrap();
        assert!(reason.contains("일일 손실 한도"));
        assert!(c.blocked);
    }

    #[test]
    fn consecutive_losses_trip_at_limit() {
        let mut c = SafetyCounters::default();
        let limits = GuardLimits { daily_loss_limit_pct: 0.05, consecutive_loss_limit: 3 };
        assert!(c.record_loss(1.0, true, 1_000_000.0, &limits).is_none());
        assert!(c.record_loss(1.0, true, 1_000_000.0, &limits).is_none());
        let reason = c.record_loss(1.0, true, 1_000_000.0, &limits).unwrap();
        assert!(reason.contains("연속 손실 3회"));
    }

    #[test]
    fn profitable_close_resets_the_streak() {
        let mut c = SafetyCounters::default();
        let limits = GuardLimits { daily_loss_limit_pct: 0.05, consecutive_loss_limit: 3 };
        c.record_loss(1.0, true, 1_000_000.0, &limits);
        c.record_loss(1.0, true, 1_000_000.0, &limits);
        c.record_loss(0.0, false, 1_000_000.0, &limits);
        assert_eq!(c.consecutive_losses, 0);
        assert!(!c.blocked);
    }

    #[test]
    fn slippage_anomaly_trips_after_three() {
        let mut c = SafetyCounters::default();
        // 0.6% deviation: 1,000,000 expected vs 1,006,000 actual
        let o1 = c.record_slippage(1_000_000.0, 1_006_000.0);
        assert!(o1.anomaly && o1.tripped.is_none());
        let o2 = c.record_slippage(1_000_000.0, 1_006_000.0);
        assert!(o2.anomaly && o2.tripped.is_none());
        let o3 = c.record_slippage(1_000_000.0, 1_006_000.0);
        let reason = o3.tripped.unwrap();
        assert!(reason.contains("Slippage"));
        assert!(c.blocked);
    }

    #[test]
    fn small_slippage_is_not_an_anomaly() {
        let mut c = SafetyCounters::default();
        let o = c.record_slippage(1_000_000.0, 1_003_000.0); // 0.3%
        assert!(!o.anomaly);
        assert_eq!(c.slippage_anomaly_count, 0);
    }

    #[test]
    fn api_errors_soft_block_then_hard_block() {
        let mut c = SafetyCounters::default();
        c.record_api_error();
        c.record_api_error();
        assert!(c.entry_block_reason().is_none());
        c.record_api_error();
        assert!(c.entry_block_reason().unwrap().contains("API 장애"));
        assert!(!c.blocked);
        c.record_api_error();
        assert!(c.record_api_error().unwrap().contains("API 에러 5회"));
        assert!(c.blocked);
    }

    #[test]
    fn db_errors_soft_block_at_two_hard_block_at_three() {
        let mut c = SafetyCounters::default();
        c.record_db_error();
        assert!(c.entry_block_reason().is_none());
        c.record_db_error();
        assert!(c.entry_block_reason().unwrap().contains("DB 장애"));
        let reason = c.record_db_error().unwrap();
        assert!(reason.contains("DB 에러 3회"));
    }

    #[test]
    fn panic_blocks_once_per_episode() {
        let mut c = SafetyCounters::default();
        assert!(c.record_panic().is_some());
        assert!(c.record_panic().is_none());
        assert!(c.blocked);
    }

    #[test]
    fn reset_clears_everything() {
        let mut c = SafetyCounters::default();
        c.record_api_error();
        c.record_panic();
        c.reset();
        assert_eq!(c, SafetyCounters::default());
        assert!(c.entry_block_reason().is_none());
    }
}
