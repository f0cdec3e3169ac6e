//! Pure admission rules for trader state transitions.
//!
//! Invariant: `run_mode = LIVE` requires an armed trader whose PAPER
//! protection window has fully elapsed. These checks are pure over the
//! trader row so they are unit-testable without a database.

use ats_db::traders::TraderRow;
use chrono::{DateTime, Utc};

/// Why an `arm` request must be refused, if at all.
pub fn arm_denial(trader: &TraderRow, protect_hours: i64, now: DateTime<Utc>) -> Option<String> {
    let remaining = trader.paper_protect_remaining_sec(protect_hours, now);
    if remaining > 0 {
        return Some(protect_message(remaining));
    }
    None
}

/// Why a `run {run_mode: LIVE}` request must be refused, if at all.
pub fn live_run_denial(trader: &TraderRow, protect_hours: i64, now: DateTime<Utc>) -> Option<String> {
    let remaining = trader.paper_protect_remaining_sec(protect_hours, now);
    if remaining > 0 {
        return Some(protect_message(remaining));
    }
    if trader.armed_at.is_none() {
        return Some("ARM 필요: 보호기간 경과 후 /arm 호출".to_string());
    }
    None
}

fn protect_message(remaining_sec: i64) -> String {
    let hours = remaining_sec / 3600;
    let minutes = (remaining_sec % 3600) / 60;
    format!("PAPER 보호기간 {hours}시간 {minutes}분 남음")
}
