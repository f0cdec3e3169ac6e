//! Pure timing rules of the model lifecycle state machine.
//!
//! The DB work around these (load row, write status, alert) lives in the
//! `routes::models` handlers; everything that can be decided from plain
//! values is decided here.

use chrono::{DateTime, Duration, Utc};

pub const REDEPLOY_COOLDOWN_HOURS: i64 = 24;
pub const PAPER_SOAK_HOURS: i64 = 24;

/// Hours left on the redeploy cooldown, or `None` when deployment is
/// allowed. A model never deployed before has no cooldown.
pub fn redeploy_cooldown_remaining_h(
    deployed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<f64> {
    let deployed = deployed_at?;
    let elapsed = now - deployed;
    if elapsed >= Duration::hours(REDEPLOY_COOLDOWN_HOURS) {
        return None;
    }
    let remaining = Duration::hours(REDEPLOY_COOLDOWN_HOURS) - elapsed;
    Some(remaining.num_seconds() as f64 / 3600.0)
}

/// Whether the PAPER soak window has elapsed; `Err(remaining_h)` otherwise.
pub fn paper_soak_elapsed(
    deployed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), f64> {
    let Some(deployed) = deployed_at else {
        return Err(PAPER_SOAK_HOURS as f64);
    };
    let elapsed_h = (now - deployed).num_seconds() as f64 / 3600.0;
    if elapsed_h >= PAPER_SOAK_HOURS as f64 {
        Ok(())
    } else {
        Err(PAPER_SOAK_HOURS as f64 - elapsed_h)
    }
}
