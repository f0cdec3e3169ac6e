//! Sliding-window rate limiting per endpoint group.
//!
//! Each group (`ticker`, `orderbook`, `market`) owns one limiter permitting
//! `rate_per_sec` events in any trailing 1-second window. `acquire` blocks
//! (async sleep) until a slot frees up. Limiters are per-process: a fleet of
//! N workers drives N × rate at the venue, so `UPBIT_GROUP_RPS` must be set
//! with the fleet size in mind.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    rate_per_sec: usize,
    events: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec: rate_per_sec.max(1.0) as usize,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until a slot is free in the trailing 1-second window, then
    /// consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut events = self.events.lock().await;
                let now = Instant::now();
                while let Some(front) = events.front() {
                    if now.duration_since(*front) >= Duration::from_secs(1) {
                        events.pop_front();
                    } else {
                        break;
                    }
                }
                if events.len() < self.rate_per_sec {
                    events.push_back(now);
                    return;
                }
                // oldest event ages out of the window first
                Duration::from_secs(1).saturating_sub(now.duration_since(events[0]))
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// The vendor's `Remaining-Req` header reported `sec` requests left in
    /// this second; nap briefly when the budget is nearly gone.
    pub async fn respect_remaining(&self, sec_left: i64) {
        if sec_left <= 0 {
            tokio::time::sleep(Duration::from_millis(350)).await;
        } else if sec_left <= 1 {
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }
}

/// Parse the `sec=` component of a `Remaining-Req` header such as
/// `"group=ticker; min=599; sec=9"`.
pub fn parse_remaining_sec(header: &str) -> Option<i64> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("sec="))
        .and_then(|v| v.trim().parse().ok())
}
