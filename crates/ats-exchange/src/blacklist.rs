//! Time-boxed symbol blacklist.
//!
//! A symbol lands here after repeated live order failures; while the
//! cooldown runs, `execute_order` fails fast instead of burning retries
//! against a market that keeps rejecting us.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub struct SymbolBlacklist {
    cooldown: Duration,
    entries: HashMap<String, Instant>,
}

impl SymbolBlacklist {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, entries: HashMap::new() }
    }

    pub fn insert(&mut self, symbol: &str) {
        self.entries.insert(symbol.to_string(), Instant::now());
    }

    /// Seconds left on the cooldown, or `None` when the symbol is clear.
    pub fn remaining(&mut self, symbol: &str) -> Option<u64> {
        let added = *self.entries.get(symbol)?;
        let elapsed = Instant::now().duration_since(added);
        if elapsed >= self.cooldown {
            self.entries.remove(symbol);
            return None;
        }
        Some((self.cooldown - elapsed).as_secs())
    }

    pub fn is_blocked(&mut self, symbol: &str) -> bool {
        self.remaining(symbol).is_some()
    }
}

impl Default for SymbolBlacklist {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn blocked_until_cooldown_elapses() {
        let mut bl = SymbolBlacklist::default();
        bl.insert("KRW-DOGE");
        assert!(bl.is_blocked("KRW-DOGE"));
        assert!(bl.remaining("KRW-DOGE").unwrap() > 590);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(bl.is_blocked("KRW-DOGE"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!bl.is_blocked("KRW-DOGE"));
        // entry is purged once expired
        assert!(bl.remaining("KRW-DOGE").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unlisted_symbols_are_clear() {
        let mut bl = SymbolBlacklist::default();
        assert!(!bl.is_blocked("KRW-BTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn reinsert_restarts_the_clock() {
        let mut bl = SymbolBlacklist::new(Duration::from_secs(100));
        bl.insert("KRW-SOL");
        tokio::time::advance(Duration::from_secs(90)).await;
        bl.insert("KRW-SOL");
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(bl.is_blocked("KRW-SOL"));
    }
}
