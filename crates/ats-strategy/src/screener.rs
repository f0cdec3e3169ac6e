//! Universe screening: all KRW markets → liquid, tight-spread candidates.

use std::collections::HashMap;

use ats_schemas::{Orderbook, Ticker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct ScreenerConfig {
    pub top_n: usize,
    /// Minimum 24h traded value in KRW.
    pub min_24h_volume_krw: f64,
    /// Maximum bid/ask spread as a percentage of last price.
    pub max_spread_pct: f64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self { top_n: 30, min_24h_volume_krw: 100_000_000.0, max_spread_pct: 0.5 }
    }
}

/// A market that survived screening, with the depth and volatility figures
/// later stages need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub volume_24h_krw: f64,
    pub spread_pct: f64,
    /// Average KRW notional across the top-5 bid and ask levels.
    pub avg_depth5_krw: f64,
    /// 24h high-low range as a percentage of last price.
    pub volatility_pct: f64,
    pub current_price: f64,
    pub reason_flags: Vec<String>,
}

/// Filter and rank markets. Inputs are the batched ticker and orderbook maps
/// the gateway produced; markets missing from either map are skipped.
pub fn screen_markets(
    tickers: &HashMap<String, Ticker>,
    orderbooks: &HashMap<String, Orderbook>,
    cfg: &ScreenerConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (symbol, ticker) in tickers {
        let volume_24h = ticker.acc_trade_volume_24h * ticker.trade_price;
        if volume_24h < cfg.min_24h_volume_krw {
            continue;
        }

        let Some(orderbook) = orderbooks.get(symbol) else { continue };
        let units = &orderbook.orderbook_units;
        if units.is_empty() {
            continue;
        }

        let best_bid = units[0].bid_price;
        let best_ask = units[0].ask_price;
        if best_bid <= 0.0 || best_ask <= 0.0 {
            continue;
        }

        let current_price = if ticker.trade_price > 0.0 { ticker.trade_price } else { best_bid };
        if current_price <= 0.0 {
            continue;
        }

        let spread_pct = (best_ask - best_bid) / current_price * 100.0;
        if spread_pct > cfg.max_spread_pct {
            continue;
        }

        let top5 = &units[..units.len().min(5)];
        let bid_depth: f64 = top5.iter().map(|u| u.bid_size * u.bid_price).sum();
        let ask_depth: f64 = top5.iter().map(|u| u.ask_size * u.ask_price).sum();
        let avg_depth5 = (bid_depth + ask_depth) / 2.0;

        let volatility_pct = (ticker.high_price - ticker.low_price) / current_price * 100.0;

        let mut reason_flags = Vec::new();
        if volume_24h > cfg.min_24h_volume_krw * 5.0 {
            reason_flags.push("HIGH_VOLUME".to_string());
        }
        if spread_pct < cfg.max_spread_pct * 0.5 {
            reason_flags.push("TIGHT_SPREAD".to_string());
        }
        if avg_depth5 > volume_24h * 0.01 {
            reason_flags.push("GOOD_DEPTH".to_string());
        }

        candidates.push(Candidate {
            symbol: symbol.clone(),
            volume_24h_krw: volume_24h,
            spread_pct,
            avg_depth5_krw: avg_depth5,
            volatility_pct,
            current_price,
            reason_flags,
        });
    }

    candidates.sort_by(|a, b| {
        b.volume_24h_krw
            .partial_cmp(&a.volume_24h_krw)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(cfg.top_n);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use ats_schemas::OrderbookUnit;

    fn ticker(price: f64, vol: f64) -> Ticker {
        Ticker {
            trade_price: price,
            high_price: price * 1.1,
            low_price: price * 0.9,
            acc_trade_volume_24h: vol / price,
            acc_trade_price_24h: vol,
        }
    }

    fn book(bid: f64, ask: f64, size: f64) -> Orderbook {
        Orderbook {
            orderbook_units: vec![
                OrderbookUnit { ask_price: ask, bid_price: bid, ask_size: size, bid_size: size };
                5
            ],
        }
    }

    fn fixture(markets: &[(&str, f64, f64)]) -> (HashMap<String, Ticker>, HashMap<String, Orderbook>) {
        let mut tickers = HashMap::new();
        let mut books = HashMap::new();
        for &(symbol, price, vol) in markets {
            tickers.insert(symbol.to_string(), ticker(price, vol));
            books.insert(symbol.to_string(), book(price * 0.999, price * 1.001, 10.0));
        }
        (tickers, books)
    }

    #[test]
    fn thin_markets_are_rejected() {
        let (tickers, books) = fixture(&[
            ("KRW-BTC", 50_000_000.0, 900_000_000_000.0),
            ("KRW-DUST", 10.0, 5_000_000.0), // below the 100M floor
        ]);
        let out = screen_markets(&tickers, &books, &ScreenerConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol, "KRW-BTC");
    }

    #[test]
    fn wide_spread_is_rejected() {
        let (mut tickers, mut books) = fixture(&[("KRW-BTC", 50_000_000.0, 900_000_000_000.0)]);
        tickers.insert("KRW-WIDE".to_string(), ticker(1000.0, 500_000_000.0));
        books.insert("KRW-WIDE".to_string(), book(990.0, 1010.0, 10.0)); // 2% spread
        let out = screen_markets(&tickers, &books, &ScreenerConfig::default());
        assert!(out.iter().all(|c| c.symbol != "KRW-WIDE"));
    }

    #[test]
    fn missing_orderbook_is_skipped() {
        let (tickers, mut books) = fixture(&[("KRW-BTC", 50_000_000.0, 900_000_000_000.0)]);
        books.clear();
        let out = screen_markets(&tickers, &books, &ScreenerConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn ranked_by_24h_notional_and_truncated() {
        let (tickers, books) = fixture(&[
            ("KRW-A", 100.0, 200_000_000.0),
            ("KRW-B", 100.0, 900_000_000.0),
            ("KRW-C", 100.0, 500_000_000.0),
        ]);
        let cfg = ScreenerConfig { top_n: 2, ..Default::default() };
        let out = screen_markets(&tickers, &books, &cfg);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].symbol, "KRW-B");
        assert_eq!(out[1].symbol, "KRW-C");
    }

    #[test]
    fn reason_flags_mark_liquidity_quality() {
        let (tickers, books) = fixture(&[("KRW-BIG", 100.0, 5_000_000_000.0)]);
        let out = screen_markets(&tickers, &books, &ScreenerConfig::default());
        assert!(out[0].reason_flags.contains(&"HIGH_VOLUME".to_string()));
        assert!(out[0].reason_flags.contains(&"TIGHT_SPREAD".to_string()));
    }
}
