//! Pure indicator math over candle series.
//!
//! Every function is deterministic, allocation-light, and total: series that
//! are too short return a neutral value (0.0, or 50.0 for RSI) instead of
//! erroring, so scoring code never has to special-case thin markets.
//!
//! Candle slices are oldest-first.

use ats_schemas::Candle;

// ---------------------------------------------------------------------------
// Moving averages / oscillators
// ---------------------------------------------------------------------------

/// Exponential moving average over the full series, seeded at the first
/// element. A series shorter than `period` falls back to the arithmetic mean.
pub fn ema(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    if prices.len() < period {
        return prices.iter().sum::<f64>() / prices.len() as f64;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[0];
    for &price in &prices[1..] {
        ema = (price - ema) * multiplier + ema;
    }
    ema
}

pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if prices.len() < period + 1 {
        return 50.0;
    }
    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for w in prices.windows(2) {
        let d = w[1] - w[0];
        gains.push(if d > 0.0 { d } else { 0.0 });
        losses.push(if d < 0.0 { -d } else { 0.0 });
    }
    let avg_gain = mean(&gains[gains.len() - period..]);
    let avg_loss = mean(&losses[losses.len() - period..]);
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// MACD line (EMA12 − EMA26).
pub fn macd(prices: &[f64]) -> f64 {
    if prices.len() < 26 {
        return 0.0;
    }
    ema(prices, 12) - ema(prices, 26)
}

/// Upper and lower Bollinger bands (`period`-SMA ± `std_dev`·σ).
pub fn bollinger(prices: &[f64], period: usize, std_dev: f64) -> (f64, f64) {
    if prices.len() < period {
        let last = prices.last().copied().unwrap_or(0.0);
        return (last, last);
    }
    let window = &prices[prices.len() - period..];
    let ma = mean(window);
    let sd = std(window);
    (ma + std_dev * sd, ma - std_dev * sd)
}

// ---------------------------------------------------------------------------
// Range / trend strength
// ---------------------------------------------------------------------------

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (w[0], w[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect()
}

/// Average true range over the last `period` bars.
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 0.0;
    }
    let trs = true_ranges(candles);
    mean(&trs[trs.len() - period..])
}

/// ATR as a percentage of the latest close.
pub fn atr_pct(candles: &[Candle], period: usize) -> f64 {
    let a = atr(candles, period);
    match candles.last() {
        Some(c) if c.close > 0.0 => a / c.close * 100.0,
        _ => 0.0,
    }
}

/// Average Directional Index. Wilder's construction with simple averaging
/// over the lookback window; values land in [0, 100].
pub fn adx(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 0.0;
    }
    let trs = true_ranges(candles);
    let atr = mean(&trs[trs.len() - period..]);
    if atr <= 0.0 {
        return 0.0;
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let plus_di = 100.0 * mean(&plus_dm[plus_dm.len() - period..]) / atr;
    let minus_di = 100.0 * mean(&minus_dm[minus_dm.len() - period..]) / atr;
    let di_sum = plus_di + minus_di;
    if di_sum <= 0.0 {
        return 0.0;
    }
    100.0 * (plus_di - minus_di).abs() / di_sum
}

/// Realized volatility: standard deviation of simple close-to-close returns
/// over the last `window` bars.
pub fn realized_vol(closes: &[f64], window: usize) -> f64 {
    if closes.len() < window + 1 {
        return 0.0;
    }
    let tail = &closes[closes.len() - (window + 1)..];
    let rets: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if rets.len() < 2 {
        return 0.0;
    }
    std(&rets)
}

// ---------------------------------------------------------------------------
// Market-breadth metrics
// ---------------------------------------------------------------------------

/// Directional-change density of closes, normalized to [0, 1].
/// High values mean the series keeps flipping direction (chop).
pub fn whipsaw(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period * 2 {
        return 0.0;
    }
    let mut directions = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        directions.push(if w[1] > w[0] {
            1i8
        } else if w[1] < w[0] {
            -1
        } else {
            0
        });
    }
    let changes = directions
        .windows(2)
        .filter(|w| w[0] != 0 && w[1] != 0 && w[0] != w[1])
        .count();
    let max_changes = (period * 2) as f64;
    (changes as f64 / max_changes).min(1.0)
}

/// Fraction of series whose last close is above the prior close.
/// Input: one close series per market, oldest-first.
pub fn breadth_up(market_closes: &[Vec<f64>]) -> f64 {
    let mut up = 0usize;
    let mut total = 0usize;
    for closes in market_closes {
        let n = closes.len();
        if n < 2 || closes[n - 2] <= 0.0 {
            continue;
        }
        total += 1;
        if closes[n - 1] > closes[n - 2] {
            up += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        up as f64 / total as f64
    }
}

/// Cross-sectional standard deviation of the latest 1-bar return.
pub fn dispersion(market_closes: &[Vec<f64>]) -> f64 {
    let rets: Vec<f64> = market_closes
        .iter()
        .filter_map(|closes| {
            let n = closes.len();
            if n < 2 || closes[n - 2] <= 0.0 {
                return None;
            }
            Some((closes[n - 1] - closes[n - 2]) / closes[n - 2])
        })
        .collect();
    if rets.len() < 2 {
        return 0.0;
    }
    std(&rets)
}

/// Share of total traded value concentrated in the five largest markets.
/// Input: (close, volume) of the latest bar per market.
pub fn top5_value_share(latest_bars: &[(f64, f64)]) -> f64 {
    if latest_bars.len() < 5 {
        return 0.0;
    }
    let mut values: Vec<f64> = latest_bars.iter().map(|(c, v)| c * v).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values.iter().take(5).sum::<f64>() / total
}

// ---------------------------------------------------------------------------
// Small helpers
// ---------------------------------------------------------------------------

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn std(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// p-th percentile (0..=100) by linear interpolation on the sorted sample.
pub fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
