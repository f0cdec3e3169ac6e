//! Shared wire and domain types for the trading platform.
//!
//! Everything here is `Serialize + Deserialize` so the same structs travel
//! over the Control Store HTTP surface and into worker code. No business
//! logic lives in this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Market regime labels produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    #[serde(rename = "TREND")]
    Trend,
    #[serde(rename = "RANGE")]
    Range,
    #[serde(rename = "CHOP")]
    Chop,
    #[serde(rename = "PANIC")]
    Panic,
    #[serde(rename = "BREAKOUT_ROTATION")]
    BreakoutRotation,
}

impl Regime {
    pub const ALL: [Regime; 5] = [
        Regime::Trend,
        Regime::Range,
        Regime::Chop,
        Regime::Panic,
        Regime::BreakoutRotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trend => "TREND",
            Regime::Range => "RANGE",
            Regime::Chop => "CHOP",
            Regime::Panic => "PANIC",
            Regime::BreakoutRotation => "BREAKOUT_ROTATION",
        }
    }

    /// Numeric id persisted alongside the label in snapshots.
    pub fn id(&self) -> i32 {
        match self {
            Regime::Range => 0,
            Regime::Trend => 1,
            Regime::Chop => 2,
            Regime::Panic => 3,
            Regime::BreakoutRotation => 4,
        }
    }

    pub fn parse(s: &str) -> Option<Regime> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TREND" => Some(Regime::Trend),
            "RANGE" => Some(Regime::Range),
            "CHOP" => Some(Regime::Chop),
            "PANIC" => Some(Regime::Panic),
            "BREAKOUT_ROTATION" => Some(Regime::BreakoutRotation),
            _ => None,
        }
    }

    /// New entries are forbidden in these regimes regardless of score.
    pub fn blocks_entries(&self) -> bool {
        matches!(self, Regime::Chop | Regime::Panic)
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trader modes
// ---------------------------------------------------------------------------

/// Risk appetite of a trader; scales the final score multiplicatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskMode {
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "PROFIT")]
    Profit,
    #[serde(rename = "CRAZY")]
    Crazy,
}

impl RiskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskMode::Safe => "SAFE",
            RiskMode::Standard => "STANDARD",
            RiskMode::Profit => "PROFIT",
            RiskMode::Crazy => "CRAZY",
        }
    }

    pub fn parse(s: &str) -> Option<RiskMode> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Some(RiskMode::Safe),
            "STANDARD" => Some(RiskMode::Standard),
            "PROFIT" => Some(RiskMode::Profit),
            "CRAZY" => Some(RiskMode::Crazy),
            _ => None,
        }
    }

    /// Final-score multiplier per risk mode.
    pub fn multiplier(&self) -> f64 {
        match self {
            RiskMode::Safe => 0.3,
            RiskMode::Standard => 0.5,
            RiskMode::Profit => 0.7,
            RiskMode::Crazy => 1.0,
        }
    }
}

/// PAPER simulates fills; LIVE submits real orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[serde(rename = "PAPER")]
    Paper,
    #[serde(rename = "LIVE")]
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Paper => "PAPER",
            RunMode::Live => "LIVE",
        }
    }

    pub fn parse(s: &str) -> Option<RunMode> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Some(RunMode::Paper),
            "LIVE" => Some(RunMode::Live),
            _ => None,
        }
    }
}

/// Trader lifecycle status as stored in the Control Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraderStatus {
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "RUN")]
    Run,
    #[serde(rename = "ERROR")]
    Error,
}

impl TraderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraderStatus::Stop => "STOP",
            TraderStatus::Run => "RUN",
            TraderStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<TraderStatus> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOP" => Some(TraderStatus::Stop),
            "RUN" => Some(TraderStatus::Run),
            "ERROR" => Some(TraderStatus::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Model lifecycle
// ---------------------------------------------------------------------------

/// Model version lifecycle states (spec'd transitions live in the store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    #[serde(rename = "DRAFT")]
    Draft,
    #[serde(rename = "VALIDATED")]
    Validated,
    #[serde(rename = "PAPER_DEPLOYED")]
    PaperDeployed,
    #[serde(rename = "LIVE_ELIGIBLE")]
    LiveEligible,
    #[serde(rename = "LIVE_ARMED")]
    LiveArmed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Draft => "DRAFT",
            ModelStatus::Validated => "VALIDATED",
            ModelStatus::PaperDeployed => "PAPER_DEPLOYED",
            ModelStatus::LiveEligible => "LIVE_ELIGIBLE",
            ModelStatus::LiveArmed => "LIVE_ARMED",
        }
    }

    pub fn parse(s: &str) -> Option<ModelStatus> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(ModelStatus::Draft),
            "VALIDATED" => Some(ModelStatus::Validated),
            "PAPER_DEPLOYED" => Some(ModelStatus::PaperDeployed),
            "LIVE_ELIGIBLE" => Some(ModelStatus::LiveEligible),
            "LIVE_ARMED" => Some(ModelStatus::LiveArmed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Terminal outcome of one `execute_order` call.
///
/// `filled_qty` is coin quantity for both sides. A paper BUY converts its
/// KRW input via `size / fill_price` before reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_qty: f64,
    pub avg_price: Option<f64>,
    pub error: Option<String>,
}

impl OrderResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            filled_qty: 0.0,
            avg_price: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One OHLCV bar, oldest-first when held in a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 24h ticker payload for one market, as served by the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub trade_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub acc_trade_volume_24h: f64,
    pub acc_trade_price_24h: f64,
}

/// One price level of an orderbook (bid and ask side at the same depth).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookUnit {
    pub ask_price: f64,
    pub bid_price: f64,
    pub ask_size: f64,
    pub bid_size: f64,
}

/// Top-of-book depth snapshot, best level first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Orderbook {
    pub orderbook_units: Vec<OrderbookUnit>,
}

// ---------------------------------------------------------------------------
// Control Store request/response bodies shared by store and workers
// ---------------------------------------------------------------------------

/// `GET /api/traders/{name}` — a worker's self-configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderView {
    pub name: String,
    pub strategy: String,
    pub risk_mode: RiskMode,
    pub run_mode: RunMode,
    pub seed_krw: f64,
    pub credential_name: Option<String>,
    pub status: TraderStatus,
    pub paper_started_at: Option<DateTime<Utc>>,
    pub armed_at: Option<DateTime<Utc>>,
    pub paper_protect_remaining_sec: i64,
    pub pnl_krw: f64,
}

/// Empty-object default for jsonb-backed fields (`null` would turn into a
/// SQL NULL and break the NOT NULL columns).
pub fn default_json_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// `POST /api/regimes/snapshot`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshotIn {
    pub market: String,
    pub regime_id: i32,
    pub regime_label: String,
    pub confidence: f64,
    #[serde(default = "default_json_object")]
    pub metrics: serde_json::Value,
}

/// One row of `GET /api/regimes/snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshotView {
    pub ts: DateTime<Utc>,
    pub market: String,
    pub regime_id: i32,
    pub regime_label: String,
    pub confidence: f64,
    pub metrics: serde_json::Value,
}

/// `POST /api/trades/signal`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalIn {
    pub trader_name: String,
    pub symbol: String,
    pub total_score: f64,
    #[serde(default = "default_json_object")]
    pub scores: serde_json::Value,
    pub regime: String,
    /// "ENTRY" | "EXIT" | "HOLD"
    pub action: String,
    #[serde(default)]
    pub reason_codes: Vec<String>,
}

/// `POST /api/trades/order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIn {
    pub trader_name: String,
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub status: String,
    pub filled_qty: f64,
    pub avg_price: Option<f64>,
}

/// One reconstructed holding from `GET /api/trades/holdings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingView {
    pub market: String,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub last_ts: Option<DateTime<Utc>>,
}

/// `POST /api/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventIn {
    pub trader_name: Option<String>,
    pub level: String,
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_round_trips_through_label() {
        for r in Regime::ALL {
            assert_eq!(Regime::parse(r.as_str()), Some(r));
        }
        assert_eq!(Regime::parse("breakout_rotation"), Some(Regime::BreakoutRotation));
        assert_eq!(Regime::parse("??"), None);
    }

    #[test]
    fn chop_and_panic_block_entries() {
        assert!(Regime::Chop.blocks_entries());
        assert!(Regime::Panic.blocks_entries());
        assert!(!Regime::Trend.blocks_entries());
        assert!(!Regime::Range.blocks_entries());
        assert!(!Regime::BreakoutRotation.blocks_entries());
    }

    #[test]
    fn risk_multipliers_match_modes() {
        assert_eq!(RiskMode::Safe.multiplier(), 0.3);
        assert_eq!(RiskMode::Standard.multiplier(), 0.5);
        assert_eq!(RiskMode::Profit.multiplier(), 0.7);
        assert_eq!(RiskMode::Crazy.multiplier(), 1.0);
    }

    #[test]
    fn serde_uses_screaming_labels() {
        let json = serde_json::to_string(&Regime::BreakoutRotation).unwrap();
        assert_eq!(json, "\"BREAKOUT_ROTATION\"");
        let back: RunMode = serde_json::from_str("\"LIVE\"").unwrap();
        assert_eq!(back, RunMode::Live);
    }
}
