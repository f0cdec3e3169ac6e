//! Strategy library: screening, scoring, aggregation, sizing, pre-trade
//! checks and position management.
//!
//! Everything in this crate is pure over data the worker already fetched;
//! the trader engine owns the I/O and threads results through these modules
//! in pipeline order: screen → score → aggregate → checklist → size →
//! manage.

pub mod aggregator;
pub mod checklist;
pub mod position;
pub mod scoring;
pub mod screener;
pub mod sizer;

pub use aggregator::{AggregatedScore, ScoreAggregator};
pub use checklist::{ChecklistInput, PreTradeChecker};
pub use position::{Position, PositionManager, PositionUpdate};
pub use scoring::{ModuleScore, ScoreSet};
pub use screener::{screen_markets, Candidate, ScreenerConfig};
pub use sizer::{PositionSizer, Sizing};
