//! Per-strategy trading parameters and their built-in presets.
//!
//! The Control Store holds versioned parameter rows (`config_versions`);
//! workers merge the active row over the preset for their strategy so a
//! partial override stays valid. Unknown strategies fall back to the
//! `standard` preset.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deep_merge;

/// Effective trading parameters after preset + active-config merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub risk_per_trade: f64,
    pub max_portfolio_risk: f64,
    pub slippage_limit: f64,
    pub allow_add_buy: bool,
    pub max_add_count: u32,
    pub add_position_ratio: f64,
    pub add_min_base_score: f64,
}

impl StrategyParams {
    /// Built-in preset for a strategy id. Unknown ids use `standard`.
    pub fn preset(strategy: &str) -> StrategyParams {
        match strategy {
            "safety_first" => StrategyParams {
                entry_threshold: 55.0,
                exit_threshold: 35.0,
                risk_per_trade: 0.005,
                max_portfolio_risk: 0.03,
                slippage_limit: 0.003,
                allow_add_buy: true,
                max_add_count: 1,
                add_position_ratio: 0.15,
                add_min_base_score: 72.0,
            },
            "profit_first" => StrategyParams {
                entry_threshold: 58.0,
                exit_threshold: 45.0,
                risk_per_trade: 0.015,
                max_portfolio_risk: 0.08,
                slippage_limit: 0.007,
                allow_add_buy: true,
                max_add_count: 3,
                add_position_ratio: 0.35,
                add_min_base_score: 68.0,
            },
            "crazy" => StrategyParams {
                entry_threshold: 52.0,
                exit_threshold: 50.0,
                risk_per_trade: 0.025,
                max_portfolio_risk: 0.15,
                slippage_limit: 0.01,
                allow_add_buy: true,
                max_add_count: 4,
                add_position_ratio: 0.5,
                add_min_base_score: 65.0,
            },
            // "standard", "ai_mode" and anything unknown.
            _ => StrategyParams {
                entry_threshold: 60.0,
                exit_threshold: 40.0,
                risk_per_trade: 0.01,
                max_portfolio_risk: 0.05,
                slippage_limit: 0.005,
                allow_add_buy: true,
                max_add_count: 2,
                add_position_ratio: 0.25,
                add_min_base_score: 70.0,
            },
        }
    }

    /// Merge an active-config JSON object (possibly partial, possibly absent)
    /// over the preset for `strategy`.
    ///
    /// Numeric fields accept both number and numeric-string encodings since
    /// tuned params round-trip through JSON text columns. A malformed
    /// override leaves the preset value untouched.
    pub fn resolve(strategy: &str, active_params: Option<&Value>) -> StrategyParams {
        let preset = Self::preset(strategy);
        let Some(overrides) = active_params else {
            return preset;
        };
        if !overrides.is_object() {
            return preset;
        }

        let mut merged = match serde_json::to_value(&preset) {
            Ok(v) => v,
            Err(_) => return preset,
        };
        deep_merge(&mut merged, normalize_params(overrides.clone()));

        serde_json::from_value(merged).unwrap_or(preset)
    }
}

/// The original tuner emits every param as f64 (`allow_add_buy: 1.0`,
/// `max_add_count: 2.0`); coerce those into the typed shape.
fn normalize_params(v: Value) -> Value {
    let Value::Object(map) = v else { return v };
    let mut out = serde_json::Map::new();
    for (k, val) in map {
        let coerced = match k.as_str() {
            "allow_add_buy" => match &val {
                Value::Number(n) => Value::Bool(n.as_f64().unwrap_or(0.0) > 0.0),
                Value::Bool(_) => val,
                _ => continue,
            },
            "max_add_count" => match val.as_f64() {
                Some(f) if f >= 0.0 => Value::from(f as u64),
                _ => continue,
            },
            _ => match &val {
                Value::Number(_) => val,
                Value::String(s) => match s.parse::<f64>() {
                    Ok(f) => match serde_json::Number::from_f64(f) {
                        Some(n) => Value::Number(n),
                        None => continue,
                    },
                    Err(_) => continue,
                },
                _ => continue,
            },
        };
        out.insert(k, coerced);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_strategy_uses_standard_preset() {
        assert_eq!(StrategyParams::preset("nope"), StrategyParams::preset("standard"));
    }

    #[test]
    fn resolve_without_active_config_is_the_preset() {
        let p = StrategyParams::resolve("safety_first", None);
        assert_eq!(p.entry_threshold, 55.0);
        assert_eq!(p.max_add_count, 1);
    }

    #[test]
    fn partial_override_merges_over_preset() {
        let p = StrategyParams::resolve(
            "standard",
            Some(&json!({"entry_threshold": 66.5, "risk_per_trade": 0.02})),
        );
        assert_eq!(p.entry_threshold, 66.5);
        assert_eq!(p.risk_per_trade, 0.02);
        // untouched fields keep the preset
        assert_eq!(p.exit_threshold, 40.0);
        assert!(p.allow_add_buy);
    }

    #[test]
    fn float_encoded_flags_are_coerced() {
        let p = StrategyParams::resolve(
            "standard",
            Some(&json!({"allow_add_buy": 0.0, "max_add_count": 3.0})),
        );
        assert!(!p.allow_add_buy);
        assert_eq!(p.max_add_count, 3);
    }

    #[test]
    fn garbage_override_falls_back_to_preset_values() {
        let p = StrategyParams::resolve("standard", Some(&json!({"entry_threshold": "not-a-number"})));
        assert_eq!(p.entry_threshold, 60.0);
        let p2 = StrategyParams::resolve("standard", Some(&json!([1, 2, 3])));
        assert_eq!(p2, StrategyParams::preset("standard"));
    }
}
