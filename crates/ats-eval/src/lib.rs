//! Model evaluation, gating, drift detection and auto-tuning.
//!
//! Consumers: the Control Store (validate/check_eligible endpoints) and the
//! trainer loop. Everything here is pure over in-memory label data; callers
//! own persistence.

pub mod drift;
pub mod gate;
pub mod metrics;
pub mod tuner;

pub use drift::{check_drift, rollback_reason, DriftCheck, RollbackInputs};
pub use gate::{evaluate_model, GateDecision};
pub use metrics::{compute_metrics, EvalMetrics, LabeledSnapshot, RoundTripCost};
pub use tuner::{default_param_space, optimize, ParamRange, ParamSpace, TrialRecord, TuneOutcome};
