//! Control Store: the single authority over persistent state.
//!
//! Trader workers, the regime classifier and the trainer all talk to this
//! service over its JSON HTTP surface; no worker-to-worker messaging
//! exists. Handlers are thin — decision logic lives in the pure crates
//! (ats-guard, ats-eval, ats-weights) and in `policy` / `lifecycle` here,
//! so it stays testable without a database.

pub mod api_types;
pub mod lifecycle;
pub mod policy;
pub mod routes;
pub mod state;
