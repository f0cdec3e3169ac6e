//! Request and response types for the Control Store HTTP surface.
//!
//! One canonical shape per endpoint: collections live under `items`,
//! errors under `detail`. No aliases.

use ats_eval::LabeledSnapshot;
use ats_schemas::default_json_object;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Generic envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

/// 4xx/5xx body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

// ---------------------------------------------------------------------------
// /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub db_ok: bool,
}

// ---------------------------------------------------------------------------
// Traders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TraderCreateReq {
    pub trader_name: String,
    pub strategy: String,
    pub risk_mode: String,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
    pub seed_krw: Option<f64>,
    pub credential_name: Option<String>,
}

fn default_run_mode() -> String {
    "PAPER".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraderRunReq {
    pub run_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderCreatedResponse {
    pub created: bool,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialCreateReq {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialView {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Plaintext keys, only ever returned by the privileged decrypt endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptedCredential {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
}

// ---------------------------------------------------------------------------
// Regimes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeWeightResponse {
    pub regime: String,
    pub base_weight: f64,
    pub applied_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditWeightResponse {
    pub regime: String,
    pub strategy_id: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryBlockedResponse {
    pub blocked: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PnlUpdateReq {
    #[serde(default)]
    pub loss_krw: f64,
    #[serde(default)]
    pub consecutive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlippageReq {
    pub expected_price: f64,
    pub actual_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyView {
    pub trader_name: String,
    pub daily_loss_krw: f64,
    pub consecutive_losses: i64,
    pub slippage_anomaly_count: i64,
    pub api_error_count: i64,
    pub db_error_count: i64,
    pub last_loss_at: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedResponse {
    pub ok: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryAllowedResponse {
    pub allowed: bool,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ModelCreateReq {
    pub strategy_id: String,
    pub version: String,
    #[serde(default = "default_json_object")]
    pub metrics: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCreatedResponse {
    pub created: bool,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelView {
    pub id: i64,
    pub strategy_id: String,
    pub version: String,
    pub status: String,
    pub metrics: Value,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rollback_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub ok: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackReq {
    #[serde(default)]
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigCreateReq {
    pub strategy_id: String,
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigView {
    pub id: i64,
    pub strategy_id: String,
    pub version: i32,
    pub params: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Canonical hash of `params` for change tracking.
    pub params_hash: String,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ScanSnapshotIn {
    pub market: String,
    pub features: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanReq {
    pub strategy_id: String,
    #[serde(default)]
    pub top_n: Option<i32>,
    #[serde(default = "default_json_object")]
    pub params: Value,
    pub snapshots: Vec<ScanSnapshotIn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub ok: bool,
    pub scan_run_id: i64,
    /// Ids of the inserted snapshots, in request order. The labeling pass
    /// addresses snapshots by these.
    pub snapshot_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelIn {
    pub snapshot_id: i64,
    #[serde(flatten)]
    pub labels: LabeledSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLabelsReq {
    pub scan_run_id: i64,
    pub labels: Vec<LabelIn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLabelsResponse {
    pub ok: bool,
    pub updated_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateReq {
    pub strategy_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub ok: bool,
    pub status: String,
    pub reason: String,
    pub metrics: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TuneReq {
    pub strategy_id: String,
    #[serde(default)]
    pub n_trials: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneResponse {
    pub ok: bool,
    pub best_params: Value,
    pub best_score: f64,
    pub trial_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditUpdateReq {
    pub regime: String,
    pub strategy_id: String,
    pub reward_positive: bool,
}
