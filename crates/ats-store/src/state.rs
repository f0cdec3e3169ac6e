//! Shared runtime state for the Control Store.

use std::sync::atomic::AtomicBool;

use ats_config::Settings;
use ats_crypto::CredentialCipher;
use ats_notify::TelegramNotifier;
use axum::http::{HeaderValue, Method};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Handle shared across all Axum handlers (always behind an `Arc`).
pub struct AppState {
    pub pool: PgPool,
    pub settings: Settings,
    pub cipher: CredentialCipher,
    pub notifier: TelegramNotifier,
    /// PANIC alerts fire once per episode; reset by the first non-PANIC
    /// snapshot.
    pub panic_notified: AtomicBool,
}

impl AppState {
    pub fn new(pool: PgPool, settings: Settings) -> Self {
        let cipher = CredentialCipher::from_master_key(&settings.crypto_master_key);
        let notifier = TelegramNotifier::new(
            settings.telegram_bot_token.clone(),
            settings.telegram_chat_id.clone(),
        );
        Self { pool, settings, cipher, notifier, panic_notified: AtomicBool::new(false) }
    }
}

/// CORS per `CORS_ALLOW_ORIGINS`: `*` (default) allows any origin,
/// otherwise a comma-separated allowlist.
pub fn cors_from_settings(settings: &Settings) -> CorsLayer {
    let raw = settings.cors_allow_origins.trim();
    let origin = if raw == "*" || raw.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            raw.split(',')
                .filter_map(|o| HeaderValue::from_str(o.trim()).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
