//! ats-store entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the
//! database, builds the shared state, wires middleware, and starts the HTTP
//! server. Route handlers live in `routes/`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use ats_config::Settings;
use ats_store::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; silent if the file does not exist — production
    // injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = Settings::from_env();
    let pool = ats_db::connect(&settings.database_url).await?;
    ats_db::migrate(&pool).await.context("schema migration failed")?;

    let cors = state::cors_from_settings(&settings);
    let shared = Arc::new(state::AppState::new(pool, settings));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&shared),
            routes::require_api_key,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));
    info!("ats-store listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ATS_STORE_ADDR").ok()?.parse().ok()
}
