//! Charity fund service: entry point.
//!
//! Exposes project and donation CRUD over a SQLite ledger. Every created
//! project or donation is immediately allocated against the open entities of
//! the other kind, oldest first.

mod allocator;
mod api;
mod config;
mod db;
mod errors;
mod models;
mod validators;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use allocator::Allocator;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let state = Arc::new(api::ApiState {
        pool: pool.clone(),
        allocator: Allocator::new(pool, config.allocation_max_retries),
        title: config.app_title.clone(),
    });

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("{} listening on http://{addr}", config.app_title);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
