//! Contribution payment orchestrator — entry point.
//!
//! Negotiates Open Payments grants so contributors can fund projects from
//! their own wallets, records completed contributions in SQLite, and
//! exposes a small Axum REST API for the frontend.  A background task
//! sweeps grant attempts whose consent never finished.

mod api;
mod config;
mod db;
mod errors;
mod network;
mod orchestrator;
mod pending;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use network::OpenPaymentsClient;
use orchestrator::PaymentOrchestrator;
use pending::PendingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by all outbound payment-network calls.
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    // ─── Grant orchestration ──────────────────────────────
    let pending = Arc::new(PendingStore::new(Duration::from_secs(
        config.pending_ttl_secs,
    )));
    let network = Arc::new(OpenPaymentsClient::new(client));
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        network,
        pending.clone(),
        config.public_base_url.clone(),
    ));

    tokio::spawn(pending::run_sweeper(
        pending,
        Duration::from_secs(config.pending_sweep_secs),
    ));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        orchestrator,
        receiving_wallet_address: config.receiving_wallet_address.clone(),
        success_redirect_url: config.success_redirect_url.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/payments", post(api::initiate_payment))
        .route("/payments/callback", get(api::payment_callback))
        .route(
            "/projects/:id/contributions",
            get(api::get_project_contributions),
        )
        .route("/projects/:id/stats", get(api::get_project_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
