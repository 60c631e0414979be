//! Engagement backend for the candidate micro-sites.
//!
//! Records visits, poll votes, quiz answers and feedback per candidate and
//! serves the statistics behind the candidate and platform dashboards.
//!
//!
//!
//! # Request Flow
//! - Reverse proxy terminates TLS and sets `X-Forwarded-For`/`X-Real-IP`
//! - Handler resolves the candidate, page and poll/quiz against the catalog
//! - Raw address is geolocated and hashed, then dropped
//! - Ledger append runs on the blocking pool with a timeout
//!
//!
//!
//! # Privacy
//!
//! **Goal**: count and deduplicate visitors without being able to identify or
//! follow them.
//!
//! - No cookies, no stored addresses
//! - Identity is `sha256(address, UTC day, salt)`, see [`identity`]
//! - Identities from different days cannot be linked, so "unique visitors"
//!   is always per day
//! - Location is city level at most and resolved locally
//!
//!
//!
//! # Duplicate Prevention
//! - Poll: one vote per identity, the unique index decides
//! - Feedback: `FEEDBACK_DAILY_LIMIT` per identity and day
//! - Quiz: unlimited unless `UNIQUE_QUIZ_ANSWERS=true`
//! - Whatever the frontend remembers in local storage is only cosmetic
//!
//!
//!
//! # Notes
//!
//! ## SQLite
//! One file, one writer connection. Volume per candidate is small (a few
//! thousand events a day at most) so a mutex around the connection is enough,
//! and WAL keeps dashboard reads from blocking visitors.
//!
//! ## Hot reload
//! The GeoLite2 database is replaced monthly and the catalog whenever content
//! changes. Both live behind `RwLock<Arc<_>>` and are swapped without a
//! restart through the platform admin routes.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod database;
pub mod engagement;
pub mod error;
pub mod geo;
pub mod identity;
pub mod ledger;
pub mod routes;
pub mod state;
pub mod utils;

use config::Config;
use error::StartupError;
use routes::{
    admin_locations_handler, admin_reset_handler, admin_series_handler, admin_stats_handler,
    catalog_reload_handler, feedback_handler, geoip_reload_handler, health_handler,
    platform_reset_handler, platform_stats_handler, poll_results_handler, poll_vote_handler,
    quiz_answer_handler, visit_handler,
};
use state::State;

pub fn build_router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/platform/stats", get(platform_stats_handler))
        .route("/api/platform/reset", post(platform_reset_handler))
        .route("/api/platform/geoip/reload", post(geoip_reload_handler))
        .route("/api/platform/catalog/reload", post(catalog_reload_handler))
        .route("/api/{slug}/event/visit", post(visit_handler))
        .route("/api/{slug}/poll/vote", post(poll_vote_handler))
        .route("/api/{slug}/poll/results/{page}/{poll_id}", get(poll_results_handler))
        .route("/api/{slug}/quiz/answer", post(quiz_answer_handler))
        .route("/api/{slug}/feedback", post(feedback_handler))
        .route("/api/{slug}/admin/stats", get(admin_stats_handler))
        .route("/api/{slug}/admin/series", get(admin_series_handler))
        .route("/api/{slug}/admin/locations", get(admin_locations_handler))
        .route("/api/{slug}/admin/reset", post(admin_reset_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` resolves. Peer addresses are made available to
/// handlers for clients that bypass the proxy.
pub async fn serve(
    listener: TcpListener,
    state: Arc<State>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StartupError> {
    let app = build_router(state);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;
    let port = config.port;

    info!("Initializing state...");
    let state = State::new(config)?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{port}");
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    info!("Server running on {address}");

    serve(listener, state, shutdown_signal()).await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
