//! Timeline Ingest Service — fetches recent statuses for a Twitter handle via
//! the app-only search API and persists them for an external display layer.
//!
//! Default: http://127.0.0.1:9108/

mod db;
mod errlog;
mod pipeline;
mod routes;
mod sanitize;
mod twitter_api;

use routes::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let port: u16 = std::env::var("TIMELINE_INGEST_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9108);

    let db_path = std::env::var("TIMELINE_INGEST_DB_PATH")
        .unwrap_or_else(|_| "./timeline_ingest.db".to_string());

    let error_log_path = std::env::var("TIMELINE_INGEST_ERROR_LOG")
        .unwrap_or_else(|_| "./error.log".to_string());

    let strip_slashes = std::env::var("TIMELINE_INGEST_STRIP_SLASHES")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let credentials = twitter_api::TwitterCredentials::from_env();
    if credentials.is_none() {
        log::warn!("Twitter credentials not set — ingestion endpoint will refuse requests");
    }

    log::info!("Opening database at: {}", db_path);
    let database = Arc::new(
        db::Db::open(&db_path, errlog::ErrorLog::new(&error_log_path))
            .expect("Failed to open database"),
    );

    // One client for the process; a bounded timeout keeps a stalled platform
    // call from pinning a request forever.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .expect("Failed to build HTTP client");

    let state = Arc::new(AppState {
        db: database,
        client,
        credentials,
        sanitizer: sanitize::Sanitizer::new(strip_slashes),
        start_time: Instant::now(),
    });

    // The display layer is served from a different origin.
    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        .route(
            "/rpc/statuses/list",
            axum::routing::get(routes::statuses_list),
        )
        .route("/rpc/ingest", axum::routing::post(routes::ingest))
        .route("/rpc/status", axum::routing::get(routes::status))
        .with_state(state)
        .layer(cors);

    let addr = format!("127.0.0.1:{}", port);
    log::info!("Timeline Ingest Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
