//! Axum route handlers for the ingest RPC API.

use crate::db::Db;
use crate::pipeline;
use crate::sanitize::Sanitizer;
use crate::twitter_api::TwitterCredentials;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;
use std::time::Instant;
use timeline_ingest_types::*;

pub struct AppState {
    pub db: Arc<Db>,
    pub client: reqwest::Client,
    pub credentials: Option<TwitterCredentials>,
    pub sanitizer: Sanitizer,
    pub start_time: Instant,
}

/// The platform search API caps result counts at 100 per request.
const MAX_COUNT: u64 = 100;

// GET /rpc/statuses/list
pub async fn statuses_list(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<Vec<StatusRecord>>>) {
    match state.db.list_statuses() {
        Ok(records) => (StatusCode::OK, Json(RpcResponse::ok(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RpcResponse::err(format!("Failed to list statuses: {}", e))),
        ),
    }
}

// POST /rpc/ingest
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<RpcResponse<IngestionReport>>) {
    // Validation and sanitization happen before any network or store access.
    let req = match parse_ingest_request(&state.sanitizer, body) {
        Ok(req) => req,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(RpcResponse::err(msg))),
    };

    let credentials = match &state.credentials {
        Some(c) => c,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RpcResponse::err("Twitter credentials not configured")),
            );
        }
    };

    match pipeline::run(&state.db, &state.client, credentials, &req.handle, req.count).await {
        Ok(report) => (StatusCode::OK, Json(RpcResponse::ok(report))),
        Err(e) => {
            log::error!("Ingestion run for @{} failed: {}", req.handle, e);
            (StatusCode::BAD_GATEWAY, Json(RpcResponse::err(e.to_string())))
        }
    }
}

// GET /rpc/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<ServiceStatus>>) {
    let status = ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        accounts: state.db.count_accounts().unwrap_or(0),
        statuses: state.db.count_statuses().unwrap_or(0),
    };
    (StatusCode::OK, Json(RpcResponse::ok(status)))
}

/// Sanitize the raw body as a JSON value, then pull out `handle` and `count`.
/// `count` may arrive as a number or a numeric string; it is clamped to the
/// platform's per-request cap.
fn parse_ingest_request(
    sanitizer: &Sanitizer,
    body: serde_json::Value,
) -> Result<IngestRequest, String> {
    let clean = sanitizer.clean_value(body);

    let handle = clean
        .get("handle")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing or empty handle".to_string())?;

    let count = clean
        .get("count")
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .ok_or_else(|| "Missing or invalid count".to_string())?;

    Ok(IngestRequest {
        handle,
        count: count.clamp(1, MAX_COUNT) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(false)
    }

    #[test]
    fn valid_request_parses() {
        let req = parse_ingest_request(&sanitizer(), json!({"handle": "rustlang", "count": 10}))
            .expect("valid request");
        assert_eq!(req.handle, "rustlang");
        assert_eq!(req.count, 10);
    }

    #[test]
    fn handle_is_sanitized_and_stripped() {
        let req = parse_ingest_request(
            &sanitizer(),
            json!({"handle": " @<b>rustlang</b> ", "count": 10}),
        )
        .expect("valid request");
        assert_eq!(req.handle, "rustlang");
    }

    #[test]
    fn missing_fields_short_circuit() {
        assert!(parse_ingest_request(&sanitizer(), json!({"count": 10})).is_err());
        assert!(parse_ingest_request(&sanitizer(), json!({"handle": "rustlang"})).is_err());
        assert!(parse_ingest_request(&sanitizer(), json!({"handle": "", "count": 10})).is_err());
        // A handle that is nothing but markup sanitizes to empty.
        assert!(
            parse_ingest_request(&sanitizer(), json!({"handle": "<script>x</script>", "count": 5}))
                .is_err()
        );
    }

    #[test]
    fn count_accepts_numeric_strings_and_clamps() {
        let req = parse_ingest_request(&sanitizer(), json!({"handle": "a", "count": "25"}))
            .expect("stringy count");
        assert_eq!(req.count, 25);

        let req = parse_ingest_request(&sanitizer(), json!({"handle": "a", "count": 5000}))
            .expect("oversized count");
        assert_eq!(req.count, 100);

        let req = parse_ingest_request(&sanitizer(), json!({"handle": "a", "count": 0}))
            .expect("zero count");
        assert_eq!(req.count, 1);
    }
}
