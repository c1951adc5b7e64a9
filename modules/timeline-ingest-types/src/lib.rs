//! Shared types for the timeline ingest service and its RPC clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Domain Types
// =====================================================

/// A Twitter account as stored. `name`, `handle` and `created_at` are fixed at
/// first sighting; the three counters are refreshed on every sighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub handle: String,
    pub followers_count: i64,
    pub friends_count: i64,
    pub statuses_count: i64,
    pub created_at: String,
}

/// A stored status. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub source: String,
    pub created_at: String,
}

/// One row of the status-to-account join served to the display layer.
/// The display layer sorts and formats client-side, so no ordering is promised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub handle: String,
    pub name: String,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

// =====================================================
// RPC Request Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub handle: String,
    pub count: u32,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Outcome of one ingestion run. `failures` counts payloads whose writes
/// failed; a non-zero value does not make the run itself a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub handle: String,
    pub fetched: usize,
    pub new_statuses: usize,
    pub new_status_ids: Vec<i64>,
    pub accounts_seen: usize,
    pub failures: usize,
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub accounts: i64,
    pub statuses: i64,
}
