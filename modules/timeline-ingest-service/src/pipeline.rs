//! Ingestion pipeline: token exchange, status search, dedup and writes.
//!
//! Accounts are upserted before their statuses so the foreign key always
//! resolves. A failure on one payload is counted and logged but does not
//! abort the rest of the batch.

use crate::db::{AccountUpsert, Db, StatusInsert};
use crate::twitter_api::{self, StatusPayload, TwitterCredentials};
use std::collections::HashSet;
use std::fmt;
use timeline_ingest_types::IngestionReport;

#[derive(Debug)]
pub enum IngestError {
    /// Credential exchange failed; the run cannot proceed.
    Auth(String),
    /// The search call failed or returned malformed data. Distinct from a
    /// handle with zero recent statuses, which is a successful empty run.
    Fetch(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Auth(msg) => write!(f, "Token exchange failed: {}", msg),
            IngestError::Fetch(msg) => write!(f, "Status search failed: {}", msg),
        }
    }
}

/// One full ingestion run. The bearer token lives only within this call; no
/// credential state is shared between runs.
pub async fn run(
    db: &Db,
    client: &reqwest::Client,
    credentials: &TwitterCredentials,
    handle: &str,
    count: u32,
) -> Result<IngestionReport, IngestError> {
    let token = twitter_api::request_bearer_token(client, credentials)
        .await
        .map_err(IngestError::Auth)?;

    let payloads = twitter_api::search_statuses(client, &token, handle, count)
        .await
        .map_err(IngestError::Fetch)?;

    log::info!("Fetched {} statuses for @{}", payloads.len(), handle);
    Ok(store_batch(db, handle, &payloads))
}

/// Persist one fetched batch. Idempotent: replaying the same batch inserts
/// nothing new and leaves account counters at the latest fetched values.
pub fn store_batch(db: &Db, handle: &str, payloads: &[StatusPayload]) -> IngestionReport {
    let mut report = IngestionReport {
        handle: handle.to_string(),
        fetched: payloads.len(),
        new_statuses: 0,
        new_status_ids: Vec::new(),
        accounts_seen: 0,
        failures: 0,
    };

    let mut seen_accounts: HashSet<i64> = HashSet::new();

    for payload in payloads {
        match store_one(db, payload, &mut seen_accounts) {
            Ok(Some(status_id)) => {
                report.new_statuses += 1;
                report.new_status_ids.push(status_id);
            }
            Ok(None) => {} // already stored
            Err(e) => {
                log::warn!("Failed to store status {}: {}", payload.id_str, e);
                report.failures += 1;
            }
        }
    }

    report.accounts_seen = seen_accounts.len();

    if report.new_statuses > 0 {
        log::info!(
            "Stored {} new statuses for @{} ({} failures)",
            report.new_statuses,
            handle,
            report.failures
        );
    }

    report
}

fn store_one(
    db: &Db,
    payload: &StatusPayload,
    seen_accounts: &mut HashSet<i64>,
) -> Result<Option<i64>, String> {
    let status_id: i64 = payload
        .id_str
        .parse()
        .map_err(|_| format!("bad status id: {:?}", payload.id_str))?;
    let user_id: i64 = payload
        .user
        .id_str
        .parse()
        .map_err(|_| format!("bad author id: {:?}", payload.user.id_str))?;

    let account_created = normalize_timestamp(&payload.user.created_at);
    let status_created = normalize_timestamp(&payload.created_at);

    db.upsert_account(&AccountUpsert {
        id: user_id,
        name: &payload.user.name,
        handle: &payload.user.screen_name,
        followers_count: payload.user.followers_count,
        friends_count: payload.user.friends_count,
        statuses_count: payload.user.statuses_count,
        created_at: &account_created,
    })
    .map_err(|e| format!("account upsert failed: {}", e))?;
    seen_accounts.insert(user_id);

    let inserted = db
        .insert_status(&StatusInsert {
            id: status_id,
            user_id,
            text: &payload.text,
            source: &payload.source,
            created_at: &status_created,
        })
        .map_err(|e| format!("status insert failed: {}", e))?;

    Ok(inserted.then_some(status_id))
}

/// Unparseable timestamps are stored as received; the display layer owns
/// formatting.
fn normalize_timestamp(raw: &str) -> String {
    match twitter_api::parse_platform_timestamp(raw) {
        Some(normalized) => normalized,
        None => {
            log::warn!("Unparseable platform timestamp: {:?}", raw);
            raw.to_string()
        }
    }
}
