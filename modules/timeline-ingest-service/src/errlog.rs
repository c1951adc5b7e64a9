//! Append-only error log file.
//!
//! One line per failure: timestamp, error code, error message, context
//! message, location. Consumed by operators, never by the RPC clients.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry. A failure to write the log is itself only logged,
    /// never propagated.
    pub fn record(&self, code: &str, error: &str, context: &str, location: &str) {
        let line = format!(
            "{} :: ({}) {} :: {} :: {}\n",
            chrono::Utc::now().to_rfc3339(),
            code,
            error,
            context,
            location
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            log::warn!("Failed to append to error log {}: {}", self.path.display(), e);
        }
    }
}
