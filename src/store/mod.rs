//! Persistent pattern storage.
//!
//! Provides:
//! - SQLite-based pattern persistence with content-addressed ids
//! - Namespace-scoped scans for export and query
//! - Transactional batch commits for imports
//! - Bounded lock waits (no operation blocks indefinitely)

pub mod sqlite;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use sqlite::{SqlitePatternStore, StoreStats};

/// Pattern store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Upper bound on waiting for the store lock before failing busy
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    crate::config::data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("patterns.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}
