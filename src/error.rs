//! Error types for the pattern store and transfer engine.

use thiserror::Error;

/// Result type alias for patternbank operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for store and transfer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed bundle bytes. Fatal to the import call, never retried.
    #[error("malformed bundle: {0}")]
    Parse(String),

    /// Two patterns in the same bundle share an id. Bundle producers must
    /// guarantee id uniqueness within a single bundle.
    #[error("duplicate pattern id in bundle: {id}")]
    DuplicateId { id: String },

    /// Signature mismatch. Fatal, always surfaced to the caller.
    #[error("bundle signature mismatch: payload does not match its signature")]
    Integrity,

    /// Bundle format newer than this build understands.
    #[error("unsupported bundle format version {found} (supported: {min_supported}..={current})")]
    Version {
        found: u32,
        min_supported: u32,
        current: u32,
    },

    /// Export scope matched zero patterns. Callers may downgrade to a warning.
    #[error("export scope {scope} matched no patterns")]
    EmptyScope { scope: String },

    /// Bounded lock wait expired. Safe to retry with backoff.
    #[error("store busy: gave up after {waited_ms}ms")]
    StoreBusy { waited_ms: u64 },

    /// Every pattern must be reachable from at least one namespace.
    #[error("pattern {id} has no namespaces")]
    EmptyNamespaces { id: String },

    #[error("pattern not found: {id}")]
    NotFound { id: String },

    #[error("store internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
