//! Patternbank - Knowledge Pattern Store & Transfer Library
//!
//! Persists learned behavioral patterns with confidence scores and moves
//! them between independent instances:
//! - SQLite-backed pattern store with content-addressed identity
//! - Namespace scoping for workspace/team boundaries
//! - Signed, versioned export bundles (SHA-256 or HMAC-SHA256)
//! - Deterministic three-strategy merge with a full audit report
//!
//! # Example
//!
//! ```ignore
//! use patternbank::{Config, SqlitePatternStore};
//! use patternbank::transfer::{ExportScope, Exporter, Signer};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = SqlitePatternStore::from_config(&config.store)?;
//!     let exporter = Exporter::new(&store, Signer::digest_only(), "workspace.".into());
//!     let bytes = exporter.export(&ExportScope::Workspace)?;
//!     std::fs::write("patterns.bundle.json", bytes)?;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod pattern;
pub mod config;
pub mod store; // Must come before transfer since transfer depends on store
pub mod transfer;
pub mod cli;

// Re-export commonly used types for convenience
pub use error::{Error, Result};

pub use pattern::{
    Confidence, Pattern, PatternContent, PatternId, PatternType, SourceScope,
};

pub use store::{SqlitePatternStore, StoreConfig, StoreStats};

pub use transfer::{
    ExportBundle, ExportScope, Exporter, Importer, MergeAction, MergeEntry, MergeReport,
    MergeStrategy, Signer, CURRENT_FORMAT_VERSION,
};

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Knowledge Pattern Store & Transfer Library", NAME, VERSION)
}
