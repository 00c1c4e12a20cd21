//! Cross-instance transfer of learned patterns.
//!
//! Provides:
//! - Signed, versioned, portable export bundles
//! - Scope-based export (workspace, all, single namespace)
//! - Import with deterministic three-strategy conflict resolution
//! - Dry-run previews and a full merge audit trail

pub mod bundle;
pub mod export;
pub mod import;
pub mod merge;
pub mod signer;

pub use bundle::{
    ExportBundle, ExportScope, PatternSnapshot, CURRENT_FORMAT_VERSION,
    MIN_SUPPORTED_FORMAT_VERSION,
};
pub use export::Exporter;
pub use import::Importer;
pub use merge::{MergeAction, MergeEntry, MergeReport, MergeStrategy};
pub use signer::Signer;
