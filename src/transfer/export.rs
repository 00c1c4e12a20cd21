//! Export: scope resolution, bundle assembly, signing.

use tracing::info;

use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::store::SqlitePatternStore;

use super::bundle::{ExportBundle, ExportScope, PatternSnapshot};
use super::signer::Signer;

/// Builds signed bundles from the local store. Exports are read-only and
/// may run concurrently against the same store.
pub struct Exporter<'a> {
    store: &'a SqlitePatternStore,
    signer: Signer,
    workspace_prefix: String,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a SqlitePatternStore, signer: Signer, workspace_prefix: String) -> Self {
        Self {
            store,
            signer,
            workspace_prefix,
        }
    }

    /// Export the patterns selected by `scope` as signed bundle bytes.
    /// Persisting the bytes is the caller's concern.
    pub fn export(&self, scope: &ExportScope) -> Result<Vec<u8>> {
        let patterns = self.resolve_scope(scope)?;
        if patterns.is_empty() {
            return Err(Error::EmptyScope {
                scope: scope.to_string(),
            });
        }

        let snapshots = patterns
            .iter()
            .map(PatternSnapshot::from_pattern)
            .collect::<Result<Vec<_>>>()?;

        info!("exporting {} patterns (scope {})", snapshots.len(), scope);
        ExportBundle::encode(
            scope.clone(),
            self.store.instance_id(),
            snapshots,
            &self.signer,
        )
    }

    fn resolve_scope(&self, scope: &ExportScope) -> Result<Vec<Pattern>> {
        match scope {
            ExportScope::Workspace => self.store.scan_prefix(&self.workspace_prefix),
            ExportScope::All => self.store.scan_all(),
            ExportScope::Namespace { namespace } => self.store.scan_namespace(namespace),
        }
    }
}
