//! Import: decode, verify, version-check, merge.
//!
//! All decode/verify failures abort the import before any store mutation.
//! A dry run computes the merge against a consistent read of the store and
//! returns the report without committing; a real import commits the whole
//! merge result in one transaction.

use tracing::{info, warn};

use crate::error::Result;
use crate::store::SqlitePatternStore;

use super::bundle::ExportBundle;
use super::merge::{self, MergeReport, MergeStrategy};
use super::signer::Signer;

/// Applies bundles to the local store.
pub struct Importer<'a> {
    store: &'a SqlitePatternStore,
    signer: Signer,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a SqlitePatternStore, signer: Signer) -> Self {
        Self { store, signer }
    }

    /// Import bundle bytes under the given strategy. With `dry_run` the
    /// merge is computed in memory and the store is left untouched.
    pub fn import(
        &self,
        bundle_bytes: &[u8],
        strategy: MergeStrategy,
        dry_run: bool,
    ) -> Result<MergeReport> {
        let bundle = ExportBundle::decode(bundle_bytes)?;
        bundle.verify(&self.signer)?;
        let compatibility_warning = bundle.check_version()?;
        if let Some(warning) = &compatibility_warning {
            warn!("{}", warning);
        }

        let mut report = MergeReport::new(
            strategy,
            dry_run,
            bundle.format_version,
            compatibility_warning,
        );

        let mut to_commit = Vec::new();
        for snapshot in bundle.patterns {
            let imported = snapshot.into_pattern()?;
            let local = self.store.get(&imported.id)?;
            let resolution = merge::resolve(local.as_ref(), &imported, strategy);
            if let Some(pattern) = resolution.write {
                to_commit.push(pattern);
            }
            report.entries.push(resolution.entry);
        }

        if dry_run {
            info!(
                "dry-run import: {} inserted, {} updated, {} skipped (not committed)",
                report.inserted(),
                report.updated(),
                report.skipped()
            );
            return Ok(report);
        }

        self.store.apply_merge(&to_commit)?;
        info!(
            "import committed: {} inserted, {} updated, {} skipped",
            report.inserted(),
            report.updated(),
            report.skipped()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pattern::{Pattern, PatternContent, WorkflowContent};
    use crate::store::StoreConfig;
    use crate::transfer::bundle::ExportScope;
    use crate::transfer::export::Exporter;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir, file: &str) -> SqlitePatternStore {
        SqlitePatternStore::from_config(&StoreConfig {
            database_path: dir.path().join(file),
            busy_timeout_ms: 500,
        })
        .unwrap()
    }

    fn workflow(name: &str, confidence: f64, ns: &str) -> Pattern {
        Pattern::new(
            PatternContent::Workflow(WorkflowContent {
                name: name.to_string(),
                steps: vec!["step".to_string()],
                trigger: None,
                extra: BTreeMap::new(),
            }),
            confidence,
            [ns.to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_import_inserts_into_empty_store() {
        let dir = tempdir().unwrap();
        let source = open_store(&dir, "source.db");
        source.put(workflow("a", 0.5, "workspace.flow")).unwrap();

        let signer = Signer::digest_only();
        let bytes = Exporter::new(&source, signer.clone(), "workspace.".to_string())
            .export(&ExportScope::All)
            .unwrap();

        let target = open_store(&dir, "target.db");
        let report = Importer::new(&target, signer)
            .import(&bytes, MergeStrategy::Auto, false)
            .unwrap();

        assert_eq!(report.inserted(), 1);
        assert_eq!(target.scan_all().unwrap().len(), 1);
        // Arrived via import
        assert_eq!(
            target.scan_all().unwrap()[0].source_scope,
            crate::pattern::SourceScope::Imported
        );
    }

    #[test]
    fn test_import_rejects_wrong_signer() {
        let dir = tempdir().unwrap();
        let source = open_store(&dir, "source.db");
        source.put(workflow("a", 0.5, "workspace.flow")).unwrap();

        let bytes = Exporter::new(
            &source,
            Signer::with_secret(b"sender".to_vec()),
            "workspace.".to_string(),
        )
        .export(&ExportScope::All)
        .unwrap();

        let target = open_store(&dir, "target.db");
        let err = Importer::new(&target, Signer::with_secret(b"receiver".to_vec()))
            .import(&bytes, MergeStrategy::Auto, false);

        assert!(matches!(err, Err(Error::Integrity)));
        assert!(target.scan_all().unwrap().is_empty());
    }

    #[test]
    fn test_import_malformed_is_parse_error() {
        let dir = tempdir().unwrap();
        let target = open_store(&dir, "target.db");
        let err = Importer::new(&target, Signer::digest_only()).import(
            b"{]",
            MergeStrategy::Auto,
            false,
        );
        assert!(matches!(err, Err(Error::Parse(_))));
    }
}
