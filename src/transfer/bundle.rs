//! Portable export bundle: wire format, codec, and version window.
//!
//! A bundle is a human-inspectable JSON document with top-level fields
//! `format_version`, `scope`, `source_instance`, `patterns` and
//! `signature`. The signature covers the compact JSON serialization of
//! everything but the signature itself, so relabeling the declared scope or
//! downgrading the version invalidates it.
//!
//! Serialization is deterministic: snapshots are ordered by id and all JSON
//! maps use sorted keys, so two exports of an unchanged pattern set at the
//! same format version are byte-identical.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pattern::{
    canonical, Confidence, Pattern, PatternContent, PatternId, PatternType, SourceScope,
};

use super::signer::Signer;

/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Oldest format version this build still reads (with a warning).
pub const MIN_SUPPORTED_FORMAT_VERSION: u32 = 1;

/// What an export selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportScope {
    /// Patterns with a namespace under the configured workspace prefix.
    Workspace,
    /// Every pattern in the store.
    All,
    /// Patterns whose namespace set contains exactly this namespace.
    Namespace { namespace: String },
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportScope::Workspace => write!(f, "workspace"),
            ExportScope::All => write!(f, "all"),
            ExportScope::Namespace { namespace } => write!(f, "namespace({})", namespace),
        }
    }
}

/// A pattern as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub id: PatternId,
    pub pattern_type: PatternType,
    pub confidence: Confidence,
    pub metadata: Value,
    pub namespaces: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatternSnapshot {
    pub fn from_pattern(pattern: &Pattern) -> Result<Self> {
        Ok(Self {
            id: pattern.id.clone(),
            pattern_type: pattern.pattern_type(),
            confidence: pattern.confidence,
            metadata: pattern.content.metadata_value()?,
            namespaces: pattern.namespaces.clone(),
            created_at: pattern.created_at,
            updated_at: pattern.updated_at,
        })
    }

    /// Rebuild a pattern from the snapshot, marking it as imported.
    ///
    /// The id is recomputed from the content and must match the declared
    /// one: a mismatch means the producer's canonicalization drifted (or the
    /// snapshot was assembled by hand) and merge matching cannot be trusted.
    pub fn into_pattern(self) -> Result<Pattern> {
        let content = PatternContent::from_parts(self.pattern_type, self.metadata)
            .map_err(|e| Error::Parse(format!("pattern {}: {}", self.id, e)))?;

        let expected = canonical::pattern_id(&content);
        if expected != self.id {
            return Err(Error::Parse(format!(
                "pattern {} does not match its content address (expected {})",
                self.id, expected
            )));
        }

        if self.namespaces.is_empty() {
            return Err(Error::EmptyNamespaces {
                id: self.id.to_string(),
            });
        }

        Ok(Pattern {
            id: self.id,
            content,
            confidence: self.confidence,
            namespaces: self.namespaces,
            source_scope: SourceScope::Imported,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// The signed payload. Field order here is the wire order.
#[derive(Serialize)]
struct BundlePayload<'a> {
    format_version: u32,
    scope: &'a ExportScope,
    source_instance: Uuid,
    patterns: &'a [PatternSnapshot],
}

/// A signed, versioned, portable container of exported patterns.
/// Immutable once signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: u32,
    pub scope: ExportScope,
    pub source_instance: Uuid,
    pub patterns: Vec<PatternSnapshot>,
    pub signature: String,
}

impl ExportBundle {
    /// Serialize a bundle: order snapshots by id, reject duplicate ids,
    /// sign the payload, and render the human-inspectable document.
    pub fn encode(
        scope: ExportScope,
        source_instance: Uuid,
        mut patterns: Vec<PatternSnapshot>,
        signer: &Signer,
    ) -> Result<Vec<u8>> {
        patterns.sort_by(|a, b| a.id.cmp(&b.id));
        check_unique_ids(&patterns)?;

        let payload = serde_json::to_vec(&BundlePayload {
            format_version: CURRENT_FORMAT_VERSION,
            scope: &scope,
            source_instance,
            patterns: &patterns,
        })?;
        let signature = signer.sign(&payload);

        let bundle = ExportBundle {
            format_version: CURRENT_FORMAT_VERSION,
            scope,
            source_instance,
            patterns,
            signature,
        };

        let mut bytes = serde_json::to_vec_pretty(&bundle)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse a bundle document. Structural problems (bad JSON, unknown
    /// fields of the wrong shape, duplicate ids) are parse errors; the
    /// signature is not checked here.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let bundle: ExportBundle =
            serde_json::from_slice(bytes).map_err(|e| Error::Parse(e.to_string()))?;
        check_unique_ids(&bundle.patterns)?;
        Ok(bundle)
    }

    /// The exact bytes the signature covers.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&BundlePayload {
            format_version: self.format_version,
            scope: &self.scope,
            source_instance: self.source_instance,
            patterns: &self.patterns,
        })?)
    }

    /// Verify the signature over the reconstructed payload.
    pub fn verify(&self, signer: &Signer) -> Result<()> {
        signer.verify(&self.payload_bytes()?, &self.signature)
    }

    /// Check the format version against the supported window.
    /// Ok(None) for current, Ok(Some(warning)) for older-but-readable,
    /// Err for newer than this build understands.
    pub fn check_version(&self) -> Result<Option<String>> {
        if self.format_version > CURRENT_FORMAT_VERSION
            || self.format_version < MIN_SUPPORTED_FORMAT_VERSION
        {
            return Err(Error::Version {
                found: self.format_version,
                min_supported: MIN_SUPPORTED_FORMAT_VERSION,
                current: CURRENT_FORMAT_VERSION,
            });
        }
        if self.format_version < CURRENT_FORMAT_VERSION {
            return Ok(Some(format!(
                "bundle uses older format version {} (current is {})",
                self.format_version, CURRENT_FORMAT_VERSION
            )));
        }
        Ok(None)
    }
}

fn check_unique_ids(patterns: &[PatternSnapshot]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for snapshot in patterns {
        if !seen.insert(&snapshot.id) {
            return Err(Error::DuplicateId {
                id: snapshot.id.to_string(),
            });
        }
    }
    Ok(())
}
