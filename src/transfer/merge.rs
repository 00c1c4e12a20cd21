//! Deterministic merge of imported patterns into the local set.
//!
//! Matching is by content-addressed id, so a type+content collision between
//! two instances is an intentional merge, never an accident. Every resolved
//! pattern is recorded in the [`MergeReport`] with the decision and reason,
//! for both dry-run preview and post-commit audit.

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use crate::pattern::{Pattern, PatternId, SourceScope};

/// Conflict-resolution policy applied during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Higher confidence wins; local wins exact ties; metadata unions.
    Auto,
    /// The imported pattern unconditionally overwrites the local one.
    Replace,
    /// The imported pattern is ignored whenever a local match exists.
    KeepLocal,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Auto => "auto",
            MergeStrategy::Replace => "replace",
            MergeStrategy::KeepLocal => "keep_local",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(MergeStrategy::Auto),
            "replace" => Some(MergeStrategy::Replace),
            "keep_local" | "keep-local" => Some(MergeStrategy::KeepLocal),
            _ => None,
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The decision taken for one imported pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    /// No local match; the imported pattern was inserted unchanged.
    Inserted,
    /// The local pattern was updated with the merge result.
    Updated,
    /// The imported pattern overwrote the local one (`replace`).
    Replaced,
    /// A local match exists and the import was ignored (`keep_local`).
    SkippedKeptLocal,
    /// The local pattern already subsumes the import; nothing written.
    Unchanged,
}

impl MergeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeAction::Inserted => "inserted",
            MergeAction::Updated => "updated",
            MergeAction::Replaced => "replaced",
            MergeAction::SkippedKeptLocal => "skipped_kept_local",
            MergeAction::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for MergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the merge audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct MergeEntry {
    pub id: PatternId,
    pub action: MergeAction,
    pub reason: String,
    pub local_confidence: Option<f64>,
    pub imported_confidence: f64,
    pub resulting_confidence: Option<f64>,
}

/// Full account of an import: one entry per pattern in the bundle.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub strategy: MergeStrategy,
    pub dry_run: bool,
    pub bundle_format_version: u32,
    pub compatibility_warning: Option<String>,
    pub entries: Vec<MergeEntry>,
}

impl MergeReport {
    pub fn new(
        strategy: MergeStrategy,
        dry_run: bool,
        bundle_format_version: u32,
        compatibility_warning: Option<String>,
    ) -> Self {
        Self {
            strategy,
            dry_run,
            bundle_format_version,
            compatibility_warning,
            entries: Vec::new(),
        }
    }

    pub fn count(&self, action: MergeAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    pub fn inserted(&self) -> usize {
        self.count(MergeAction::Inserted)
    }

    pub fn updated(&self) -> usize {
        self.count(MergeAction::Updated) + self.count(MergeAction::Replaced)
    }

    pub fn skipped(&self) -> usize {
        self.count(MergeAction::SkippedKeptLocal) + self.count(MergeAction::Unchanged)
    }
}

/// Outcome of resolving one imported pattern: the audit entry, plus the
/// pattern to write (None when the store should not be touched).
pub(crate) struct Resolution {
    pub entry: MergeEntry,
    pub write: Option<Pattern>,
}

/// Resolve one imported pattern against its local counterpart.
pub(crate) fn resolve(
    local: Option<&Pattern>,
    imported: &Pattern,
    strategy: MergeStrategy,
) -> Resolution {
    let local = match local {
        None => {
            return Resolution {
                entry: MergeEntry {
                    id: imported.id.clone(),
                    action: MergeAction::Inserted,
                    reason: "no local match".to_string(),
                    local_confidence: None,
                    imported_confidence: imported.confidence.value(),
                    resulting_confidence: Some(imported.confidence.value()),
                },
                write: Some(imported.clone()),
            };
        }
        Some(local) => local,
    };

    match strategy {
        MergeStrategy::KeepLocal => Resolution {
            entry: MergeEntry {
                id: imported.id.clone(),
                action: MergeAction::SkippedKeptLocal,
                reason: "local pattern kept, import ignored".to_string(),
                local_confidence: Some(local.confidence.value()),
                imported_confidence: imported.confidence.value(),
                resulting_confidence: Some(local.confidence.value()),
            },
            write: None,
        },
        MergeStrategy::Replace => {
            let mut result = imported.clone();
            result.updated_at = Utc::now();
            Resolution {
                entry: MergeEntry {
                    id: imported.id.clone(),
                    action: MergeAction::Replaced,
                    reason: "imported pattern overwrites local".to_string(),
                    local_confidence: Some(local.confidence.value()),
                    imported_confidence: imported.confidence.value(),
                    resulting_confidence: Some(imported.confidence.value()),
                },
                write: Some(result),
            }
        }
        MergeStrategy::Auto => resolve_auto(local, imported),
    }
}

fn resolve_auto(local: &Pattern, imported: &Pattern) -> Resolution {
    let local_conf = local.confidence.value();
    let imported_conf = imported.confidence.value();

    // Higher confidence wins; the local side wins exact ties, since it has
    // survived local validation longest.
    let imported_wins = imported_conf > local_conf;
    let (winner, loser) = if imported_wins {
        (imported, local)
    } else {
        (local, imported)
    };

    let mut result = winner.clone();
    let extra_added = result.content.absorb_extra(&loser.content);
    let new_namespaces = loser
        .namespaces
        .iter()
        .any(|ns| !result.namespaces.contains(ns));
    result
        .namespaces
        .extend(loser.namespaces.iter().cloned());
    // max, never averaged: a low-confidence import must not erode local trust
    result.confidence = local.confidence.max(imported.confidence);

    if !imported_wins && !extra_added && !new_namespaces {
        return Resolution {
            entry: MergeEntry {
                id: imported.id.clone(),
                action: MergeAction::Unchanged,
                reason: "local pattern already subsumes import".to_string(),
                local_confidence: Some(local_conf),
                imported_confidence: imported_conf,
                resulting_confidence: Some(local_conf),
            },
            write: None,
        };
    }

    result.updated_at = Utc::now();
    let reason = if imported_wins {
        result.source_scope = SourceScope::Imported;
        format!(
            "imported confidence {:.2} beats local {:.2}",
            imported_conf, local_conf
        )
    } else if local_conf == imported_conf {
        "local wins exact tie, absorbed imported knowledge".to_string()
    } else {
        format!(
            "local confidence {:.2} beats imported {:.2}, absorbed imported knowledge",
            local_conf, imported_conf
        )
    };

    Resolution {
        entry: MergeEntry {
            id: imported.id.clone(),
            action: MergeAction::Updated,
            reason,
            local_confidence: Some(local_conf),
            imported_confidence: imported_conf,
            resulting_confidence: Some(result.confidence.value()),
        },
        write: Some(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, PatternContent, WorkflowContent};
    use std::collections::BTreeMap;

    fn pattern(confidence: f64, ns: &str) -> Pattern {
        Pattern::new(
            PatternContent::Workflow(WorkflowContent {
                name: "review loop".to_string(),
                steps: vec!["draft".to_string(), "review".to_string()],
                trigger: None,
                extra: BTreeMap::new(),
            }),
            confidence,
            [ns.to_string()],
        )
        .unwrap()
    }

    fn with_extra(mut p: Pattern, key: &str, value: &str) -> Pattern {
        if let PatternContent::Workflow(w) = &mut p.content {
            w.extra.insert(key.to_string(), serde_json::json!(value));
        }
        p
    }

    #[test]
    fn test_no_local_match_inserts() {
        let imported = pattern(0.4, "workspace.flow");
        let resolution = resolve(None, &imported, MergeStrategy::Auto);
        assert_eq!(resolution.entry.action, MergeAction::Inserted);
        assert!(resolution.write.is_some());
    }

    #[test]
    fn test_auto_higher_import_wins() {
        let local = pattern(0.6, "workspace.flow");
        let imported = pattern(0.9, "workspace.flow");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::Auto);

        assert_eq!(resolution.entry.action, MergeAction::Updated);
        let written = resolution.write.unwrap();
        assert_eq!(written.confidence.value(), 0.9);
        assert_eq!(written.source_scope, SourceScope::Imported);
    }

    #[test]
    fn test_auto_tie_keeps_local() {
        let local = with_extra(pattern(0.6, "workspace.flow"), "k", "local");
        let imported = pattern(0.6, "workspace.flow");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::Auto);

        // Same confidence, import adds nothing: no write at all
        assert_eq!(resolution.entry.action, MergeAction::Unchanged);
        assert!(resolution.write.is_none());
    }

    #[test]
    fn test_auto_merges_losing_metadata() {
        let local = pattern(0.8, "workspace.flow");
        let imported = with_extra(pattern(0.3, "workspace.flow"), "seen_by", "peer");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::Auto);

        assert_eq!(resolution.entry.action, MergeAction::Updated);
        let written = resolution.write.unwrap();
        // Winner keeps its confidence, absorbs the loser's extra keys
        assert_eq!(written.confidence.value(), 0.8);
        assert_eq!(written.source_scope, SourceScope::Local);
        assert_eq!(
            written.content.extra().get("seen_by"),
            Some(&serde_json::json!("peer"))
        );
    }

    #[test]
    fn test_auto_unions_namespaces() {
        let local = pattern(0.8, "workspace.flow");
        let imported = pattern(0.3, "team.shared");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::Auto);

        let written = resolution.write.unwrap();
        assert!(written.in_namespace("workspace.flow"));
        assert!(written.in_namespace("team.shared"));
    }

    #[test]
    fn test_replace_ignores_confidence() {
        let local = pattern(0.9, "workspace.flow");
        let imported = with_extra(pattern(0.1, "team.shared"), "k", "import");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::Replace);

        assert_eq!(resolution.entry.action, MergeAction::Replaced);
        let written = resolution.write.unwrap();
        assert_eq!(written.confidence.value(), 0.1);
        assert!(!written.in_namespace("workspace.flow"));
    }

    #[test]
    fn test_keep_local_never_writes() {
        let local = pattern(0.1, "workspace.flow");
        let imported = pattern(0.9, "team.shared");
        let resolution = resolve(Some(&local), &imported, MergeStrategy::KeepLocal);

        assert_eq!(resolution.entry.action, MergeAction::SkippedKeptLocal);
        assert!(resolution.write.is_none());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(MergeStrategy::parse("auto"), Some(MergeStrategy::Auto));
        assert_eq!(MergeStrategy::parse("keep-local"), Some(MergeStrategy::KeepLocal));
        assert_eq!(MergeStrategy::parse("bogus"), None);
    }
}
