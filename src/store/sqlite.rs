//! SQLite-based persistent storage for patterns.
//!
//! One store instance has a single logical owner; all operations are
//! synchronous. The connection sits behind a mutex acquired with a bounded
//! wait, so contention surfaces as [`Error::StoreBusy`] instead of a
//! deadlock.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pattern::{Confidence, Pattern, PatternContent, PatternId, PatternType, SourceScope};

use super::StoreConfig;

/// SQLite-backed pattern store.
pub struct SqlitePatternStore {
    conn: Mutex<Connection>,
    busy_timeout: Duration,
    instance_id: Uuid,
}

impl SqlitePatternStore {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        Self::init_schema(&conn)?;
        let instance_id = Self::load_or_create_instance_id(&conn)?;
        debug!("opened pattern store at {} ({})", path.display(), instance_id);

        Ok(Self {
            conn: Mutex::new(conn),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            instance_id,
        })
    }

    /// Open with the configured database path.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(config.database_path.clone(), config)
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Main patterns table
            CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                pattern_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                metadata TEXT NOT NULL,
                namespaces TEXT NOT NULL,
                source_scope TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One row per (pattern, namespace) for scoped scans
            CREATE TABLE IF NOT EXISTS pattern_namespaces (
                pattern_id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                PRIMARY KEY (pattern_id, namespace),
                FOREIGN KEY (pattern_id) REFERENCES patterns(id) ON DELETE CASCADE
            );

            -- Store metadata (instance identity, schema version)
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_type ON patterns(pattern_type);
            CREATE INDEX IF NOT EXISTS idx_patterns_updated ON patterns(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_namespaces_ns ON pattern_namespaces(namespace);
        "#,
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('schema_version', '1')",
            [],
        )?;

        Ok(())
    }

    fn load_or_create_instance_id(conn: &Connection) -> Result<Uuid> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'instance_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(s) => Uuid::parse_str(&s)
                .map_err(|e| Error::Internal(format!("corrupt instance_id in store_meta: {}", e))),
            None => {
                let id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('instance_id', ?1)",
                    params![id.to_string()],
                )?;
                info!("initialized pattern store instance {}", id);
                Ok(id)
            }
        }
    }

    /// This store's stable instance identity (recorded in exported bundles).
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Acquire the connection with a bounded wait.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        let deadline = Instant::now() + self.busy_timeout;
        loop {
            match self.conn.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(Error::StoreBusy {
                            waited_ms: self.busy_timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(Error::Internal("store lock poisoned".to_string()));
                }
            }
        }
    }

    /// Look up a pattern by id.
    pub fn get(&self, id: &PatternId) -> Result<Option<Pattern>> {
        let conn = self.conn()?;
        Self::get_in(&conn, id)
    }

    fn get_in(conn: &Connection, id: &PatternId) -> Result<Option<Pattern>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, pattern_type, confidence, metadata, namespaces, source_scope,
                    created_at, updated_at
             FROM patterns WHERE id = ?1",
        )?;

        let pattern = stmt
            .query_row(params![id.0], Self::row_to_pattern)
            .optional()?;

        Ok(pattern)
    }

    /// Upsert by id. When the id already exists the write reinforces the
    /// stored pattern: confidence combines via [`Confidence::reinforce`],
    /// metadata extras and namespaces union, and `updated_at` refreshes.
    /// Returns the committed pattern.
    pub fn put(&self, pattern: Pattern) -> Result<Pattern> {
        if pattern.namespaces.is_empty() {
            return Err(Error::EmptyNamespaces {
                id: pattern.id.to_string(),
            });
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let committed = match Self::get_in(&tx, &pattern.id)? {
            Some(mut existing) => {
                existing.confidence = existing.confidence.reinforce(pattern.confidence);
                existing.content.absorb_extra(&pattern.content);
                existing.namespaces.extend(pattern.namespaces.iter().cloned());
                existing.updated_at = Utc::now();
                existing
            }
            None => pattern,
        };

        Self::write_in(&tx, &committed)?;
        tx.commit()?;

        debug!("committed pattern {}", committed.id);
        Ok(committed)
    }

    /// Patterns whose namespace set contains exactly `namespace`, by id.
    /// Each call re-runs the query, so the scan is finite and restartable.
    pub fn scan_namespace(&self, namespace: &str) -> Result<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT p.id, p.pattern_type, p.confidence, p.metadata, p.namespaces,
                    p.source_scope, p.created_at, p.updated_at
             FROM patterns p
             JOIN pattern_namespaces pn ON p.id = pn.pattern_id
             WHERE pn.namespace = ?1
             ORDER BY p.id",
        )?;

        let patterns = stmt
            .query_map(params![namespace], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    /// Patterns with at least one namespace starting with `prefix`, by id.
    pub fn scan_prefix(&self, prefix: &str) -> Result<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT p.id, p.pattern_type, p.confidence, p.metadata, p.namespaces,
                    p.source_scope, p.created_at, p.updated_at
             FROM patterns p
             JOIN pattern_namespaces pn ON p.id = pn.pattern_id
             WHERE substr(pn.namespace, 1, length(?1)) = ?1
             ORDER BY p.id",
        )?;

        let patterns = stmt
            .query_map(params![prefix], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    /// Every pattern in the store, by id.
    pub fn scan_all(&self) -> Result<Vec<Pattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, pattern_type, confidence, metadata, namespaces, source_scope,
                    created_at, updated_at
             FROM patterns
             ORDER BY id",
        )?;

        let patterns = stmt
            .query_map([], Self::row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    /// Delete a pattern. Internal rollback use only; never called by import.
    pub fn delete(&self, id: &PatternId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM patterns WHERE id = ?1", params![id.0])?;
        conn.execute(
            "DELETE FROM pattern_namespaces WHERE pattern_id = ?1",
            params![id.0],
        )?;
        Ok(())
    }

    /// Commit a merge result as one transaction: every pattern in the batch
    /// commits, or none do. Merge writes are exact; the reinforcement rule
    /// in [`Self::put`] does not apply here.
    pub fn apply_merge(&self, resolved: &[Pattern]) -> Result<()> {
        if resolved.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for pattern in resolved {
            if pattern.namespaces.is_empty() {
                return Err(Error::EmptyNamespaces {
                    id: pattern.id.to_string(),
                });
            }
            Self::write_in(&tx, pattern)?;
        }
        tx.commit()?;

        info!("merge committed: {} patterns written", resolved.len());
        Ok(())
    }

    /// Get store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?;

        let mut by_type = Vec::new();
        let mut stmt = conn.prepare_cached(
            "SELECT pattern_type, COUNT(*) FROM patterns GROUP BY pattern_type ORDER BY pattern_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (ty, count) = row?;
            by_type.push((ty, count as usize));
        }

        let local: i64 = conn.query_row(
            "SELECT COUNT(*) FROM patterns WHERE source_scope = 'local'",
            [],
            |row| row.get(0),
        )?;

        let namespaces: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT namespace) FROM pattern_namespaces",
            [],
            |row| row.get(0),
        )?;

        let newest: Option<String> = conn
            .query_row("SELECT MAX(updated_at) FROM patterns", [], |row| row.get(0))
            .ok()
            .flatten();

        Ok(StoreStats {
            total_patterns: total as usize,
            by_type,
            local_patterns: local as usize,
            imported_patterns: (total - local) as usize,
            namespace_count: namespaces as usize,
            newest_update: newest,
        })
    }

    // --- Row mapping ---

    fn write_in(tx: &Transaction<'_>, pattern: &Pattern) -> Result<()> {
        let metadata_json = pattern.content.metadata_value()?.to_string();
        let namespaces_json = serde_json::to_string(&pattern.namespaces)?;

        tx.execute(
            r#"INSERT OR REPLACE INTO patterns
               (id, pattern_type, confidence, metadata, namespaces, source_scope,
                created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                pattern.id.0,
                pattern.pattern_type().as_str(),
                pattern.confidence.value(),
                metadata_json,
                namespaces_json,
                pattern.source_scope.as_str(),
                pattern.created_at.to_rfc3339(),
                pattern.updated_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "DELETE FROM pattern_namespaces WHERE pattern_id = ?1",
            params![pattern.id.0],
        )?;
        for namespace in &pattern.namespaces {
            tx.execute(
                "INSERT INTO pattern_namespaces (pattern_id, namespace) VALUES (?1, ?2)",
                params![pattern.id.0, namespace],
            )?;
        }

        Ok(())
    }

    fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
        let id: String = row.get(0)?;
        let type_str: String = row.get(1)?;
        let confidence: f64 = row.get(2)?;
        let metadata_json: String = row.get(3)?;
        let namespaces_json: String = row.get(4)?;
        let scope_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        let pattern_type = PatternType::parse(&type_str).ok_or_else(|| {
            conversion_error(1, Error::Internal(format!("unknown pattern type: {}", type_str)))
        })?;

        let metadata: serde_json::Value = serde_json::from_str(&metadata_json)
            .map_err(|e| conversion_error(3, Error::Json(e)))?;
        let content = PatternContent::from_parts(pattern_type, metadata)
            .map_err(|e| conversion_error(3, e))?;

        let namespaces: BTreeSet<String> = serde_json::from_str(&namespaces_json)
            .map_err(|e| conversion_error(4, Error::Json(e)))?;

        let source_scope = SourceScope::parse(&scope_str).ok_or_else(|| {
            conversion_error(5, Error::Internal(format!("unknown source scope: {}", scope_str)))
        })?;

        Ok(Pattern {
            id: PatternId(id),
            content,
            confidence: Confidence::new(confidence),
            namespaces,
            source_scope,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

fn conversion_error(column: usize, source: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(source))
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Pattern store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_patterns: usize,
    pub by_type: Vec<(String, usize)>,
    pub local_patterns: usize,
    pub imported_patterns: usize,
    pub namespace_count: usize,
    pub newest_update: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{ProblemSolutionContent, WorkflowContent};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> SqlitePatternStore {
        let config = StoreConfig {
            database_path: dir.path().join("test.db"),
            busy_timeout_ms: 500,
        };
        SqlitePatternStore::from_config(&config).unwrap()
    }

    fn workflow_pattern(name: &str, confidence: f64, ns: &str) -> Pattern {
        Pattern::new(
            PatternContent::Workflow(WorkflowContent {
                name: name.to_string(),
                steps: vec!["red".to_string(), "green".to_string()],
                trigger: None,
                extra: BTreeMap::new(),
            }),
            confidence,
            [ns.to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let pattern = workflow_pattern("tdd loop", 0.6, "workspace.tdd");
        let committed = store.put(pattern.clone()).unwrap();

        let loaded = store.get(&committed.id).unwrap().unwrap();
        assert_eq!(loaded.id, pattern.id);
        assert_eq!(loaded.confidence.value(), 0.6);
        assert_eq!(loaded.content, pattern.content);
        assert!(loaded.in_namespace("workspace.tdd"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        assert!(store.get(&PatternId("pat-nope".to_string())).unwrap().is_none());
    }

    #[test]
    fn test_put_reinforces_existing() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.put(workflow_pattern("tdd loop", 0.5, "workspace.tdd")).unwrap();
        let committed = store
            .put(workflow_pattern("tdd loop", 0.5, "workspace.ci"))
            .unwrap();

        // 0.5 + 0.5 - 0.25 = 0.75, namespaces unioned
        assert!((committed.confidence.value() - 0.75).abs() < 1e-9);
        assert!(committed.in_namespace("workspace.tdd"));
        assert!(committed.in_namespace("workspace.ci"));

        let loaded = store.get(&committed.id).unwrap().unwrap();
        assert!((loaded.confidence.value() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_scan_namespace_exact() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.put(workflow_pattern("a", 0.5, "workspace.tdd")).unwrap();
        store.put(workflow_pattern("b", 0.5, "workspace.tdd")).unwrap();
        store.put(workflow_pattern("c", 0.5, "team.shared")).unwrap();

        let scanned = store.scan_namespace("workspace.tdd").unwrap();
        assert_eq!(scanned.len(), 2);
        // Ordered by id
        assert!(scanned[0].id <= scanned[1].id);

        // Exact membership, not prefix
        assert!(store.scan_namespace("workspace").unwrap().is_empty());
    }

    #[test]
    fn test_scan_prefix() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.put(workflow_pattern("a", 0.5, "workspace.tdd")).unwrap();
        store.put(workflow_pattern("b", 0.5, "workspace.ci")).unwrap();
        store.put(workflow_pattern("c", 0.5, "team.shared")).unwrap();

        assert_eq!(store.scan_prefix("workspace.").unwrap().len(), 2);
        assert_eq!(store.scan_all().unwrap().len(), 3);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let committed = store.put(workflow_pattern("a", 0.5, "workspace.tdd")).unwrap();
        store.delete(&committed.id).unwrap();
        assert!(store.get(&committed.id).unwrap().is_none());
        assert!(store.scan_namespace("workspace.tdd").unwrap().is_empty());
    }

    #[test]
    fn test_apply_merge_writes_exact_values() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let mut pattern = workflow_pattern("a", 0.5, "workspace.tdd");
        store.put(pattern.clone()).unwrap();

        // A merge write must not reinforce; it stores the exact value.
        pattern.confidence = Confidence::new(0.9);
        store.apply_merge(std::slice::from_ref(&pattern)).unwrap();

        let loaded = store.get(&pattern.id).unwrap().unwrap();
        assert_eq!(loaded.confidence.value(), 0.9);
    }

    #[test]
    fn test_instance_id_is_stable() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            database_path: dir.path().join("test.db"),
            busy_timeout_ms: 500,
        };

        let first = SqlitePatternStore::from_config(&config).unwrap().instance_id();
        let second = SqlitePatternStore::from_config(&config).unwrap().instance_id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_patterns, 0);

        store.put(workflow_pattern("a", 0.5, "workspace.tdd")).unwrap();
        let p = Pattern::new(
            PatternContent::ProblemSolution(ProblemSolutionContent {
                problem: "slow ci".to_string(),
                solution: "cache deps".to_string(),
                caveats: vec![],
                extra: BTreeMap::new(),
            }),
            0.7,
            ["workspace.ci".to_string()],
        )
        .unwrap();
        store.put(p).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_patterns, 2);
        assert_eq!(stats.local_patterns, 2);
        assert_eq!(stats.imported_patterns, 0);
        assert_eq!(stats.namespace_count, 2);
        assert!(stats.newest_update.is_some());
    }
}
