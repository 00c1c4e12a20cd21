//! CLI interface for patternbank
//!
//! Thin wrapper over the library: owns bundle file I/O and report display,
//! nothing else.

use clap::{Parser, Subcommand};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Error;
use crate::pattern::PatternId;
use crate::store::SqlitePatternStore;
use crate::transfer::{
    ExportScope, Exporter, Importer, MergeReport, MergeStrategy, PatternSnapshot, Signer,
};

#[derive(Parser)]
#[command(name = "patternbank")]
#[command(about = "Knowledge pattern store with signed cross-instance transfer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export patterns to a signed bundle file
    Export {
        /// Scope: "workspace" or "all" (ignored when --namespace is given)
        #[arg(short, long, default_value = "workspace")]
        scope: String,
        /// Export a single namespace instead
        #[arg(short, long)]
        namespace: Option<String>,
        /// Output bundle path
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Import a bundle file into the local store
    Import {
        /// Bundle file path
        file: PathBuf,
        /// Merge strategy: auto, replace, keep-local
        #[arg(short, long, default_value = "auto")]
        strategy: String,
        /// Preview the merge without committing
        #[arg(long)]
        dry_run: bool,
    },
    /// List patterns, optionally filtered by namespace
    List {
        /// Exact namespace to list
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Show a single pattern by id
    Show {
        /// Pattern id (pat-...)
        id: String,
    },
    /// Show store statistics
    Stats,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let store = SqlitePatternStore::from_config(&config.store)
        .context("Failed to open pattern store")?;
    let signer = Signer::from_secret(config.transfer.signing_secret.as_deref());

    match cli.command {
        Commands::Export {
            scope,
            namespace,
            out,
        } => {
            let scope = parse_scope(&scope, namespace)?;
            let exporter = Exporter::new(&store, signer, config.workspace.namespace_prefix);

            match exporter.export(&scope) {
                Ok(bytes) => {
                    std::fs::write(&out, &bytes)
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    println!("✓ Exported scope {} to {}", scope, out.display());
                }
                Err(Error::EmptyScope { scope }) => {
                    println!("⚠ Scope {} matched no patterns; nothing exported", scope);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Import {
            file,
            strategy,
            dry_run,
        } => {
            let strategy = MergeStrategy::parse(&strategy)
                .ok_or_else(|| anyhow!("Unknown merge strategy: {}", strategy))?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let importer = Importer::new(&store, signer);
            let report = importer.import(&bytes, strategy, dry_run)?;
            print_report(&report);
        }

        Commands::List { namespace } => {
            let patterns = match namespace {
                Some(ns) => store.scan_namespace(&ns)?,
                None => store.scan_all()?,
            };

            if patterns.is_empty() {
                println!("No patterns found.");
            }
            for pattern in patterns {
                println!(
                    "{}  {:<22}  conf {}  [{}]",
                    pattern.id,
                    pattern.pattern_type().as_str(),
                    pattern.confidence,
                    pattern
                        .namespaces
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }

        Commands::Show { id } => {
            let id = PatternId(id);
            match store.get(&id)? {
                Some(pattern) => {
                    let snapshot = PatternSnapshot::from_pattern(&pattern)?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                    println!("source: {}", pattern.source_scope);
                }
                None => println!("Pattern not found: {}", id),
            }
        }

        Commands::Stats => {
            let stats = store.stats()?;
            println!("Patterns:   {}", stats.total_patterns);
            for (pattern_type, count) in &stats.by_type {
                println!("  {:<22} {}", pattern_type, count);
            }
            println!("Local:      {}", stats.local_patterns);
            println!("Imported:   {}", stats.imported_patterns);
            println!("Namespaces: {}", stats.namespace_count);
            if let Some(newest) = &stats.newest_update {
                println!("Updated:    {}", newest);
            }
            println!("Instance:   {}", store.instance_id());
        }
    }

    Ok(())
}

fn parse_scope(scope: &str, namespace: Option<String>) -> Result<ExportScope> {
    if let Some(namespace) = namespace {
        return Ok(ExportScope::Namespace { namespace });
    }
    match scope {
        "workspace" => Ok(ExportScope::Workspace),
        "all" => Ok(ExportScope::All),
        other => Err(anyhow!(
            "Unknown scope: {} (expected \"workspace\", \"all\", or --namespace)",
            other
        )),
    }
}

fn print_report(report: &MergeReport) {
    let mode = if report.dry_run { "Dry-run" } else { "Import" };
    println!(
        "{} ({} strategy, bundle format v{})",
        mode, report.strategy, report.bundle_format_version
    );
    if let Some(warning) = &report.compatibility_warning {
        println!("⚠ {}", warning);
    }

    for entry in &report.entries {
        let confidences = match entry.local_confidence {
            Some(local) => format!(
                "local {:.2} / imported {:.2}",
                local, entry.imported_confidence
            ),
            None => format!("imported {:.2}", entry.imported_confidence),
        };
        println!(
            "  {:<18} {}  ({}; {})",
            entry.action.to_string(),
            entry.id,
            entry.reason,
            confidences
        );
    }

    println!(
        "{} inserted, {} updated, {} skipped{}",
        report.inserted(),
        report.updated(),
        report.skipped(),
        if report.dry_run {
            " (nothing committed)"
        } else {
            ""
        }
    );
}
