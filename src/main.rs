//! # Foundkeep CLI (`fnd`)
//!
//! The `fnd` binary is the operational frontend for the classification
//! and placement engine. It drives category suggestion, vector
//! precompute, batch registration, and the dwell-period relocation batch
//! over JSON files — the file in/out stands in for the external
//! persistence collaborator.
//!
//! ## Usage
//!
//! ```bash
//! fnd --config ./config/fnd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fnd categories` | List taxonomy entries and their vector status |
//! | `fnd precompute` | Build/refresh the category vector cache |
//! | `fnd suggest "<text>"` | Rank category suggestions for a description |
//! | `fnd register --input <file>` | Issue ids and slots for a batch of items |
//! | `fnd relocate --items <file>` | Move items past the dwell period to long-term slots |
//!
//! ## Examples
//!
//! ```bash
//! # Rank categories for a description
//! fnd suggest "黒い折り畳み傘" --top 3
//!
//! # Register a batch of accepted items
//! fnd register --input ./requests.json --output ./items.json
//!
//! # Run the relocation batch as of today
//! fnd relocate --items ./items.json
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foundkeep::config::{self, Config};
use foundkeep::counter::FileCounterStore;
use foundkeep::embedding;
use foundkeep::matcher::{EmbeddingStrategy, Matcher};
use foundkeep::models::{ClassificationQuery, Item, RankMode};
use foundkeep::precompute;
use foundkeep::register::{self, Registrar};
use foundkeep::relocate::{relocate, RelocationPolicy};
use foundkeep::taxonomy::Taxonomy;

/// Foundkeep CLI — classification and storage placement for
/// lost-and-found item registration.
#[derive(Parser)]
#[command(
    name = "fnd",
    about = "Foundkeep — classification and storage placement engine for lost-and-found items",
    version,
    long_about = "Foundkeep ranks found-item descriptions against a category taxonomy \
    (embedding similarity with keyword fallback), issues deterministic yy-mm-dd-h-nn item \
    identifiers, assigns storage slots by priority rules, and relocates items to long-term \
    storage after the dwell period."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fnd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List taxonomy entries and their vector status.
    Categories,

    /// Build or refresh the category vector cache.
    ///
    /// Embeds every category's canonical keyword text with the
    /// configured provider. Entries whose keyword text is unchanged are
    /// reused from the existing cache.
    Precompute {
        /// Re-embed everything, ignoring the existing cache.
        #[arg(long)]
        force: bool,
    },

    /// Rank category suggestions for an item description.
    Suggest {
        /// Free-text description (typically the feature text).
        text: String,

        /// Item name, if separate from the description.
        #[arg(long)]
        name: Option<String>,

        /// Item color.
        #[arg(long)]
        color: Option<String>,

        /// Maximum number of suggestions to print.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Issue ids and storage slots for a batch of accepted items.
    ///
    /// Reads a JSON array of registration requests, assigns each an
    /// item id and a storage location, and appends the finished records
    /// to the output file.
    Register {
        /// JSON file holding an array of registration requests.
        #[arg(long)]
        input: PathBuf,

        /// JSON file the finished item records are appended to.
        /// Prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Compute ids and slots but write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Move items past the dwell period to long-term storage.
    ///
    /// Reads a JSON array of item records, rewrites the locations of
    /// eligible items in place, and prints a report. Safe to re-run:
    /// items already in long-term form are skipped.
    Relocate {
        /// JSON file holding the item records.
        #[arg(long)]
        items: PathBuf,

        /// Batch cutoff date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Print the report without rewriting the file.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Categories => run_categories(&cfg)?,
        Commands::Precompute { force } => precompute::run_precompute(&cfg, force).await?,
        Commands::Suggest {
            text,
            name,
            color,
            top,
        } => run_suggest(&cfg, &text, name, color, top).await?,
        Commands::Register {
            input,
            output,
            dry_run,
        } => run_register(&cfg, &input, output.as_deref(), dry_run)?,
        Commands::Relocate {
            items,
            as_of,
            dry_run,
        } => run_relocate(&cfg, &items, as_of.as_deref(), dry_run)?,
    }

    Ok(())
}

fn run_categories(cfg: &Config) -> Result<()> {
    let mut taxonomy = Taxonomy::load(&cfg.taxonomy.path)?;

    if cfg.embedding.is_enabled() {
        if let Ok(provider) = embedding::create_provider(&cfg.embedding) {
            precompute::attach_cached_vectors(&mut taxonomy, cfg, provider.as_ref())?;
        }
    }

    println!("{} categories:", taxonomy.len());
    for cat in taxonomy.categories() {
        let vec_status = if cat.embedding.is_some() { "vec" } else { "  -" };
        println!(
            "  [{}] {} / {}  ({} keywords)",
            vec_status,
            cat.large_label,
            cat.medium_label,
            cat.keywords.len()
        );
    }
    println!(
        "{} of {} categories have vectors.",
        taxonomy.embedded_count(),
        taxonomy.len()
    );
    Ok(())
}

async fn run_suggest(
    cfg: &Config,
    text: &str,
    name: Option<String>,
    color: Option<String>,
    top: Option<usize>,
) -> Result<()> {
    let mut taxonomy = Taxonomy::load(&cfg.taxonomy.path)?;

    let matcher = if cfg.embedding.is_enabled() {
        match embedding::create_provider(&cfg.embedding) {
            Ok(provider) => {
                let applied =
                    precompute::attach_cached_vectors(&mut taxonomy, cfg, provider.as_ref())?;
                if applied < taxonomy.len() {
                    eprintln!(
                        "Warning: {} of {} categories lack cached vectors; run `fnd precompute`",
                        taxonomy.len() - applied,
                        taxonomy.len()
                    );
                }
                Matcher::with_embedding(EmbeddingStrategy::new(
                    provider,
                    std::time::Duration::from_secs(cfg.embedding.timeout_secs),
                ))
            }
            Err(e) => {
                eprintln!(
                    "Warning: embedding provider unavailable, keyword matching only: {}",
                    e
                );
                Matcher::keyword_only()
            }
        }
    } else {
        Matcher::keyword_only()
    };

    let query = ClassificationQuery {
        name: name.unwrap_or_default(),
        features: text.to_string(),
        color: color.unwrap_or_default(),
        ..Default::default()
    };

    let top_n = top.unwrap_or(cfg.matcher.top_n);
    let (suggestions, mode) = matcher.suggest(&taxonomy, &query, top_n).await?;

    if suggestions.is_empty() {
        println!("No matching categories.");
        return Ok(());
    }

    let mode_label = match mode {
        RankMode::Embedding => "embedding",
        RankMode::Keyword => "keyword",
    };
    println!("Top {} suggestions ({} ranking):", suggestions.len(), mode_label);
    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "  {}. {} / {}  ({}%)",
            i + 1,
            s.large_label,
            s.medium_label,
            s.confidence_pct()
        );
    }
    Ok(())
}

fn run_register(
    cfg: &Config,
    input: &Path,
    output: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read requests: {}", input.display()))?;
    let requests = register::parse_requests(&content)?;

    let counters = Arc::new(FileCounterStore::open(&cfg.counters.state_path)?);
    let registrar = Registrar::new(&cfg.storage, counters);

    let mut items: Vec<Item> = Vec::with_capacity(requests.len());
    for req in &requests {
        let outcome = registrar.register(req)?;
        if outcome.clock_skew {
            eprintln!(
                "Warning: acceptance time regressed for facility {}; issued {} under the latest hour",
                req.facility_id, outcome.item.item_id
            );
        }
        println!(
            "{}  {} / {}  -> {}  [{}]",
            outcome.item.item_id,
            outcome.item.category_large,
            outcome.item.category_medium,
            outcome.item.storage_location,
            outcome.slot_rule
        );
        items.push(outcome.item);
    }

    if dry_run {
        println!("Dry run: {} items not written.", items.len());
        return Ok(());
    }

    match output {
        Some(path) => {
            let mut all: Vec<Item> = if path.exists() {
                let existing = std::fs::read_to_string(path)?;
                serde_json::from_str(&existing)
                    .with_context(|| format!("Failed to parse existing items: {}", path.display()))?
            } else {
                Vec::new()
            };
            all.extend(items.iter().cloned());
            std::fs::write(path, serde_json::to_string_pretty(&all)?)?;
            println!("Appended {} items to {}.", items.len(), path.display());
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}

fn run_relocate(cfg: &Config, items_path: &Path, as_of: Option<&str>, dry_run: bool) -> Result<()> {
    let content = std::fs::read_to_string(items_path)
        .with_context(|| format!("Failed to read items: {}", items_path.display()))?;
    let mut items: Vec<Item> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse items: {}", items_path.display()))?;

    let as_of: NaiveDateTime = match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --as-of date: {}", s))?
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        None => chrono::Local::now().naive_local(),
    };

    let policy = RelocationPolicy {
        dwell_days: cfg.relocation.dwell_days,
    };
    let report = relocate(&items, as_of, &policy);

    for m in &report.moved {
        println!("{}  -> {}", m.item_id, m.new_location);
    }
    for f in &report.failures {
        eprintln!("Warning: skipped {}: {}", f.item_id, f.reason);
    }
    println!(
        "Relocated {} items ({} already long-term, {} exempt, {} within dwell period, {} failed).",
        report.moved.len(),
        report.skipped_already,
        report.skipped_exempt,
        report.skipped_young,
        report.failures.len()
    );

    if dry_run {
        println!("Dry run: file not rewritten.");
        return Ok(());
    }

    if !report.moved.is_empty() {
        for m in &report.moved {
            if let Some(item) = items.iter_mut().find(|i| i.item_id == m.item_id) {
                item.storage_location = m.new_location.clone();
            }
        }
        std::fs::write(items_path, serde_json::to_string_pretty(&items)?)?;
        println!("Rewrote {}.", items_path.display());
    }

    Ok(())
}
