//! cardgraph CLI - build and query the card co-occurrence graph
//!
//! Thin driver over the library:
//!
//! 1. ingest: fold JSON-lines deck records into the persisted graph
//! 2. similar: rank cards similar to a query card
//! 3. export: edge list or Parquet for downstream training jobs
//! 4. stats: graph size and per-game distribution
//!
//! Settings come from cardgraph.toml (searched from the working directory
//! upwards); flags override the file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cardgraph::fusion::QueryBudget;
use cardgraph::storage::open_storage;
use cardgraph::{
    Aggregator, CardGraph, Config, EmbeddingTable, FunctionalTags, FusionRanker, Game,
    GraphStorage, SignalKind, StorageBackend,
};

/// Card co-occurrence graph and similarity ranking
///
/// Examples:
///   cardgraph ingest decks.jsonl                 # Add decks to the graph
///   cardgraph similar "Lightning Bolt" -k 5      # Top 5 similar cards
///   cardgraph export edgelist edges.tsv          # For embedding training
///   cardgraph stats                              # Graph summary
#[derive(Parser, Debug)]
#[command(name = "cardgraph")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: search for cardgraph.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Graph file, overriding [graph] path
    #[arg(long, global = true, value_name = "PATH")]
    pub graph: Option<PathBuf>,

    /// Storage backend, overriding [graph] backend (json | sqlite)
    #[arg(long, global = true)]
    pub backend: Option<StorageBackend>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest JSON-lines deck records into the graph
    Ingest {
        /// One or more .jsonl files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Discard the persisted graph and rebuild from these files
        #[arg(long)]
        rebuild: bool,
    },

    /// Rank cards similar to a query card
    Similar {
        /// Query card name(s); several names are ranked jointly
        #[arg(required = true)]
        cards: Vec<String>,

        /// Number of results
        #[arg(short, default_value = "10")]
        k: usize,

        /// Game the cards belong to
        #[arg(long, default_value = "MTG")]
        game: Game,

        /// Aggregation strategy, overriding [fusion] aggregator
        #[arg(long)]
        aggregator: Option<Aggregator>,

        /// Co-occurrence embedding table (JSON: card -> vector)
        #[arg(long, value_name = "FILE")]
        embeddings: Option<PathBuf>,

        /// GNN embedding table (JSON: card -> vector)
        #[arg(long, value_name = "FILE")]
        gnn: Option<PathBuf>,

        /// Functional tags (JSON: card -> [tag])
        #[arg(long, value_name = "FILE")]
        tags: Option<PathBuf>,

        /// Print per-signal scores
        #[arg(long)]
        explain: bool,
    },

    /// Export the graph for downstream tools
    Export {
        #[command(subcommand)]
        format: ExportFormat,
    },

    /// Print graph statistics
    Stats {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExportFormat {
    /// Tab-separated card1, card2, weight
    Edgelist {
        path: PathBuf,

        #[arg(long, default_value = "0")]
        min_weight: f64,

        #[arg(long)]
        game: Option<Game>,
    },
    /// nodes.parquet and edges.parquet
    Parquet { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_config(&cli)?;
    if cli.verbose {
        eprintln!("{}", config.display_summary());
    }

    match &cli.command {
        Command::Ingest { files, rebuild } => run_ingest(&config, files, *rebuild),
        Command::Similar {
            cards,
            k,
            game,
            aggregator,
            embeddings,
            gnn,
            tags,
            explain,
        } => {
            let mut config = config;
            if let Some(aggregator) = aggregator {
                config.ranker.aggregator = *aggregator;
            }
            let providers = Providers {
                embeddings: embeddings.clone(),
                gnn: gnn.clone(),
                tags: tags.clone(),
            };
            run_similar(&config, cards, *k, *game, &providers, *explain)
        }
        Command::Export { format } => run_export(&config, format),
        Command::Stats { json } => run_stats(&config, *json),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            Config::load(&cwd)
        }
    };
    if let Some(path) = &cli.graph {
        config.graph.backend = StorageBackend::from_path(path);
        config.graph.path = path.clone();
    }
    if let Some(backend) = cli.backend {
        config.graph.backend = backend;
    }
    Ok(config)
}

fn open(config: &Config) -> Result<Box<dyn GraphStorage>> {
    open_storage(&config.graph.path, config.graph.backend).with_context(|| {
        format!("Failed to open graph storage '{}'", config.graph.path.display())
    })
}

fn load_graph(storage: &dyn GraphStorage) -> Result<Option<CardGraph>> {
    CardGraph::load(storage)
        .with_context(|| format!("Failed to load graph from '{}'", storage.location().display()))
}

fn require_graph(config: &Config) -> Result<CardGraph> {
    let storage = open(config)?;
    match load_graph(storage.as_ref())? {
        Some(graph) => Ok(graph),
        None => bail!(
            "No graph at '{}'. Run `cardgraph ingest` first.",
            config.graph.path.display()
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ingest
// ═══════════════════════════════════════════════════════════════════════════

fn run_ingest(config: &Config, files: &[PathBuf], rebuild: bool) -> Result<()> {
    let storage = open(config)?;
    let existing = if rebuild { None } else { load_graph(storage.as_ref())? };
    let mut graph = existing
        .unwrap_or_default()
        .with_dedup_policy(config.graph.dedup);

    let mut records = Vec::new();
    let mut unparseable = 0;
    for file in files {
        let lines = cardgraph::graph::read_deck_records(file)
            .with_context(|| format!("Failed to read deck records from '{}'", file.display()))?;
        unparseable += lines.unparseable;
        records.extend(lines.records);
    }

    let mut report = if rebuild {
        graph.rebuild_from_records(records)
    } else {
        graph.ingest_records(records)
    };
    report.malformed += unparseable;

    graph
        .save(storage.as_ref())
        .with_context(|| format!("Failed to save graph to '{}'", config.graph.path.display()))?;

    println!(
        "ingested {} decks ({} duplicates, {} malformed) -> {} cards, {} edges",
        report.ingested,
        report.duplicates,
        report.malformed,
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Similar
// ═══════════════════════════════════════════════════════════════════════════

struct Providers {
    embeddings: Option<PathBuf>,
    gnn: Option<PathBuf>,
    tags: Option<PathBuf>,
}

fn run_similar(
    config: &Config,
    cards: &[String],
    k: usize,
    game: Game,
    providers: &Providers,
    explain: bool,
) -> Result<()> {
    let graph = Arc::new(require_graph(config)?);
    let mut ranker = FusionRanker::new(graph, game, config.ranker.clone());

    if let Some(path) = &providers.embeddings {
        let table = Arc::new(
            EmbeddingTable::from_json_file(path, SignalKind::Embed, game)
                .with_context(|| format!("Failed to load embeddings '{}'", path.display()))?,
        );
        ranker = ranker.with_signal(table.clone()).with_candidate_source(table);
    }
    if let Some(path) = &providers.gnn {
        let table = EmbeddingTable::from_json_file(path, SignalKind::Gnn, game)
            .with_context(|| format!("Failed to load GNN embeddings '{}'", path.display()))?;
        ranker = ranker.with_signal(Arc::new(table));
    }
    if let Some(path) = &providers.tags {
        let tags = FunctionalTags::from_json_file(path, game)
            .with_context(|| format!("Failed to load functional tags '{}'", path.display()))?;
        ranker = ranker.with_signal(Arc::new(tags));
    }
    info!(reference = %ranker.reference_time(), "temporal reference time");

    if cards.len() > 1 {
        let names: Vec<&str> = cards.iter().map(String::as_str).collect();
        for (rank, (card, score)) in ranker.similar_multi(&names, k).iter().enumerate() {
            println!("{:>3}. {:<40} {:.4}", rank + 1, card, score);
        }
        return Ok(());
    }

    let budget = QueryBudget::from_timeout(config.ranker.deadline);
    let results = ranker.similar_scored(&cards[0], k, &budget);
    if results.is_empty() {
        eprintln!("No similar cards for '{}' ({game})", cards[0]);
    }
    for (rank, candidate) in results.iter().enumerate() {
        println!(
            "{:>3}. {:<40} {:.4}",
            rank + 1,
            candidate.card.name,
            candidate.score
        );
        if explain {
            let parts: Vec<String> = candidate
                .signals
                .iter()
                .map(|(kind, score)| match score {
                    Some(s) => format!("{kind}={s:.3}"),
                    None => format!("{kind}=-"),
                })
                .collect();
            println!("     {}", parts.join("  "));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Export / Stats
// ═══════════════════════════════════════════════════════════════════════════

fn run_export(config: &Config, format: &ExportFormat) -> Result<()> {
    let graph = require_graph(config)?;
    match format {
        ExportFormat::Edgelist {
            path,
            min_weight,
            game,
        } => {
            let written = graph
                .export_edgelist(path, *min_weight, *game)
                .with_context(|| format!("Failed to export edge list to '{}'", path.display()))?;
            println!("wrote {written} edges to {}", path.display());
        }
        ExportFormat::Parquet { dir } => {
            let export = graph
                .export_parquet(dir)
                .with_context(|| format!("Failed to export Parquet to '{}'", dir.display()))?;
            println!(
                "wrote {} and {}",
                export.nodes.display(),
                export.edges.display()
            );
        }
    }
    Ok(())
}

fn run_stats(config: &Config, json: bool) -> Result<()> {
    let graph = require_graph(config)?;
    let stats = graph.statistics();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("cards:          {}", stats.num_nodes);
    println!("edges:          {}", stats.num_edges);
    println!("decks:          {}", stats.total_decks_processed);
    if let Some(ts) = stats.last_update {
        println!("last update:    {}", ts.to_rfc3339());
    }
    println!("avg degree:     {:.2} (max {})", stats.avg_degree, stats.max_degree);
    println!(
        "avg weight:     {:.2} (max {:.2})",
        stats.avg_edge_weight, stats.max_edge_weight
    );
    for (game, counts) in &stats.per_game {
        println!("  {game}: {} cards, {} edges", counts.nodes, counts.edges);
    }
    Ok(())
}
