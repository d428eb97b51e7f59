//! Persistence backends for the co-occurrence graph.
//!
//! Both backends store the same [`GraphSnapshot`] and share one column codec
//! ([`codec`]), so the trait boundary is the only place their behaviour can
//! differ:
//!
//! ```text
//!                    ┌──────────────┐
//!   CardGraph ──────►│ GraphSnapshot│──────► GraphStorage
//!                    └──────────────┘         ├── JsonStorage   (one file)
//!                                             └── SqliteStorage (nodes/edges tables)
//! ```
//!
//! Writes are all-or-nothing: the JSON backend writes a temp file and renames
//! it over the target, the SQLite backend replaces the tables in one
//! transaction. Any failure propagates to the caller of `save`/`load`.

pub mod codec;
mod json;
mod sqlite;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use json::JsonStorage;
pub use sqlite::SqliteStorage;

use crate::error::GraphResult;
use crate::graph::{CardNode, CoEdge};

/// Everything needed to reconstruct a graph.
///
/// Nodes are sorted by key and edges by canonical edge key, so two snapshots
/// of the same graph compare equal regardless of ingestion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<CardNode>,
    pub edges: Vec<CoEdge>,
    pub last_update: Option<DateTime<Utc>>,
    pub total_decks_processed: u64,
    /// Deck ids already ingested, for re-ingestion deduplication
    pub ingested_decks: BTreeSet<String>,
}

/// Which persistence strategy backs a graph file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Json,
    Sqlite,
}

impl StorageBackend {
    /// Infer the backend from a file extension; anything not SQLite-like is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("db" | "sqlite" | "sqlite3") => StorageBackend::Sqlite,
            _ => StorageBackend::Json,
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StorageBackend::Json),
            "sqlite" | "sqlite3" | "db" => Ok(StorageBackend::Sqlite),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// A place a graph snapshot can be saved to and loaded from.
pub trait GraphStorage: Send + Sync {
    fn backend(&self) -> StorageBackend;

    /// File the snapshot lives in.
    fn location(&self) -> &Path;

    /// Replace the persisted graph with `snapshot`.
    fn save(&self, snapshot: &GraphSnapshot) -> GraphResult<()>;

    /// Read the persisted graph, `None` if nothing has been saved yet.
    fn load(&self) -> GraphResult<Option<GraphSnapshot>>;
}

/// Open the backend for `path`.
///
/// The SQLite backend creates its schema on open; the JSON backend touches
/// nothing until the first save.
pub fn open_storage(
    path: impl Into<PathBuf>,
    backend: StorageBackend,
) -> GraphResult<Box<dyn GraphStorage>> {
    let path = path.into();
    Ok(match backend {
        StorageBackend::Json => Box::new(JsonStorage::new(path)),
        StorageBackend::Sqlite => Box::new(SqliteStorage::open(path)?),
    })
}
