//! cardgraph - Card co-occurrence graph and late-fusion similarity ranking
//!
//! Observed decks are folded into an incrementally updated co-occurrence
//! graph: cards are nodes, pairs that appear in the same deck share an edge
//! whose weight, monthly histogram and per-format windows grow with every
//! deck. The ranker answers "what plays like this card?" by scoring a
//! candidate pool with several independent similarity signals and fusing
//! them into one list.
//!
//! # Architecture
//!
//! ```text
//! DeckRecord → validate → CardGraph::add_deck → GraphStorage (JSON | SQLite)
//!                              ↓                      ↓
//!                    Jaccard / Temporal         edgelist / Parquet export
//!                              ↓
//!          providers ─► FusionRanker::similar ─► [(card, score)]
//! ```
//!
//! # Design
//!
//! - Node identity is `(game, name)`; edges never cross games
//! - Edge keys are canonical (sorted pair) so `(a, b)` and `(b, a)` collide
//! - "No data" is `Option::None` all the way to the aggregation boundary
//! - Both storage backends share one row codec

pub mod config;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod storage;
pub mod types;

// Re-export core types
pub use types::{CardKey, Deck, DeckCard, DeckMetadata, DeckPartition, DeckRecord, Game, ValidDeck};

pub use error::{GraphError, GraphResult, SignalError};

// Re-export graph types
pub use graph::{
    CardGraph, CardNode, CoEdge, DedupPolicy, EdgeFilter, EdgeKey, FormatPeriod, GraphStatistics,
    IngestOutcome, IngestReport,
};

// Re-export storage types
pub use storage::{open_storage, GraphSnapshot, GraphStorage, StorageBackend};

// Re-export fusion types
pub use fusion::{
    Aggregator, CandidateSource, EmbeddingTable, FunctionalTags, FusionRanker, FusionWeights,
    QueryBudget, RankerConfig, ScoredCandidate, SignalKind, SimilaritySignal,
};

pub use config::Config;
