//! Late-fusion similarity ranking.
//!
//! # Architecture
//!
//! ```text
//! CardGraph ──► JaccardSignal ─┐
//!           └─► TemporalSignal ┤
//! EmbeddingTable ──────────────┼──► score matrix ──► Aggregator ──► ranked list
//! FunctionalTags ──────────────┘    Option<f64>       weighted | rrf
//!                                                     combmax | combmin
//! ```
//!
//! Providers are trait objects registered on the [`FusionRanker`]; the ranker
//! owns no provider state of its own.

mod aggregate;
mod budget;
mod graph_signals;
mod providers;
mod ranker;
mod signal;
mod weights;

pub use aggregate::{Aggregator, ScoreMatrix};
pub use budget::{CancelToken, QueryBudget};
pub use graph_signals::{JaccardSignal, TemporalSignal};
pub use providers::{EmbeddingTable, FunctionalTags};
pub use ranker::{FusionRanker, RankerConfig, ScoredCandidate};
pub use signal::{sanitize, CandidateSource, SimilaritySignal};
pub use weights::{FusionWeights, SignalKind};
