//! Co-occurrence graph store.
//!
//! - [`model`]: node and edge records, canonical edge keys
//! - [`store`]: the in-memory [`CardGraph`] with ingestion and queries
//! - [`temporal`]: statistics and similarity over monthly histograms
//! - [`export`]: edge-list and Parquet writers
//! - [`records`]: JSON-lines deck reader

mod export;
pub mod model;
mod records;
mod store;
pub mod temporal;

pub use export::ParquetExport;
pub use model::{CardNode, CoEdge, Contribution, EdgeKey, EdgeMetadata, FormatPeriod};
pub use records::{read_deck_records, DeckLines};
pub use store::{
    CardGraph, DedupPolicy, EdgeFilter, GameCounts, GraphStatistics, IngestOutcome, IngestReport,
};
pub use temporal::{TemporalParams, TemporalStats};
