//! Error types for the graph store, its storage backends and signal providers.
//!
//! Read paths never use these for "not found": absence is `None` or an empty
//! collection. Errors are reserved for persistence failures, corrupt data and
//! malformed input.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::CardKey;

/// Graph store and persistence errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Filesystem failure while reading or writing a graph artifact.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// The file or directory being accessed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SQLite backend failure (locked database, disk full, bad schema).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Arrow record batch construction failed during Parquet export.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet writer failure.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Persisted data could not be interpreted.
    #[error("Corrupt {what}: {details}")]
    Corrupt {
        /// Which artifact or column was corrupt
        what: String,
        /// What was wrong with it
        details: String,
    },

    /// An edge would connect cards from two different games.
    #[error("Cross-game edge rejected: {a} <-> {b}")]
    CrossGame {
        /// First endpoint
        a: CardKey,
        /// Second endpoint
        b: CardKey,
    },

    /// A deck record lacked a required field or carried invalid values.
    #[error("Malformed deck record{}: {reason}", deck_id.as_deref().map(|id| format!(" '{id}'")).unwrap_or_default())]
    MalformedDeck {
        /// Deck id, when the record carried one
        deck_id: Option<String>,
        /// Why the record was rejected
        reason: String,
    },

    /// Game tag not recognised.
    #[error("Unknown game '{0}'")]
    UnknownGame(String),
}

impl GraphError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(what: impl Into<String>, details: impl Into<String>) -> Self {
        GraphError::Corrupt {
            what: what.into(),
            details: details.into(),
        }
    }

    pub fn malformed(deck_id: Option<&str>, reason: impl Into<String>) -> Self {
        GraphError::MalformedDeck {
            deck_id: deck_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}

/// Convenient Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Failure reported by a similarity signal provider.
///
/// "No data" is not an error: providers return `Ok(None)` for unmapped cards.
/// These variants cover genuine failures, which the ranker downgrades to an
/// unavailable score for the one candidate involved.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// The provider itself failed (remote lookup error, bad model state).
    #[error("{signal} provider failed: {message}")]
    Provider {
        /// Name of the failing signal
        signal: String,
        /// Provider-supplied description
        message: String,
    },
}

impl SignalError {
    pub fn provider(signal: impl Into<String>, message: impl Into<String>) -> Self {
        SignalError::Provider {
            signal: signal.into(),
            message: message.into(),
        }
    }
}
