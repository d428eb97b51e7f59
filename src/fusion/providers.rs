//! File-backed similarity providers.
//!
//! Embedding tables and functional tags are produced offline by separate
//! pipelines and dropped next to the graph as JSON. These adapters load them
//! and expose the [`SimilaritySignal`] / [`CandidateSource`] seams.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::signal::{CandidateSource, SimilaritySignal};
use super::weights::SignalKind;
use crate::error::{GraphError, GraphResult, SignalError};
use crate::types::{CardKey, Game};

/// Dense vectors keyed by card name, for one game.
///
/// Backs any of the embedding-shaped signals (`embed`, `text-embed`,
/// `visual`, `gnn`); `kind` says which one this table plays.
pub struct EmbeddingTable {
    kind: SignalKind,
    game: Game,
    vectors: HashMap<Arc<str>, Vec<f32>>,
}

impl EmbeddingTable {
    pub fn from_vectors<I, S>(kind: SignalKind, game: Game, vectors: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<Arc<str>>,
    {
        Self {
            kind,
            game,
            vectors: vectors.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Load a `{"card name": [f32, ...]}` JSON object.
    pub fn from_json_file(path: &Path, kind: SignalKind, game: Game) -> GraphResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        let vectors: HashMap<String, Vec<f32>> = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            signal = %kind,
            cards = vectors.len(),
            "loaded embedding table"
        );
        Ok(Self::from_vectors(kind, game, vectors))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn vector(&self, card: &CardKey) -> Option<&[f32]> {
        if card.game != self.game {
            return None;
        }
        self.vectors.get(&card.name).map(Vec::as_slice)
    }

    /// Cosine similarity rescaled from `[-1, 1]` to `[0, 1]`.
    fn similarity(&self, a: &[f32], b: &[f32]) -> Result<Option<f64>, SignalError> {
        if a.len() != b.len() {
            return Err(SignalError::provider(
                self.kind.name(),
                format!("dimension mismatch: {} vs {}", a.len(), b.len()),
            ));
        }
        Ok(cosine(a, b).map(|c| ((c + 1.0) / 2.0).clamp(0.0, 1.0)))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

impl SimilaritySignal for EmbeddingTable {
    fn kind(&self) -> SignalKind {
        self.kind
    }

    fn score(&self, query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
        match (self.vector(query), self.vector(candidate)) {
            (Some(a), Some(b)) => self.similarity(a, b),
            _ => Ok(None),
        }
    }

    fn knows(&self, card: &CardKey) -> bool {
        self.vector(card).is_some()
    }
}

impl CandidateSource for EmbeddingTable {
    fn top_n_similar(&self, card: &CardKey, n: usize) -> Vec<(CardKey, f64)> {
        let Some(query) = self.vector(card) else {
            return Vec::new();
        };
        let mut scored: Vec<(&Arc<str>, f64)> = self
            .vectors
            .iter()
            .filter(|(name, _)| **name != card.name)
            .filter_map(|(name, v)| match self.similarity(query, v) {
                Ok(Some(s)) => Some((name, s)),
                _ => None,
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(n);
        scored
            .into_iter()
            .map(|(name, s)| (CardKey::new(self.game, name.clone()), s))
            .collect()
    }

    fn knows(&self, card: &CardKey) -> bool {
        self.vector(card).is_some()
    }
}

/// Functional role tags per card ("removal", "ramp", "card-draw", ...).
///
/// Similarity is the Jaccard overlap of the two tag sets.
pub struct FunctionalTags {
    game: Game,
    tags: HashMap<Arc<str>, BTreeSet<String>>,
}

impl FunctionalTags {
    pub fn from_tags<I, S, T>(game: Game, tags: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<Arc<str>>,
        T: IntoIterator<Item = String>,
    {
        Self {
            game,
            tags: tags
                .into_iter()
                .map(|(card, t)| (card.into(), t.into_iter().collect()))
                .collect(),
        }
    }

    /// Load a `{"card name": ["tag", ...]}` JSON object.
    pub fn from_json_file(path: &Path, game: Game) -> GraphResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| GraphError::io(path, e))?;
        let tags: HashMap<String, Vec<String>> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), cards = tags.len(), "loaded functional tags");
        Ok(Self::from_tags(game, tags))
    }

    fn tags(&self, card: &CardKey) -> Option<&BTreeSet<String>> {
        if card.game != self.game {
            return None;
        }
        self.tags.get(&card.name).filter(|t| !t.is_empty())
    }
}

impl SimilaritySignal for FunctionalTags {
    fn kind(&self) -> SignalKind {
        SignalKind::Functional
    }

    fn score(&self, query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
        let (Some(a), Some(b)) = (self.tags(query), self.tags(candidate)) else {
            return Ok(None);
        };
        let intersection = a.intersection(b).count();
        let union = a.len() + b.len() - intersection;
        Ok(Some(intersection as f64 / union as f64))
    }

    fn knows(&self, card: &CardKey) -> bool {
        self.tags(card).is_some()
    }
}
