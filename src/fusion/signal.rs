//! The provider seams of the ranker.
//!
//! Every similarity backend, whether graph-native or an external model, is a
//! [`SimilaritySignal`]. The ranker holds them as trait objects and never
//! switches on concrete types. Backends that can also propose neighbours
//! implement [`CandidateSource`].

use crate::error::SignalError;
use crate::types::CardKey;

use super::weights::SignalKind;

/// A pairwise similarity function.
///
/// `Ok(None)` means "no data for this pair" (unmapped card, missing image,
/// no tagger) and is the expected common case, not a failure. `Err` is
/// reserved for genuine provider failures; the ranker logs those and treats
/// the pair as unavailable.
pub trait SimilaritySignal: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Similarity in `[0, 1]`, or `None` when unavailable.
    fn score(&self, query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError>;

    /// Whether this signal has any data about `card`.
    ///
    /// Used to tell an unknown query card apart from one with no candidates.
    fn knows(&self, _card: &CardKey) -> bool {
        false
    }
}

/// A backend that can propose candidates for a query.
pub trait CandidateSource: Send + Sync {
    /// Up to `n` most similar cards, best first.
    fn top_n_similar(&self, card: &CardKey, n: usize) -> Vec<(CardKey, f64)>;

    fn knows(&self, card: &CardKey) -> bool;
}

/// Map a raw provider score into the ranker's domain.
///
/// NaN is unavailable; everything else is clamped into `[0, 1]`.
pub fn sanitize(score: Option<f64>) -> Option<f64> {
    match score {
        Some(s) if s.is_nan() => None,
        Some(s) => Some(s.clamp(0.0, 1.0)),
        None => None,
    }
}
