//! Signals computed directly from the co-occurrence graph.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::signal::SimilaritySignal;
use super::weights::SignalKind;
use crate::error::SignalError;
use crate::graph::temporal::{temporal_similarity, TemporalParams};
use crate::graph::CardGraph;
use crate::types::CardKey;

/// Jaccard overlap of two cards' neighbour sets.
///
/// Unavailable when either card is absent from the graph. Two known cards
/// with no neighbours at all score 0.
pub struct JaccardSignal {
    graph: Arc<CardGraph>,
    min_weight: f64,
}

impl JaccardSignal {
    pub fn new(graph: Arc<CardGraph>, min_weight: f64) -> Self {
        Self { graph, min_weight }
    }

    pub fn similarity(&self, a: &CardKey, b: &CardKey) -> Option<f64> {
        if a.game != b.game || !self.graph.has_card(a) || !self.graph.has_card(b) {
            return None;
        }
        let na = self.graph.neighbor_set(a, self.min_weight);
        let nb = self.graph.neighbor_set(b, self.min_weight);
        let intersection = na.intersection(&nb).count();
        let union = na.len() + nb.len() - intersection;
        Some(if union > 0 {
            intersection as f64 / union as f64
        } else {
            0.0
        })
    }
}

impl SimilaritySignal for JaccardSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Jaccard
    }

    fn score(&self, query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
        Ok(self.similarity(query, candidate))
    }

    fn knows(&self, card: &CardKey) -> bool {
        self.graph.has_card(card)
    }
}

/// Recency- and format-weighted strength of the query/candidate edge.
///
/// Evaluated against a fixed reference time so repeated queries agree.
pub struct TemporalSignal {
    graph: Arc<CardGraph>,
    reference: DateTime<Utc>,
    params: TemporalParams,
}

impl TemporalSignal {
    pub fn new(graph: Arc<CardGraph>, reference: DateTime<Utc>, params: TemporalParams) -> Self {
        Self {
            graph,
            reference,
            params,
        }
    }

    pub fn reference(&self) -> DateTime<Utc> {
        self.reference
    }
}

impl SimilaritySignal for TemporalSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Temporal
    }

    fn score(&self, query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
        if query.game != candidate.game {
            return Ok(None);
        }
        Ok(self
            .graph
            .get_edge(query.game, &query.name, &candidate.name)
            .and_then(|edge| temporal_similarity(edge, self.reference, &self.params)))
    }

    fn knows(&self, card: &CardKey) -> bool {
        self.graph.has_card(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_timestamp, Deck, Game};

    fn graph() -> Arc<CardGraph> {
        let mut graph = CardGraph::new();
        let ts = parse_timestamp("2024-01-15").unwrap();
        // A and B share neighbours C and D; E only touches A.
        let d1 = Deck::new(Game::Magic).with_partition("Main", [("A", 4), ("C", 4), ("D", 4)]);
        let d2 = Deck::new(Game::Magic).with_partition("Main", [("B", 4), ("C", 4), ("D", 4)]);
        let d3 = Deck::new(Game::Magic).with_partition("Main", [("A", 1), ("E", 1)]);
        graph.add_deck(&d1, "d1", ts);
        graph.add_deck(&d2, "d2", ts);
        graph.add_deck(&d3, "d3", ts);
        let solo = Deck::new(Game::Magic).with_partition("Main", [("Loner", 1)]);
        graph.add_deck(&solo, "d4", ts);
        Arc::new(graph)
    }

    fn key(name: &str) -> CardKey {
        CardKey::new(Game::Magic, name)
    }

    #[test]
    fn test_jaccard() {
        let signal = JaccardSignal::new(graph(), 0.0);
        // N(A) = {C, D, E}, N(B) = {C, D}
        let s = signal.score(&key("A"), &key("B")).unwrap().unwrap();
        assert!((s - 2.0 / 3.0).abs() < 1e-12, "jaccard = {s}");
        assert_eq!(signal.score(&key("A"), &key("Nope")).unwrap(), None);
        // Known but isolated: both neighbour sets are empty.
        assert_eq!(signal.score(&key("Loner"), &key("A")).unwrap(), Some(0.0));
        assert!(signal.knows(&key("E")));
        assert!(!signal.knows(&CardKey::new(Game::Pokemon, "A")));
    }

    #[test]
    fn test_jaccard_min_weight() {
        let signal = JaccardSignal::new(graph(), 2.0);
        // The weight-1 edge A-E is ignored: N(A) = {C, D} = N(B)
        let s = signal.score(&key("A"), &key("B")).unwrap().unwrap();
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_temporal_requires_edge() {
        let reference = parse_timestamp("2024-01-01").unwrap();
        let signal = TemporalSignal::new(graph(), reference, TemporalParams::default());
        let s = signal.score(&key("A"), &key("C")).unwrap().unwrap();
        assert!(s > 0.0 && s <= 1.0);
        assert_eq!(signal.score(&key("A"), &key("B")).unwrap(), None);
        assert_eq!(
            signal
                .score(&key("A"), &CardKey::new(Game::Pokemon, "C"))
                .unwrap(),
            None
        );
    }
}
