//! Node and edge records of the co-occurrence graph.
//!
//! Edges are undirected and keyed by a canonical [`EdgeKey`]: the two card
//! names are sorted so that `(A, B)` and `(B, A)` resolve to one record. Both
//! endpoints always share the edge's game.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::temporal::{self, TemporalStats};
use crate::types::{month_key, CardKey, Game};

/// A card observed in at least one ingested deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardNode {
    #[serde(flatten)]
    pub key: CardKey,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of ingested decks containing this card
    pub total_decks: u64,
    /// Opaque enrichment data (color, type, cost...), never interpreted here
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CardNode {
    pub fn new(key: CardKey, seen: DateTime<Utc>) -> Self {
        Self {
            key,
            first_seen: seen,
            last_seen: seen,
            total_decks: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// Record one deck containing this card.
    pub fn observe(&mut self, ts: DateTime<Utc>) {
        self.first_seen = self.first_seen.min(ts);
        self.last_seen = self.last_seen.max(ts);
        self.total_decks += 1;
    }
}

/// Canonical identity of an undirected edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub game: Game,
    pub card1: Arc<str>,
    pub card2: Arc<str>,
}

impl EdgeKey {
    /// Build the key for a pair, sorting the names.
    pub fn new(game: Game, a: impl Into<Arc<str>>, b: impl Into<Arc<str>>) -> Self {
        let (a, b) = (a.into(), b.into());
        let (card1, card2) = if a <= b { (a, b) } else { (b, a) };
        Self { game, card1, card2 }
    }

    pub fn endpoints(&self) -> (CardKey, CardKey) {
        (
            CardKey::new(self.game, self.card1.clone()),
            CardKey::new(self.game, self.card2.clone()),
        )
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|||{}", self.game, self.card1, self.card2)
    }
}

/// Activity window and volume of a pair under one format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatPeriod {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub count: f64,
}

impl FormatPeriod {
    fn observe(&mut self, ts: DateTime<Utc>, increment: f64) {
        self.first_seen = self.first_seen.min(ts);
        self.last_seen = self.last_seen.max(ts);
        self.count += increment;
    }
}

/// Provenance recorded on an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    /// Deck partitions ("Main", "Sideboard") the pair was drawn from
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub partitions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub formats: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub archetypes: BTreeSet<String>,
    /// Event placements, one entry per contributing deck that reported one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_dates: Vec<String>,
    /// Ids of the decks that contributed to this edge
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deck_sources: BTreeSet<String>,
    /// Anything else a producer attached
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EdgeMetadata {
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
            && self.formats.is_empty()
            && self.archetypes.is_empty()
            && self.placements.is_empty()
            && self.event_dates.is_empty()
            && self.deck_sources.is_empty()
            && self.extra.is_empty()
    }
}

/// One deck's contribution to an edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct Contribution<'a> {
    pub increment: f64,
    pub timestamp: DateTime<Utc>,
    pub deck_id: Option<&'a str>,
    pub format: Option<&'a str>,
    pub archetype: Option<&'a str>,
    pub placement: Option<u32>,
    pub event_date: Option<&'a str>,
}

/// Weighted co-occurrence edge between two cards of one game.
///
/// `weight` always equals the sum of `monthly_counts`: every contribution is
/// added to both in the same call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoEdge {
    pub game: Game,
    #[serde(with = "crate::types::arc_str_serde")]
    pub card1: Arc<str>,
    #[serde(with = "crate::types::arc_str_serde")]
    pub card2: Arc<str>,
    pub weight: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub monthly_counts: BTreeMap<String, f64>,
    #[serde(default)]
    pub format_periods: BTreeMap<String, FormatPeriod>,
    #[serde(default)]
    pub metadata: EdgeMetadata,
}

impl CoEdge {
    /// Empty edge for a key, first observed at `seen`.
    pub fn new(key: EdgeKey, seen: DateTime<Utc>) -> Self {
        Self {
            game: key.game,
            card1: key.card1,
            card2: key.card2,
            weight: 0.0,
            first_seen: seen,
            last_seen: seen,
            monthly_counts: BTreeMap::new(),
            format_periods: BTreeMap::new(),
            metadata: EdgeMetadata::default(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            game: self.game,
            card1: self.card1.clone(),
            card2: self.card2.clone(),
        }
    }

    /// The endpoint that is not `name`, if `name` is an endpoint.
    pub fn other(&self, name: &str) -> Option<&Arc<str>> {
        if self.card1.as_ref() == name {
            Some(&self.card2)
        } else if self.card2.as_ref() == name {
            Some(&self.card1)
        } else {
            None
        }
    }

    /// Apply one deck's contribution.
    pub fn record<'p>(
        &mut self,
        contribution: Contribution<'_>,
        partitions: impl IntoIterator<Item = &'p String>,
    ) {
        let Contribution {
            increment,
            timestamp,
            deck_id,
            format,
            archetype,
            placement,
            event_date,
        } = contribution;

        self.weight += increment;
        *self
            .monthly_counts
            .entry(month_key(&timestamp))
            .or_insert(0.0) += increment;
        self.first_seen = self.first_seen.min(timestamp);
        self.last_seen = self.last_seen.max(timestamp);

        if let Some(format) = format {
            self.format_periods
                .entry(format.to_string())
                .or_insert_with(|| FormatPeriod {
                    first_seen: timestamp,
                    last_seen: timestamp,
                    count: 0.0,
                })
                .observe(timestamp, increment);
            self.metadata.formats.insert(format.to_string());
        }
        if let Some(archetype) = archetype {
            self.metadata.archetypes.insert(archetype.to_string());
        }
        if let Some(placement) = placement {
            self.metadata.placements.push(placement);
        }
        if let Some(date) = event_date {
            self.metadata.event_dates.push(date.to_string());
        }
        if let Some(id) = deck_id {
            self.metadata.deck_sources.insert(id.to_string());
        }
        self.metadata.partitions.extend(partitions.into_iter().cloned());
    }

    /// Sum of the monthly histogram.
    pub fn monthly_total(&self) -> f64 {
        self.monthly_counts.values().sum()
    }

    /// Weight accumulated under `format`, zero if never seen there.
    pub fn format_count(&self, format: &str) -> f64 {
        self.format_periods.get(format).map_or(0.0, |p| p.count)
    }

    /// Distribution statistics of the monthly histogram.
    pub fn temporal_stats(&self, trend_lookback_months: usize) -> TemporalStats {
        temporal::compute_stats(
            &self.monthly_counts,
            self.first_seen,
            self.last_seen,
            trend_lookback_months,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_timestamp;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn contribution(increment: f64, at: &str, format: Option<&'static str>) -> Contribution<'static> {
        Contribution {
            increment,
            timestamp: ts(at),
            format,
            ..Contribution::default()
        }
    }

    #[test]
    fn test_edge_key_is_order_independent() {
        let ab = EdgeKey::new(Game::Magic, "Lightning Bolt", "Chain Lightning");
        let ba = EdgeKey::new(Game::Magic, "Chain Lightning", "Lightning Bolt");
        assert_eq!(ab, ba);
        assert_eq!(ab.card1.as_ref(), "Chain Lightning");
        assert_eq!(ab.to_string(), "MTG:Chain Lightning|||Lightning Bolt");
    }

    #[test]
    fn test_edge_key_includes_game() {
        let mtg = EdgeKey::new(Game::Magic, "A", "B");
        let pkm = EdgeKey::new(Game::Pokemon, "A", "B");
        assert_ne!(mtg, pkm);
    }

    #[test]
    fn test_record_keeps_histogram_in_sync() {
        let key = EdgeKey::new(Game::Magic, "A", "B");
        let mut edge = CoEdge::new(key, ts("2024-01-15"));
        let main = vec!["Main".to_string()];

        edge.record(contribution(2.0, "2024-01-15", Some("Modern")), &main);
        edge.record(contribution(3.0, "2024-02-01", Some("Legacy")), &main);
        edge.record(contribution(1.0, "2023-12-31", None), &main);

        assert_eq!(edge.weight, 6.0);
        assert_eq!(edge.monthly_total(), edge.weight);
        assert_eq!(edge.monthly_counts["2024-01"], 2.0);
        assert_eq!(edge.monthly_counts["2023-12"], 1.0);
        assert_eq!(edge.first_seen, ts("2023-12-31"));
        assert_eq!(edge.last_seen, ts("2024-02-01"));
        assert_eq!(edge.format_count("Modern"), 2.0);
        assert_eq!(edge.format_count("Pauper"), 0.0);
        assert_eq!(edge.metadata.formats.len(), 2);
        assert!(edge.metadata.partitions.contains("Main"));
    }

    #[test]
    fn test_format_period_window() {
        let mut edge = CoEdge::new(EdgeKey::new(Game::Magic, "A", "B"), ts("2024-03-01"));
        let none: Vec<String> = Vec::new();
        edge.record(contribution(1.0, "2024-03-01", Some("Modern")), &none);
        edge.record(contribution(1.0, "2024-01-01", Some("Modern")), &none);
        let period = &edge.format_periods["Modern"];
        assert_eq!(period.first_seen, ts("2024-01-01"));
        assert_eq!(period.last_seen, ts("2024-03-01"));
        assert_eq!(period.count, 2.0);
    }

    #[test]
    fn test_other_endpoint() {
        let edge = CoEdge::new(EdgeKey::new(Game::Magic, "A", "B"), ts("2024-01-01"));
        assert_eq!(edge.other("A").map(|s| s.as_ref()), Some("B"));
        assert_eq!(edge.other("B").map(|s| s.as_ref()), Some("A"));
        assert!(edge.other("C").is_none());
    }

    #[test]
    fn test_metadata_extra_roundtrips_through_json() {
        let mut meta = EdgeMetadata::default();
        meta.partitions.insert("Main".into());
        meta.extra
            .insert("source_url".into(), serde_json::json!("https://decks.example/1"));
        let json = serde_json::to_string(&meta).unwrap();
        let back: EdgeMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_record_collects_deck_provenance() {
        let mut edge = CoEdge::new(EdgeKey::new(Game::Magic, "A", "B"), ts("2024-01-01"));
        let none: Vec<String> = Vec::new();
        for (deck, placement) in [("d1", Some(1)), ("d2", None), ("d1", Some(4))] {
            edge.record(
                Contribution {
                    deck_id: Some(deck),
                    placement,
                    event_date: Some("2024-01-01"),
                    ..contribution(1.0, "2024-01-01", None)
                },
                &none,
            );
        }
        assert_eq!(edge.metadata.placements, vec![1, 4]);
        assert_eq!(edge.metadata.event_dates.len(), 3);
        let sources: Vec<&str> = edge.metadata.deck_sources.iter().map(String::as_str).collect();
        assert_eq!(sources, ["d1", "d2"]);
    }

    #[test]
    fn test_edge_serializes_with_plain_names() {
        let mut edge = CoEdge::new(
            EdgeKey::new(Game::Magic, "Lightning Bolt", "Chain Lightning"),
            ts("2024-01-15"),
        );
        edge.record(contribution(2.0, "2024-01-15", Some("Modern")), &Vec::<String>::new());
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["card1"], "Chain Lightning");
        assert_eq!(json["card2"], "Lightning Bolt");
        let back: CoEdge = serde_json::from_value(json).unwrap();
        assert_eq!(back, edge);
    }

    #[test]
    fn test_node_observe() {
        let mut node = CardNode::new(CardKey::new(Game::Magic, "A"), ts("2024-02-01"));
        node.observe(ts("2024-02-01"));
        node.observe(ts("2024-01-01"));
        assert_eq!(node.total_decks, 2);
        assert_eq!(node.first_seen, ts("2024-01-01"));
        assert_eq!(node.last_seen, ts("2024-02-01"));
    }
}
