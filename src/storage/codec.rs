//! Column codec shared by every persisted form of the graph.
//!
//! SQLite rows and Parquet rows are both flat: scalars plus JSON text for the
//! nested temporal maps. [`NodeRow`] and [`EdgeRow`] are that flat shape, and
//! the JSON snapshot keys its maps with [`node_key`] / [`edge_key`]. Keeping
//! the conversions in one place means a node or edge decodes identically no
//! matter which backend wrote it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{GraphError, GraphResult};
use crate::graph::{CardNode, CoEdge, EdgeKey};
use crate::types::{CardKey, Game};

/// Snapshot map key for a node: "MTG:Lightning Bolt".
pub fn node_key(node: &CardNode) -> String {
    node.key.to_string()
}

/// Snapshot map key for an edge: "MTG:Chain Lightning|||Lightning Bolt".
pub fn edge_key(edge: &CoEdge) -> String {
    edge.key().to_string()
}

pub fn encode_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn decode_time(raw: &str, what: &str) -> GraphResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| GraphError::corrupt(what, format!("bad timestamp '{raw}': {e}")))
}

pub fn encode_json<T: Serialize>(value: &T) -> GraphResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON text column, treating NULL or blank as the empty value.
pub fn decode_json<T: DeserializeOwned + Default>(raw: Option<&str>, what: &str) -> GraphResult<T> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(T::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| GraphError::corrupt(what, format!("invalid JSON: {e}"))),
    }
}

fn decode_game(raw: &str, what: &str) -> GraphResult<Game> {
    raw.parse()
        .map_err(|_| GraphError::corrupt(what, format!("unknown game '{raw}'")))
}

/// Flat node row.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub name: String,
    pub game: String,
    pub first_seen: String,
    pub last_seen: String,
    pub total_decks: i64,
    pub attributes_json: String,
}

impl NodeRow {
    pub fn from_node(node: &CardNode) -> GraphResult<Self> {
        Ok(Self {
            name: node.key.name.to_string(),
            game: node.key.game.code().to_string(),
            first_seen: encode_time(&node.first_seen),
            last_seen: encode_time(&node.last_seen),
            total_decks: i64::try_from(node.total_decks).unwrap_or(i64::MAX),
            attributes_json: encode_json(&node.attributes)?,
        })
    }

    pub fn into_node(self) -> GraphResult<CardNode> {
        let what = format!("node '{}'", self.name);
        Ok(CardNode {
            key: CardKey::new(decode_game(&self.game, &what)?, self.name.as_str()),
            first_seen: decode_time(&self.first_seen, &what)?,
            last_seen: decode_time(&self.last_seen, &what)?,
            total_decks: u64::try_from(self.total_decks)
                .map_err(|_| GraphError::corrupt(&what, "negative total_decks"))?,
            attributes: decode_json(Some(&self.attributes_json), &what)?,
        })
    }
}

/// Flat edge row.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub card1: String,
    pub card2: String,
    pub game: String,
    pub weight: f64,
    pub first_seen: String,
    pub last_seen: String,
    pub monthly_counts_json: String,
    pub format_periods_json: String,
    pub metadata_json: String,
}

impl EdgeRow {
    pub fn from_edge(edge: &CoEdge) -> GraphResult<Self> {
        Ok(Self {
            card1: edge.card1.to_string(),
            card2: edge.card2.to_string(),
            game: edge.game.code().to_string(),
            weight: edge.weight,
            first_seen: encode_time(&edge.first_seen),
            last_seen: encode_time(&edge.last_seen),
            monthly_counts_json: encode_json(&edge.monthly_counts)?,
            format_periods_json: encode_json(&edge.format_periods)?,
            metadata_json: encode_json(&edge.metadata)?,
        })
    }

    pub fn into_edge(self) -> GraphResult<CoEdge> {
        let what = format!("edge '{}|||{}'", self.card1, self.card2);
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(GraphError::corrupt(&what, format!("invalid weight {}", self.weight)));
        }
        let key = EdgeKey::new(
            decode_game(&self.game, &what)?,
            self.card1.as_str(),
            self.card2.as_str(),
        );
        let mut edge = CoEdge::new(key, decode_time(&self.first_seen, &what)?);
        edge.weight = self.weight;
        edge.last_seen = decode_time(&self.last_seen, &what)?;
        edge.monthly_counts = decode_json(Some(&self.monthly_counts_json), &what)?;
        edge.format_periods = decode_json(Some(&self.format_periods_json), &what)?;
        edge.metadata = decode_json(Some(&self.metadata_json), &what)?;
        Ok(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Contribution, EdgeKey};
    use crate::types::parse_timestamp;

    fn sample_edge() -> CoEdge {
        let ts = parse_timestamp("2024-01-15").unwrap();
        let mut edge = CoEdge::new(EdgeKey::new(Game::Magic, "Lightning Bolt", "Chain Lightning"), ts);
        let partitions = vec!["Main".to_string()];
        edge.record(
            Contribution {
                increment: 2.0,
                timestamp: ts,
                deck_id: Some("burn-1"),
                format: Some("Modern"),
                archetype: Some("Burn"),
                placement: Some(3),
                event_date: Some("2024-01-14"),
            },
            &partitions,
        );
        edge
    }

    #[test]
    fn test_edge_row_roundtrip() {
        let edge = sample_edge();
        let row = EdgeRow::from_edge(&edge).unwrap();
        assert_eq!(row.card1, "Chain Lightning");
        assert_eq!(row.game, "MTG");
        assert_eq!(row.into_edge().unwrap(), edge);
    }

    #[test]
    fn test_edge_row_canonicalizes_swapped_names() {
        let mut row = EdgeRow::from_edge(&sample_edge()).unwrap();
        std::mem::swap(&mut row.card1, &mut row.card2);
        let edge = row.into_edge().unwrap();
        assert_eq!(edge.card1.as_ref(), "Chain Lightning");
    }

    #[test]
    fn test_node_row_roundtrip() {
        let ts = parse_timestamp("2024-01-15T12:30:00Z").unwrap();
        let mut node = CardNode::new(CardKey::new(Game::Yugioh, "Ash Blossom"), ts);
        node.observe(ts);
        node.attributes
            .insert("type".into(), serde_json::json!("Monster"));
        let row = NodeRow::from_node(&node).unwrap();
        assert_eq!(row.game, "YGO");
        assert_eq!(row.into_node().unwrap(), node);
    }

    #[test]
    fn test_corrupt_columns_are_reported() {
        let mut row = EdgeRow::from_edge(&sample_edge()).unwrap();
        row.monthly_counts_json = "{not json".into();
        let err = row.into_edge().unwrap_err();
        assert!(matches!(err, GraphError::Corrupt { .. }), "got {err}");

        let mut row = EdgeRow::from_edge(&sample_edge()).unwrap();
        row.game = "CHESS".into();
        assert!(row.into_edge().is_err());

        let mut row = EdgeRow::from_edge(&sample_edge()).unwrap();
        row.weight = f64::NAN;
        assert!(row.into_edge().is_err());
    }

    #[test]
    fn test_null_json_columns_decode_empty() {
        let map: std::collections::BTreeMap<String, f64> = decode_json(None, "x").unwrap();
        assert!(map.is_empty());
        let map: std::collections::BTreeMap<String, f64> = decode_json(Some("null"), "x").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_time_roundtrip() {
        let ts = parse_timestamp("2024-02-29T23:59:59.250Z").unwrap();
        assert_eq!(decode_time(&encode_time(&ts), "t").unwrap(), ts);
        assert!(decode_time("yesterday", "t").is_err());
    }
}
