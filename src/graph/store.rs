//! The incremental co-occurrence graph.
//!
//! Cards are nodes, co-occurrence is an undirected weighted edge. The store
//! is built one deck at a time and answers point, neighbourhood and range
//! queries against the current in-memory state.
//!
//! # Ingestion
//!
//! ```text
//! deck ──► per-card tallies (summed over partitions)
//!            │
//!            ├─► node stats: total_decks += 1, first/last seen
//!            └─► every unordered pair (a, b):
//!                   weight          += min(count_a, count_b)
//!                   monthly[YYYY-MM] += same increment
//!                   format_periods[format] updated
//! ```
//!
//! Mutation takes `&mut self`, so a single writer is enforced by the borrow
//! checker; shared `&CardGraph` (or `Arc<CardGraph>`) readers never observe
//! partial updates.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{CardNode, CoEdge, Contribution, EdgeKey};
use crate::error::{GraphError, GraphResult};
use crate::storage::{GraphSnapshot, GraphStorage};
use crate::types::{CardKey, Deck, DeckMetadata, DeckRecord, Game};

/// What to do when a `deck_id` is ingested a second time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Track ingested ids and ignore repeats
    #[default]
    SkipDuplicates,
    /// Count every ingestion, even of an id already seen
    AtLeastOnce,
}

/// Result of a single `add_deck` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested {
        /// Distinct cards in the deck
        cards: usize,
        /// Unordered pairs whose edges were incremented
        pairs: usize,
    },
    /// Skipped under `DedupPolicy::SkipDuplicates`
    Duplicate,
}

/// Counts from a batch ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.ingested + self.duplicates + self.malformed
    }
}

/// Range query over edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeFilter {
    pub game: Option<Game>,
    pub min_weight: f64,
    /// Keep only edges observed under this format
    pub format: Option<String>,
    /// Keep only edges last seen at or after this time
    pub since: Option<DateTime<Utc>>,
}

impl EdgeFilter {
    fn matches(&self, edge: &CoEdge) -> bool {
        self.game.map_or(true, |g| edge.game == g)
            && edge.weight >= self.min_weight
            && self
                .format
                .as_deref()
                .map_or(true, |f| edge.metadata.formats.contains(f) || edge.format_periods.contains_key(f))
            && self.since.map_or(true, |s| edge.last_seen >= s)
    }
}

/// Node and edge counts for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GameCounts {
    pub nodes: usize,
    pub edges: usize,
}

/// Aggregate statistics of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub total_decks_processed: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub avg_edge_weight: f64,
    pub max_edge_weight: f64,
    pub per_game: BTreeMap<Game, GameCounts>,
}

/// Incrementally built card co-occurrence graph.
///
/// Backed by a petgraph `UnGraph` with hash indexes from card keys and
/// canonical edge keys to graph indices. Nodes and edges are never removed,
/// so indices stay valid for the lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct CardGraph {
    graph: UnGraph<CardNode, CoEdge>,
    node_index: HashMap<CardKey, NodeIndex>,
    edge_index: HashMap<EdgeKey, EdgeIndex>,
    policy: DedupPolicy,
    /// Metadata registered ahead of `add_deck`, keyed by deck id
    deck_metadata: HashMap<String, DeckMetadata>,
    ingested_decks: BTreeSet<String>,
    total_decks_processed: u64,
    last_update: Option<DateTime<Utc>>,
}

impl CardGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        self.policy
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ingestion
    // ═══════════════════════════════════════════════════════════════════════

    /// Register format/archetype for a deck that will be ingested later.
    ///
    /// Values set here take precedence over the deck's own metadata.
    pub fn set_deck_metadata(&mut self, deck_id: impl Into<String>, metadata: DeckMetadata) {
        self.deck_metadata.insert(deck_id.into(), metadata);
    }

    /// Ingest one deck observed at `timestamp`.
    ///
    /// Every unordered pair of distinct cards gets `min(count_a, count_b)`
    /// added to its edge. A deck with fewer than two distinct cards still
    /// updates node statistics but creates no edges.
    pub fn add_deck(&mut self, deck: &Deck, deck_id: &str, timestamp: DateTime<Utc>) -> IngestOutcome {
        if self.policy == DedupPolicy::SkipDuplicates && self.ingested_decks.contains(deck_id) {
            debug!(deck_id, "skipping already-ingested deck");
            return IngestOutcome::Duplicate;
        }

        let metadata = self
            .deck_metadata
            .get(deck_id)
            .cloned()
            .unwrap_or_default()
            .or(&deck.metadata);
        let format = metadata.format();
        let archetype = metadata.archetype();
        let event_date = metadata.event_date();

        let tallies = deck.card_tallies();
        let mut cards: Vec<(NodeIndex, Arc<str>, u32, &BTreeSet<String>)> =
            Vec::with_capacity(tallies.len());
        for (name, tally) in &tallies {
            let idx = self.upsert_node(CardKey::new(deck.game, name.as_str()), timestamp);
            self.graph[idx].observe(timestamp);
            let interned = self.graph[idx].key.name.clone();
            cards.push((idx, interned, tally.count, &tally.partitions));
        }

        let mut pairs = 0;
        for (i, (a_idx, a_name, a_count, a_parts)) in cards.iter().enumerate() {
            for (b_idx, b_name, b_count, b_parts) in &cards[i + 1..] {
                let contribution = Contribution {
                    increment: f64::from((*a_count).min(*b_count)),
                    timestamp,
                    deck_id: Some(deck_id),
                    format,
                    archetype,
                    placement: metadata.placement,
                    event_date,
                };
                let key = EdgeKey::new(deck.game, a_name.clone(), b_name.clone());
                let edge_idx = match self.edge_index.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let idx = self
                            .graph
                            .add_edge(*a_idx, *b_idx, CoEdge::new(key.clone(), timestamp));
                        self.edge_index.insert(key, idx);
                        idx
                    }
                };
                self.graph[edge_idx].record(contribution, a_parts.union(b_parts));
                pairs += 1;
            }
        }

        self.ingested_decks.insert(deck_id.to_string());
        self.total_decks_processed += 1;
        self.last_update = Some(self.last_update.map_or(timestamp, |t| t.max(timestamp)));

        IngestOutcome::Ingested {
            cards: cards.len(),
            pairs,
        }
    }

    fn upsert_node(&mut self, key: CardKey, seen: DateTime<Utc>) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(CardNode::new(key.clone(), seen));
        self.node_index.insert(key, idx);
        idx
    }

    /// Validate and ingest a batch of raw records.
    ///
    /// Malformed records are logged and counted; the rest of the batch
    /// continues.
    pub fn ingest_records<I>(&mut self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = DeckRecord>,
    {
        let mut report = IngestReport::default();
        for record in records {
            match record.validate() {
                Ok(valid) => match self.add_deck(&valid.deck, &valid.deck_id, valid.timestamp) {
                    IngestOutcome::Ingested { .. } => report.ingested += 1,
                    IngestOutcome::Duplicate => report.duplicates += 1,
                },
                Err(e) => {
                    warn!("skipping deck: {e}");
                    report.malformed += 1;
                }
            }
        }
        info!(
            ingested = report.ingested,
            duplicates = report.duplicates,
            malformed = report.malformed,
            nodes = self.node_count(),
            edges = self.edge_count(),
            "ingestion batch complete"
        );
        report
    }

    /// Drop all nodes and edges, then ingest `records` from scratch.
    ///
    /// Registered deck metadata and the dedup policy are kept.
    pub fn rebuild_from_records<I>(&mut self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = DeckRecord>,
    {
        self.graph = UnGraph::default();
        self.node_index.clear();
        self.edge_index.clear();
        self.ingested_decks.clear();
        self.total_decks_processed = 0;
        self.last_update = None;
        self.ingest_records(records)
    }

    /// Merge enrichment attributes into an existing node.
    ///
    /// Returns false (and creates nothing) for an unknown card.
    pub fn set_card_attributes(
        &mut self,
        card: &CardKey,
        attributes: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> bool {
        let Some(&idx) = self.node_index.get(card) else {
            return false;
        };
        self.graph[idx].attributes.extend(attributes);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn node(&self, card: &CardKey) -> Option<&CardNode> {
        self.node_index.get(card).map(|&idx| &self.graph[idx])
    }

    pub fn has_card(&self, card: &CardKey) -> bool {
        self.node_index.contains_key(card)
    }

    /// Edge between two cards of `game`, in either order.
    pub fn get_edge(&self, game: Game, a: &str, b: &str) -> Option<&CoEdge> {
        let key = EdgeKey::new(game, a, b);
        self.edge_index.get(&key).map(|&idx| &self.graph[idx])
    }

    /// Edges of `game` (all games when `None`) with weight >= `min_weight`,
    /// ordered by canonical key.
    pub fn query_edges(&self, game: Option<Game>, min_weight: f64) -> Vec<&CoEdge> {
        self.filter_edges(&EdgeFilter {
            game,
            min_weight,
            ..EdgeFilter::default()
        })
    }

    /// Edges matching every constraint of `filter`, ordered by canonical key.
    pub fn filter_edges(&self, filter: &EdgeFilter) -> Vec<&CoEdge> {
        let mut edges: Vec<&CoEdge> = self
            .graph
            .edge_weights()
            .filter(|e| filter.matches(e))
            .collect();
        edges.sort_by(|a, b| {
            (a.game, &a.card1, &a.card2).cmp(&(b.game, &b.card1, &b.card2))
        });
        edges
    }

    /// Neighbours of `card` sorted by weight descending, then name ascending.
    pub fn neighbors(&self, card: &CardKey, limit: Option<usize>) -> Vec<(Arc<str>, f64)> {
        let Some(&idx) = self.node_index.get(card) else {
            return Vec::new();
        };
        let mut out: Vec<(Arc<str>, f64)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (self.graph[other].key.name.clone(), e.weight().weight)
            })
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    /// Neighbour names of `card` over edges with weight >= `min_weight`.
    pub fn neighbor_set(&self, card: &CardKey, min_weight: f64) -> HashSet<Arc<str>> {
        let Some(&idx) = self.node_index.get(card) else {
            return HashSet::new();
        };
        self.graph
            .edges(idx)
            .filter(|e| e.weight().weight >= min_weight)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                self.graph[other].key.name.clone()
            })
            .collect()
    }

    /// Adjacency sets of every card in `game` over edges with weight >= `min_weight`.
    pub fn adjacency(&self, game: Game, min_weight: f64) -> HashMap<Arc<str>, HashSet<Arc<str>>> {
        let mut adj: HashMap<Arc<str>, HashSet<Arc<str>>> = HashMap::new();
        for edge in self
            .graph
            .edge_weights()
            .filter(|e| e.game == game && e.weight >= min_weight)
        {
            adj.entry(edge.card1.clone())
                .or_default()
                .insert(edge.card2.clone());
            adj.entry(edge.card2.clone())
                .or_default()
                .insert(edge.card1.clone());
        }
        adj
    }

    /// Cards first seen at or after `since`, in key order.
    pub fn new_cards_since(&self, since: DateTime<Utc>) -> Vec<&CardKey> {
        let mut keys: Vec<&CardKey> = self
            .graph
            .node_weights()
            .filter(|n| n.first_seen >= since)
            .map(|n| &n.key)
            .collect();
        keys.sort();
        keys
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CardNode> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CoEdge> {
        self.graph.edge_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn total_decks_processed(&self) -> u64 {
        self.total_decks_processed
    }

    /// Latest ingestion timestamp seen so far.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn is_ingested(&self, deck_id: &str) -> bool {
        self.ingested_decks.contains(deck_id)
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut per_game: BTreeMap<Game, GameCounts> = BTreeMap::new();
        for node in self.graph.node_weights() {
            per_game.entry(node.key.game).or_default().nodes += 1;
        }
        let mut weight_sum = 0.0;
        let mut max_edge_weight: f64 = 0.0;
        for edge in self.graph.edge_weights() {
            per_game.entry(edge.game).or_default().edges += 1;
            weight_sum += edge.weight;
            max_edge_weight = max_edge_weight.max(edge.weight);
        }

        let num_nodes = self.graph.node_count();
        let num_edges = self.graph.edge_count();
        let max_degree = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges(idx).count())
            .max()
            .unwrap_or(0);

        GraphStatistics {
            num_nodes,
            num_edges,
            total_decks_processed: self.total_decks_processed,
            last_update: self.last_update,
            avg_degree: if num_nodes > 0 {
                2.0 * num_edges as f64 / num_nodes as f64
            } else {
                0.0
            },
            max_degree,
            avg_edge_weight: if num_edges > 0 {
                weight_sum / num_edges as f64
            } else {
                0.0
            },
            max_edge_weight,
            per_game,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════════

    /// Ordered copy of the persistent state.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<CardNode> = self.graph.node_weights().cloned().collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        let edges = self
            .query_edges(None, f64::NEG_INFINITY)
            .into_iter()
            .cloned()
            .collect();
        GraphSnapshot {
            nodes,
            edges,
            last_update: self.last_update,
            total_decks_processed: self.total_decks_processed,
            ingested_decks: self.ingested_decks.clone(),
        }
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Every edge endpoint must exist as a node of the edge's own game. An
    /// endpoint that only exists under another game is a cross-game edge and
    /// is rejected; one that does not exist at all is corruption.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let mut graph = CardGraph {
            total_decks_processed: snapshot.total_decks_processed,
            last_update: snapshot.last_update,
            ingested_decks: snapshot.ingested_decks,
            ..CardGraph::default()
        };

        for node in snapshot.nodes {
            if graph.node_index.contains_key(&node.key) {
                return Err(GraphError::corrupt("snapshot", format!("duplicate node {}", node.key)));
            }
            let key = node.key.clone();
            let idx = graph.graph.add_node(node);
            graph.node_index.insert(key, idx);
        }

        for edge in snapshot.edges {
            let key = EdgeKey::new(edge.game, edge.card1.clone(), edge.card2.clone());
            let (a, b) = key.endpoints();
            let a_idx = graph.resolve_endpoint(&a, &b)?;
            let b_idx = graph.resolve_endpoint(&b, &a)?;
            if a_idx == b_idx {
                return Err(GraphError::corrupt("snapshot", format!("self-loop on {a}")));
            }
            if graph.edge_index.contains_key(&key) {
                return Err(GraphError::corrupt("snapshot", format!("duplicate edge {key}")));
            }
            let mut edge = edge;
            // Intern endpoint names through the node table.
            edge.card1 = graph.graph[a_idx].key.name.clone();
            edge.card2 = graph.graph[b_idx].key.name.clone();
            let idx = graph.graph.add_edge(a_idx, b_idx, edge);
            graph.edge_index.insert(key, idx);
        }

        Ok(graph)
    }

    fn resolve_endpoint(&self, endpoint: &CardKey, other: &CardKey) -> GraphResult<NodeIndex> {
        if let Some(&idx) = self.node_index.get(endpoint) {
            return Ok(idx);
        }
        let foreign = Game::ALL
            .iter()
            .filter(|&&g| g != endpoint.game)
            .map(|&g| CardKey::new(g, endpoint.name.clone()))
            .find(|k| self.node_index.contains_key(k));
        match foreign {
            Some(foreign) => Err(GraphError::CrossGame {
                a: other.clone(),
                b: foreign,
            }),
            None => Err(GraphError::corrupt(
                "snapshot",
                format!("edge endpoint {endpoint} has no node"),
            )),
        }
    }

    /// Persist the current state through `storage`.
    pub fn save(&self, storage: &dyn GraphStorage) -> GraphResult<()> {
        storage.save(&self.snapshot())
    }

    /// Load a graph from `storage`, `None` if nothing has been saved there.
    pub fn load(storage: &dyn GraphStorage) -> GraphResult<Option<Self>> {
        storage.load()?.map(Self::from_snapshot).transpose()
    }
}
