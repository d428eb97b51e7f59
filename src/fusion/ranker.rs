//! Multi-signal late-fusion ranking.
//!
//! A query runs in four stages:
//!
//! ```text
//! candidates   graph neighbours ∪ two-hop expansion ∪ candidate sources
//! scoring      every enabled signal × every candidate → Option<f64>
//! fusion       Aggregator over the score matrix
//! ordering     score desc, name asc, optional MMR, truncate to k
//! ```
//!
//! Only the candidate pool is scored, never the full vocabulary. Scoring is
//! the expensive part and runs on rayon when enabled; the matrix is
//! collected in candidate order so both paths produce the same ranking.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use super::aggregate::{Aggregator, ScoreMatrix};
use super::budget::QueryBudget;
use super::graph_signals::{JaccardSignal, TemporalSignal};
use super::signal::{sanitize, CandidateSource, SimilaritySignal};
use super::weights::{FusionWeights, SignalKind};
use crate::graph::temporal::TemporalParams;
use crate::graph::CardGraph;
use crate::types::{CardKey, Game};

/// Tuning knobs of the ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct RankerConfig {
    pub weights: FusionWeights,
    pub aggregator: Aggregator,
    /// Max graph neighbours taken as candidates
    pub candidate_pool: usize,
    /// Max candidates requested from each candidate source
    pub embedding_top_n: usize,
    /// Expand to two hops when the query has fewer neighbours than this
    pub two_hop_threshold: usize,
    /// Number of neighbours whose own neighbours are added on expansion
    pub two_hop_fanout: usize,
    /// Additive RRF smoothing constant
    pub rrf_k: f64,
    /// MMR trade-off; 0 disables re-ranking
    pub mmr_lambda: f64,
    /// Edges lighter than this are ignored by the Jaccard signal
    pub jaccard_min_weight: f64,
    pub parallel: bool,
    /// Per-query deadline; `None` means unlimited
    pub deadline: Option<Duration>,
    pub temporal: TemporalParams,
    /// Fixed "now" for temporal scoring
    pub reference_time: Option<DateTime<Utc>>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            aggregator: Aggregator::default(),
            candidate_pool: 100,
            embedding_top_n: 50,
            two_hop_threshold: 10,
            two_hop_fanout: 5,
            rrf_k: 0.0,
            mmr_lambda: 0.0,
            jaccard_min_weight: 0.0,
            parallel: true,
            deadline: None,
            temporal: TemporalParams::default(),
            reference_time: None,
        }
    }
}

/// One ranked candidate with its per-signal breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub card: CardKey,
    /// Raw score per invoked signal; `None` = no data
    pub signals: BTreeMap<SignalKind, Option<f64>>,
    pub score: f64,
}

/// Late-fusion ranker over one game's graph and providers.
///
/// Holds only shared read-only references, so one ranker can serve any
/// number of concurrent queries.
pub struct FusionRanker {
    graph: Arc<CardGraph>,
    game: Game,
    config: RankerConfig,
    jaccard: Arc<JaccardSignal>,
    reference: DateTime<Utc>,
    signals: Vec<Arc<dyn SimilaritySignal>>,
    sources: Vec<Arc<dyn CandidateSource>>,
}

impl FusionRanker {
    /// Ranker with the graph-native Jaccard and temporal signals registered.
    ///
    /// The temporal reference time is the configured one, else the graph's
    /// last update, else the current time.
    pub fn new(graph: Arc<CardGraph>, game: Game, config: RankerConfig) -> Self {
        let reference = config
            .reference_time
            .or_else(|| graph.last_update())
            .unwrap_or_else(Utc::now);
        let jaccard = Arc::new(JaccardSignal::new(graph.clone(), config.jaccard_min_weight));
        let temporal = Arc::new(TemporalSignal::new(
            graph.clone(),
            reference,
            config.temporal.clone(),
        ));
        let signals: Vec<Arc<dyn SimilaritySignal>> = vec![
            jaccard.clone() as Arc<dyn SimilaritySignal>,
            temporal as Arc<dyn SimilaritySignal>,
        ];
        Self {
            graph,
            game,
            config,
            jaccard,
            reference,
            signals,
            sources: Vec::new(),
        }
    }

    /// Register a provider, replacing any signal of the same kind.
    pub fn with_signal(mut self, signal: Arc<dyn SimilaritySignal>) -> Self {
        let kind = signal.kind();
        self.signals.retain(|s| s.kind() != kind);
        self.signals.push(signal);
        self.signals.sort_by_key(|s| s.kind());
        self
    }

    pub fn with_candidate_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference
    }

    pub fn graph(&self) -> &Arc<CardGraph> {
        &self.graph
    }

    /// Whether any graph, signal or candidate source has data for `card`.
    pub fn knows(&self, card: &CardKey) -> bool {
        self.graph.has_card(card)
            || self.signals.iter().any(|s| s.knows(card))
            || self.sources.iter().any(|s| s.knows(card))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Top `k` cards similar to `card`, best first.
    ///
    /// Empty when the card is unknown everywhere or `k` is 0.
    pub fn similar(&self, card: &str, k: usize) -> Vec<(Arc<str>, f64)> {
        let budget = QueryBudget::from_timeout(self.config.deadline);
        self.similar_with_budget(card, k, &budget)
    }

    pub fn similar_with_budget(
        &self,
        card: &str,
        k: usize,
        budget: &QueryBudget,
    ) -> Vec<(Arc<str>, f64)> {
        self.similar_scored(card, k, budget)
            .into_iter()
            .map(|c| (c.card.name, c.score))
            .collect()
    }

    /// Like [`FusionRanker::similar`] but keeps the per-signal scores.
    pub fn similar_scored(&self, card: &str, k: usize, budget: &QueryBudget) -> Vec<ScoredCandidate> {
        let query = CardKey::new(self.game, card);
        if k == 0 || !self.knows(&query) {
            debug!(card = %query, "query card unknown or k = 0");
            return Vec::new();
        }

        let mut pool = self.candidates(&query);
        pool.remove(&query.name);
        let names: Vec<Arc<str>> = pool.into_iter().collect();
        if names.is_empty() {
            return Vec::new();
        }

        let (kinds, rows) = self.score_matrix(&query, &names, budget);
        let matrix = ScoreMatrix {
            kinds: &kinds,
            names: &names,
            rows: &rows,
        };
        let fused = self
            .config
            .aggregator
            .fuse(&matrix, &self.config.weights, self.config.rrf_k);

        let mut ranked: Vec<ScoredCandidate> = names
            .iter()
            .zip(rows)
            .zip(fused)
            .map(|((name, row), score)| ScoredCandidate {
                card: CardKey::new(self.game, name.clone()),
                signals: kinds.iter().copied().zip(row).collect(),
                score,
            })
            .collect();
        sort_ranked(&mut ranked);
        self.finish(ranked, k)
    }

    /// Top `k` cards similar to a set of cards.
    ///
    /// Each candidate's fused score is averaged over the known queries.
    /// Every query card is excluded from the output.
    pub fn similar_multi(&self, cards: &[&str], k: usize) -> Vec<(Arc<str>, f64)> {
        let queries: Vec<CardKey> = cards
            .iter()
            .map(|c| CardKey::new(self.game, *c))
            .filter(|q| self.knows(q))
            .collect();
        if k == 0 || queries.is_empty() {
            return Vec::new();
        }

        let mut pool = BTreeSet::new();
        for query in &queries {
            pool.extend(self.candidates(query));
        }
        for card in cards {
            pool.remove(*card);
        }
        let names: Vec<Arc<str>> = pool.into_iter().collect();
        if names.is_empty() {
            return Vec::new();
        }

        let budget = QueryBudget::from_timeout(self.config.deadline);
        let mut totals = vec![0.0; names.len()];
        for query in &queries {
            let (kinds, rows) = self.score_matrix(query, &names, &budget);
            let matrix = ScoreMatrix {
                kinds: &kinds,
                names: &names,
                rows: &rows,
            };
            let fused = self
                .config
                .aggregator
                .fuse(&matrix, &self.config.weights, self.config.rrf_k);
            for (total, score) in totals.iter_mut().zip(fused) {
                *total += score;
            }
        }

        let n = queries.len() as f64;
        let mut ranked: Vec<ScoredCandidate> = names
            .into_iter()
            .zip(totals)
            .map(|(name, total)| ScoredCandidate {
                card: CardKey::new(self.game, name),
                signals: BTreeMap::new(),
                score: total / n,
            })
            .collect();
        sort_ranked(&mut ranked);
        self.finish(ranked, k)
            .into_iter()
            .map(|c| (c.card.name, c.score))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Candidate generation
    // ═══════════════════════════════════════════════════════════════════════

    fn candidates(&self, query: &CardKey) -> BTreeSet<Arc<str>> {
        let pool = self.config.candidate_pool;
        let neighbors = self.graph.neighbors(query, Some(pool));
        let mut out: BTreeSet<Arc<str>> = neighbors.iter().map(|(n, _)| n.clone()).collect();

        if neighbors.len() < self.config.two_hop_threshold {
            for (hop, _) in neighbors.iter().take(self.config.two_hop_fanout) {
                let hop = CardKey::new(self.game, hop.clone());
                out.extend(
                    self.graph
                        .neighbors(&hop, Some(pool))
                        .into_iter()
                        .map(|(n, _)| n),
                );
            }
        }

        for source in &self.sources {
            out.extend(
                source
                    .top_n_similar(query, self.config.embedding_top_n)
                    .into_iter()
                    .filter(|(c, _)| c.game == self.game)
                    .map(|(c, _)| c.name),
            );
        }

        out.remove(&query.name);
        out
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Scoring
    // ═══════════════════════════════════════════════════════════════════════

    fn score_matrix(
        &self,
        query: &CardKey,
        names: &[Arc<str>],
        budget: &QueryBudget,
    ) -> (Vec<SignalKind>, Vec<Vec<Option<f64>>>) {
        let active: Vec<&Arc<dyn SimilaritySignal>> = self
            .signals
            .iter()
            .filter(|s| self.config.weights.weight(s.kind()) > 0.0)
            .collect();
        let kinds: Vec<SignalKind> = active.iter().map(|s| s.kind()).collect();

        let exhausted = AtomicBool::new(false);
        let failures = AtomicUsize::new(0);
        let score_one = |name: &Arc<str>| -> Vec<Option<f64>> {
            let candidate = CardKey::new(self.game, name.clone());
            active
                .iter()
                .map(|signal| {
                    if budget.is_exhausted() {
                        exhausted.store(true, Ordering::Relaxed);
                        return None;
                    }
                    // A panicking provider is contained to its own cell.
                    match panic::catch_unwind(AssertUnwindSafe(|| signal.score(query, &candidate))) {
                        Ok(Ok(score)) => sanitize(score),
                        Ok(Err(e)) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                signal = %signal.kind(),
                                query = %query,
                                candidate = %candidate,
                                error = %e,
                                "signal failed, scoring as unavailable"
                            );
                            None
                        }
                        Err(payload) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                signal = %signal.kind(),
                                query = %query,
                                candidate = %candidate,
                                panic = panic_message(payload.as_ref()),
                                "signal panicked, scoring as unavailable"
                            );
                            None
                        }
                    }
                })
                .collect()
        };

        let rows: Vec<Vec<Option<f64>>> = if self.config.parallel {
            names.par_iter().map(score_one).collect()
        } else {
            names.iter().map(score_one).collect()
        };

        if exhausted.load(Ordering::Relaxed) {
            warn!(query = %query, "query budget exhausted, returning partial ranking");
        }
        let unavailable = rows.iter().flatten().filter(|s| s.is_none()).count();
        debug!(
            query = %query,
            candidates = names.len(),
            signals = kinds.len(),
            unavailable,
            failures = failures.load(Ordering::Relaxed),
            "scored candidate pool"
        );
        (kinds, rows)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Ordering
    // ═══════════════════════════════════════════════════════════════════════

    fn finish(&self, mut ranked: Vec<ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
        let lambda = self.config.mmr_lambda;
        if lambda > 0.0 && lambda < 1.0 && ranked.len() > 1 {
            ranked = self.mmr(ranked, k, lambda);
        }
        ranked.truncate(k);
        ranked
    }

    /// Maximal Marginal Relevance selection of up to `k` candidates.
    ///
    /// Redundancy is the Jaccard overlap with the already selected cards.
    /// Output is in selection order; scores are left untouched.
    fn mmr(&self, ranked: Vec<ScoredCandidate>, k: usize, lambda: f64) -> Vec<ScoredCandidate> {
        let mut remaining = ranked;
        let mut selected: Vec<ScoredCandidate> = Vec::with_capacity(k.min(remaining.len()));
        while selected.len() < k && !remaining.is_empty() {
            let mut best = 0;
            let mut best_value = f64::NEG_INFINITY;
            for (i, candidate) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .filter_map(|s| self.jaccard.similarity(&candidate.card, &s.card))
                    .fold(0.0, f64::max);
                let value = lambda * candidate.score - (1.0 - lambda) * redundancy;
                if value > best_value {
                    best = i;
                    best_value = value;
                }
            }
            selected.push(remaining.remove(best));
        }
        selected
    }
}

fn sort_ranked(ranked: &mut [ScoredCandidate]) {
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.card.name.cmp(&b.card.name))
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use crate::fusion::providers::EmbeddingTable;
    use crate::types::{parse_timestamp, Deck};
    use std::collections::HashMap;

    /// Fixed scores per candidate name, optionally failing on one.
    struct Scripted {
        kind: SignalKind,
        scores: HashMap<String, f64>,
        fail_on: Option<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(kind: SignalKind, scores: &[(&str, f64)]) -> Self {
            Self {
                kind,
                scores: scores.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, name: &str) -> Self {
            self.fail_on = Some(name.to_string());
            self
        }
    }

    impl SimilaritySignal for Scripted {
        fn kind(&self) -> SignalKind {
            self.kind
        }

        fn score(&self, _query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_on.as_deref() == Some(&*candidate.name) {
                return Err(SignalError::provider(self.kind.name(), "boom"));
            }
            Ok(self.scores.get(&*candidate.name).copied())
        }
    }

    fn ts() -> DateTime<Utc> {
        parse_timestamp("2024-01-15").unwrap()
    }

    /// Hub deck: "Hub" with ten partners, plus a side deck linking two of them.
    fn hub_graph() -> Arc<CardGraph> {
        let mut graph = CardGraph::new();
        let partners: Vec<String> = (0..10).map(|i| format!("Card {i}")).collect();
        let mut cards: Vec<(&str, u32)> = vec![("Hub", 4)];
        cards.extend(partners.iter().map(|p| (p.as_str(), 2)));
        graph.add_deck(&Deck::new(Game::Magic).with_partition("Main", cards), "hub", ts());
        let side = Deck::new(Game::Magic).with_partition("Main", [("Card 0", 1), ("Card 1", 1)]);
        graph.add_deck(&side, "side", ts());
        Arc::new(graph)
    }

    fn graph_only() -> RankerConfig {
        RankerConfig {
            weights: FusionWeights::zero()
                .with(SignalKind::Jaccard, 0.5)
                .with(SignalKind::Temporal, 0.5),
            ..RankerConfig::default()
        }
    }

    #[test]
    fn test_excludes_self_and_respects_k() {
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only());
        let out = ranker.similar("Hub", 3);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|(n, _)| &**n != "Hub"));
        assert!(out.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(out.iter().all(|(_, s)| *s >= 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_unknown_query_and_zero_k() {
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only());
        assert!(ranker.similar("Nonexistent", 5).is_empty());
        assert!(ranker.similar("Hub", 0).is_empty());
        // Same name, different game.
        let pkm = FusionRanker::new(hub_graph(), Game::Pokemon, graph_only());
        assert!(pkm.similar("Hub", 5).is_empty());
    }

    #[test]
    fn test_deterministic_and_parallel_matches_sequential() {
        let graph = hub_graph();
        let par = FusionRanker::new(graph.clone(), Game::Magic, graph_only());
        let seq = FusionRanker::new(
            graph,
            Game::Magic,
            RankerConfig {
                parallel: false,
                ..graph_only()
            },
        );
        let a = par.similar("Card 0", 10);
        assert_eq!(a, par.similar("Card 0", 10));
        assert_eq!(a, seq.similar("Card 0", 10));
    }

    #[test]
    fn test_failing_provider_keeps_candidate() {
        let scores: Vec<(String, f64)> = (0..10).map(|i| (format!("Card {i}"), 0.5)).collect();
        let refs: Vec<(&str, f64)> = scores.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        let gnn = Scripted::new(SignalKind::Gnn, &refs).failing_on("Card 3");
        let config = RankerConfig {
            weights: graph_only().weights.with(SignalKind::Gnn, 1.0),
            ..graph_only()
        };
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, config).with_signal(Arc::new(gnn));
        let out = ranker.similar("Hub", 10);
        assert_eq!(out.len(), 10);
        assert!(out.iter().any(|(n, _)| &**n == "Card 3"));
        // The failed pair lost its gnn contribution and sinks to the bottom.
        assert_eq!(&*out[9].0, "Card 3");
    }

    /// Panics on one candidate, constant score otherwise.
    struct Panicking {
        on: &'static str,
    }

    impl SimilaritySignal for Panicking {
        fn kind(&self) -> SignalKind {
            SignalKind::Visual
        }

        fn score(&self, _query: &CardKey, candidate: &CardKey) -> Result<Option<f64>, SignalError> {
            if &*candidate.name == self.on {
                panic!("art index corrupted");
            }
            Ok(Some(0.9))
        }
    }

    #[test]
    fn test_panicking_provider_keeps_candidate() {
        let mut graph = CardGraph::new();
        graph.add_deck(
            &Deck::new(Game::Magic).with_partition("Main", [("A", 1), ("B", 1), ("C", 1)]),
            "d1",
            ts(),
        );
        let ranker = FusionRanker::new(Arc::new(graph), Game::Magic, RankerConfig::default())
            .with_signal(Arc::new(Panicking { on: "B" }));
        let scored = ranker.similar_scored("A", 5, &QueryBudget::unlimited());
        assert_eq!(scored.len(), 2);
        let b = scored.iter().find(|c| &*c.card.name == "B").unwrap();
        assert_eq!(b.signals[&SignalKind::Visual], None);
        let c = scored.iter().find(|c| &*c.card.name == "C").unwrap();
        assert_eq!(c.signals[&SignalKind::Visual], Some(0.9));
        assert_eq!(&*scored[0].card.name, "C");
    }

    /// Sleeps on every call so a short deadline expires mid-pool.
    struct Slow {
        calls: AtomicUsize,
    }

    impl SimilaritySignal for Slow {
        fn kind(&self) -> SignalKind {
            SignalKind::Gnn
        }

        fn score(&self, _query: &CardKey, _candidate: &CardKey) -> Result<Option<f64>, SignalError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(Duration::from_millis(20));
            Ok(Some(0.7))
        }
    }

    #[test]
    fn test_deadline_cuts_off_slow_provider() {
        let slow = Arc::new(Slow {
            calls: AtomicUsize::new(0),
        });
        let config = RankerConfig {
            weights: graph_only().weights.with(SignalKind::Gnn, 1.0),
            parallel: false,
            deadline: Some(Duration::from_millis(5)),
            ..graph_only()
        };
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, config).with_signal(slow.clone());
        let out = ranker.similar("Hub", 10);
        // Every candidate is still returned, just without the late scores.
        assert_eq!(out.len(), 10);
        assert!(slow.calls.load(Ordering::Relaxed) < 10);
    }

    #[test]
    fn test_zero_weight_signal_is_not_invoked() {
        let visual = Arc::new(Scripted::new(SignalKind::Visual, &[("Card 0", 1.0)]));
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only())
            .with_signal(visual.clone());
        let scored = ranker.similar_scored("Hub", 5, &QueryBudget::unlimited());
        assert_eq!(visual.calls.load(Ordering::Relaxed), 0);
        assert!(scored.iter().all(|c| !c.signals.contains_key(&SignalKind::Visual)));
    }

    #[test]
    fn test_exhausted_budget_returns_partial_ranking() {
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only());
        let budget = QueryBudget::unlimited();
        budget.cancel_token().cancel();
        let out = ranker.similar_with_budget("Hub", 4, &budget);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|(_, s)| *s == 0.0));
        // All tied at zero: name order.
        let names: Vec<&str> = out.iter().map(|(n, _)| &**n).collect();
        assert_eq!(names, vec!["Card 0", "Card 1", "Card 2", "Card 3"]);
    }

    #[test]
    fn test_two_hop_expansion() {
        let mut graph = CardGraph::new();
        graph.add_deck(
            &Deck::new(Game::Magic).with_partition("Main", [("A", 1), ("B", 1)]),
            "d1",
            ts(),
        );
        graph.add_deck(
            &Deck::new(Game::Magic).with_partition("Main", [("B", 1), ("C", 1)]),
            "d2",
            ts(),
        );
        let graph = Arc::new(graph);

        let expanding = FusionRanker::new(graph.clone(), Game::Magic, graph_only());
        let names: Vec<Arc<str>> = expanding.similar("A", 5).into_iter().map(|(n, _)| n).collect();
        assert!(names.iter().any(|n| &**n == "C"));

        let flat = FusionRanker::new(
            graph,
            Game::Magic,
            RankerConfig {
                two_hop_threshold: 0,
                ..graph_only()
            },
        );
        let names: Vec<Arc<str>> = flat.similar("A", 5).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![Arc::<str>::from("B")]);
    }

    #[test]
    fn test_candidate_source_extends_pool() {
        let table = Arc::new(EmbeddingTable::from_vectors(
            SignalKind::Embed,
            Game::Magic,
            [("Hub", vec![1.0, 0.0]), ("Stranger", vec![1.0, 0.1])],
        ));
        let config = RankerConfig {
            weights: graph_only().weights.with(SignalKind::Embed, 1.0),
            ..graph_only()
        };
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, config)
            .with_signal(table.clone())
            .with_candidate_source(table);
        let scored = ranker.similar_scored("Hub", 20, &QueryBudget::unlimited());
        let stranger = scored.iter().find(|c| &*c.card.name == "Stranger").unwrap();
        assert_eq!(stranger.signals[&SignalKind::Jaccard], None);
        assert!(stranger.signals[&SignalKind::Embed].unwrap() > 0.9);
    }

    #[test]
    fn test_known_only_to_provider() {
        let table = Arc::new(EmbeddingTable::from_vectors(
            SignalKind::Embed,
            Game::Magic,
            [("Fresh", vec![1.0, 0.0]), ("Card 0", vec![1.0, 0.0])],
        ));
        let config = RankerConfig {
            weights: FusionWeights::zero().with(SignalKind::Embed, 1.0),
            ..graph_only()
        };
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, config)
            .with_signal(table.clone())
            .with_candidate_source(table);
        let out = ranker.similar("Fresh", 3);
        assert_eq!(out.len(), 1);
        assert_eq!(&*out[0].0, "Card 0");
    }

    #[test]
    fn test_similar_multi_excludes_all_queries() {
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only());
        let out = ranker.similar_multi(&["Card 0", "Card 1", "Unknown"], 20);
        assert!(!out.is_empty());
        assert!(out
            .iter()
            .all(|(n, _)| !["Card 0", "Card 1", "Unknown"].contains(&&**n)));
        assert!(ranker.similar_multi(&["Unknown"], 5).is_empty());
    }

    #[test]
    fn test_mmr_keeps_top_candidate_first() {
        let graph = hub_graph();
        let plain = FusionRanker::new(graph.clone(), Game::Magic, graph_only());
        let diverse = FusionRanker::new(
            graph,
            Game::Magic,
            RankerConfig {
                mmr_lambda: 0.5,
                ..graph_only()
            },
        );
        let a = plain.similar("Card 0", 5);
        let b = diverse.similar("Card 0", 5);
        assert_eq!(b.len(), 5);
        assert_eq!(a[0], b[0]);
    }

    #[test]
    fn test_with_signal_replaces_same_kind() {
        let ranker = FusionRanker::new(hub_graph(), Game::Magic, graph_only())
            .with_signal(Arc::new(Scripted::new(SignalKind::Jaccard, &[])));
        let scored = ranker.similar_scored("Hub", 3, &QueryBudget::unlimited());
        assert!(scored.iter().all(|c| c.signals[&SignalKind::Jaccard].is_none()));
    }
}
