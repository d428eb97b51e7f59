//! Configuration loading from cardgraph.toml.
//!
//! ## Example
//!
//! ```toml
//! [graph]
//! path = "data/graph.db"
//! dedup = "skip-duplicates"
//!
//! [fusion]
//! aggregator = "rrf"
//! candidate-pool = 200
//! deadline-ms = 250
//!
//! [fusion.weights]
//! gnn = 0.0
//! jaccard = 0.6
//!
//! [temporal]
//! decay-days = 180
//! reference-time = "2024-06-01"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fusion::{Aggregator, FusionWeights, RankerConfig, SignalKind};
use crate::graph::DedupPolicy;
use crate::storage::StorageBackend;
use crate::types::parse_timestamp;

/// File name searched for by [`Config::load`].
pub const CONFIG_FILE: &str = "cardgraph.toml";

/// Graph file used when none is configured.
pub const DEFAULT_GRAPH_PATH: &str = "cardgraph.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Where and how the graph is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    pub path: PathBuf,
    pub backend: StorageBackend,
    pub dedup: DedupPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        let path = PathBuf::from(DEFAULT_GRAPH_PATH);
        Self {
            backend: StorageBackend::from_path(&path),
            path,
            dedup: DedupPolicy::default(),
        }
    }
}

/// cardgraph configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Source file for this config (for display).
    pub source: Option<PathBuf>,
    pub graph: GraphConfig,
    pub ranker: RankerConfig,
}

/// Raw config as deserialized from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    graph: Option<RawGraph>,
    fusion: Option<RawFusion>,
    temporal: Option<RawTemporal>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawGraph {
    path: Option<String>,
    backend: Option<String>,
    dedup: Option<DedupPolicy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawFusion {
    aggregator: Option<String>,
    candidate_pool: Option<usize>,
    embedding_top_n: Option<usize>,
    two_hop_threshold: Option<usize>,
    two_hop_fanout: Option<usize>,
    rrf_k: Option<f64>,
    mmr_lambda: Option<f64>,
    deadline_ms: Option<u64>,
    parallel: Option<bool>,
    jaccard_min_weight: Option<f64>,
    format: Option<String>,
    weights: Option<FusionWeights>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawTemporal {
    decay_days: Option<f64>,
    trend_lookback_months: Option<usize>,
    reference_time: Option<String>,
}

impl Config {
    /// Load configuration from the given directory.
    ///
    /// Search order:
    /// 1. cardgraph.toml in directory
    /// 2. Walk up parent directories for cardgraph.toml
    /// 3. Default config if nothing found
    ///
    /// A file that fails to parse is reported and the defaults are used.
    pub fn load(directory: &Path) -> Self {
        let mut current = Some(directory);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Self::load_file(&candidate).unwrap_or_else(|e| {
                    warn!(path = %candidate.display(), error = %e, "ignoring invalid config");
                    Self::default()
                });
            }
            current = dir.parent();
        }
        debug!(dir = %directory.display(), "no {CONFIG_FILE} found, using defaults");
        Self::default()
    }

    /// Load one config file. Relative graph paths resolve against its directory.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if config.graph.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.graph.path = dir.join(&config.graph.path);
            }
        }
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let graph = Self::graph_from_raw(raw.graph.unwrap_or_default())?;
        let mut ranker = Self::fusion_from_raw(raw.fusion.unwrap_or_default())?;
        Self::temporal_from_raw(raw.temporal.unwrap_or_default(), &mut ranker)?;
        Ok(Self {
            source: None,
            graph,
            ranker,
        })
    }

    fn graph_from_raw(raw: RawGraph) -> Result<GraphConfig, ConfigError> {
        let path = raw
            .path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GRAPH_PATH));
        let backend = match raw.backend {
            Some(b) => StorageBackend::from_str(&b).map_err(|e| ConfigError::invalid("graph.backend", e))?,
            None => StorageBackend::from_path(&path),
        };
        Ok(GraphConfig {
            path,
            backend,
            dedup: raw.dedup.unwrap_or_default(),
        })
    }

    fn fusion_from_raw(raw: RawFusion) -> Result<RankerConfig, ConfigError> {
        let defaults = RankerConfig::default();
        let aggregator = match raw.aggregator {
            Some(a) => Aggregator::from_str(&a).map_err(|e| ConfigError::invalid("fusion.aggregator", e))?,
            None => defaults.aggregator,
        };

        let mmr_lambda = raw.mmr_lambda.unwrap_or(defaults.mmr_lambda);
        if !(0.0..=1.0).contains(&mmr_lambda) {
            return Err(ConfigError::invalid(
                "fusion.mmr-lambda",
                format!("{mmr_lambda} is outside [0, 1]"),
            ));
        }
        let rrf_k = raw.rrf_k.unwrap_or(defaults.rrf_k);
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(ConfigError::invalid("fusion.rrf-k", format!("{rrf_k} must be >= 0")));
        }

        // Re-apply through `with` so negative or NaN weights are zeroed.
        let weights = raw.weights.map_or(defaults.weights, |w| {
            SignalKind::ALL
                .into_iter()
                .fold(FusionWeights::zero(), |acc, k| acc.with(k, w.weight(k)))
        });

        let mut temporal = defaults.temporal.clone();
        temporal.format = raw.format.filter(|f| !f.trim().is_empty());

        Ok(RankerConfig {
            weights,
            aggregator,
            candidate_pool: raw.candidate_pool.unwrap_or(defaults.candidate_pool),
            embedding_top_n: raw.embedding_top_n.unwrap_or(defaults.embedding_top_n),
            two_hop_threshold: raw.two_hop_threshold.unwrap_or(defaults.two_hop_threshold),
            two_hop_fanout: raw.two_hop_fanout.unwrap_or(defaults.two_hop_fanout),
            rrf_k,
            mmr_lambda,
            jaccard_min_weight: raw.jaccard_min_weight.unwrap_or(defaults.jaccard_min_weight),
            parallel: raw.parallel.unwrap_or(defaults.parallel),
            deadline: raw.deadline_ms.map(Duration::from_millis).or(defaults.deadline),
            temporal,
            reference_time: defaults.reference_time,
        })
    }

    fn temporal_from_raw(raw: RawTemporal, ranker: &mut RankerConfig) -> Result<(), ConfigError> {
        if let Some(days) = raw.decay_days {
            if !days.is_finite() || days <= 0.0 {
                return Err(ConfigError::invalid("temporal.decay-days", format!("{days} must be > 0")));
            }
            ranker.temporal.decay_days = days;
        }
        if let Some(months) = raw.trend_lookback_months {
            ranker.temporal.trend_lookback_months = months;
        }
        if let Some(raw_ts) = raw.reference_time {
            let ts = parse_timestamp(&raw_ts).ok_or_else(|| {
                ConfigError::invalid("temporal.reference-time", format!("cannot parse '{raw_ts}'"))
            })?;
            ranker.reference_time = Some(ts);
        }
        Ok(())
    }

    /// Format config for verbose display.
    pub fn display_summary(&self) -> String {
        let mut lines = Vec::new();

        if let Some(ref source) = self.source {
            lines.push(format!("   Config: {}", source.display()));
        } else {
            lines.push("   Config: (defaults)".to_string());
        }
        lines.push(format!(
            "   Graph: {} ({:?}, {:?})",
            self.graph.path.display(),
            self.graph.backend,
            self.graph.dedup
        ));

        let enabled: Vec<String> = self
            .ranker
            .weights
            .enabled()
            .map(|k| format!("{k}={:.2}", self.ranker.weights.weight(k)))
            .collect();
        lines.push(format!(
            "   Fusion: {:?} over {}",
            self.ranker.aggregator,
            enabled.join(", ")
        ));
        if let Some(deadline) = self.ranker.deadline {
            lines.push(format!("   Deadline: {}ms", deadline.as_millis()));
        }

        lines.join("\n")
    }
}
