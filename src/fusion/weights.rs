//! Signal identities and their fusion weights.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The similarity signals the ranker knows how to weight.
///
/// Ordering follows declaration order and fixes the order signals are
/// evaluated and reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    /// Co-occurrence embedding (node2vec-style vectors)
    Embed,
    /// Neighbour-set overlap in the co-occurrence graph
    Jaccard,
    /// Functional tag overlap
    Functional,
    /// Card text embedding
    TextEmbed,
    /// Card art embedding
    Visual,
    /// GNN node embedding
    Gnn,
    /// Recency/format-weighted co-occurrence from the graph
    Temporal,
}

impl SignalKind {
    pub const ALL: [SignalKind; 7] = [
        SignalKind::Embed,
        SignalKind::Jaccard,
        SignalKind::Functional,
        SignalKind::TextEmbed,
        SignalKind::Visual,
        SignalKind::Gnn,
        SignalKind::Temporal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Embed => "embed",
            SignalKind::Jaccard => "jaccard",
            SignalKind::Functional => "functional",
            SignalKind::TextEmbed => "text-embed",
            SignalKind::Visual => "visual",
            SignalKind::Gnn => "gnn",
            SignalKind::Temporal => "temporal",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        SignalKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| format!("unknown signal '{s}'"))
    }
}

/// Non-negative weight per signal.
///
/// This unnormalized form is what users configure and what the weighted-sum
/// aggregator uses directly. [`FusionWeights::normalized`] rescales to a sum
/// of 1 for reporting and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FusionWeights {
    pub embed: f64,
    pub jaccard: f64,
    pub functional: f64,
    pub text_embed: f64,
    pub visual: f64,
    pub gnn: f64,
    pub temporal: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            embed: 0.20,
            jaccard: 0.15,
            functional: 0.10,
            text_embed: 0.20,
            visual: 0.05,
            gnn: 0.25,
            temporal: 0.05,
        }
    }
}

impl FusionWeights {
    /// All weights zero; enable signals with [`FusionWeights::with`].
    pub fn zero() -> Self {
        Self {
            embed: 0.0,
            jaccard: 0.0,
            functional: 0.0,
            text_embed: 0.0,
            visual: 0.0,
            gnn: 0.0,
            temporal: 0.0,
        }
    }

    pub fn weight(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Embed => self.embed,
            SignalKind::Jaccard => self.jaccard,
            SignalKind::Functional => self.functional,
            SignalKind::TextEmbed => self.text_embed,
            SignalKind::Visual => self.visual,
            SignalKind::Gnn => self.gnn,
            SignalKind::Temporal => self.temporal,
        }
    }

    fn slot(&mut self, kind: SignalKind) -> &mut f64 {
        match kind {
            SignalKind::Embed => &mut self.embed,
            SignalKind::Jaccard => &mut self.jaccard,
            SignalKind::Functional => &mut self.functional,
            SignalKind::TextEmbed => &mut self.text_embed,
            SignalKind::Visual => &mut self.visual,
            SignalKind::Gnn => &mut self.gnn,
            SignalKind::Temporal => &mut self.temporal,
        }
    }

    /// Set one weight. Negative and non-finite values become 0.
    pub fn with(mut self, kind: SignalKind, weight: f64) -> Self {
        *self.slot(kind) = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        self
    }

    /// Signals with a positive weight, in `SignalKind` order.
    pub fn enabled(&self) -> impl Iterator<Item = SignalKind> + '_ {
        SignalKind::ALL
            .into_iter()
            .filter(move |&k| self.weight(k) > 0.0)
    }

    pub fn total(&self) -> f64 {
        SignalKind::ALL.iter().map(|&k| self.weight(k)).sum()
    }

    /// Rescale so the weights sum to 1.
    ///
    /// An all-zero set has no direction to preserve and normalizes to equal
    /// weights.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        let mut out = *self;
        if total <= 0.0 {
            let equal = 1.0 / SignalKind::ALL.len() as f64;
            for kind in SignalKind::ALL {
                *out.slot(kind) = equal;
            }
        } else {
            for kind in SignalKind::ALL {
                *out.slot(kind) = self.weight(kind) / total;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sum_to_one() {
        let w = FusionWeights::default();
        assert!((w.total() - 1.0).abs() < 1e-9, "total = {}", w.total());
    }

    #[test]
    fn test_normalized() {
        let w = FusionWeights::zero()
            .with(SignalKind::Jaccard, 2.0)
            .with(SignalKind::Temporal, 6.0);
        let n = w.normalized();
        assert!((n.jaccard - 0.25).abs() < 1e-9);
        assert!((n.temporal - 0.75).abs() < 1e-9);
        assert_eq!(n.gnn, 0.0);
        assert!((n.total() - 1.0).abs() < 1e-9);

        let equal = FusionWeights::zero().normalized();
        assert!((equal.total() - 1.0).abs() < 1e-9);
        assert!((equal.visual - equal.embed).abs() < 1e-12);
    }

    #[test]
    fn test_with_rejects_negative() {
        let w = FusionWeights::default()
            .with(SignalKind::Gnn, -1.0)
            .with(SignalKind::Visual, f64::NAN);
        assert_eq!(w.gnn, 0.0);
        assert_eq!(w.visual, 0.0);
    }

    #[test]
    fn test_enabled_order() {
        let w = FusionWeights::zero()
            .with(SignalKind::Temporal, 1.0)
            .with(SignalKind::Embed, 1.0);
        let enabled: Vec<_> = w.enabled().collect();
        assert_eq!(enabled, vec![SignalKind::Embed, SignalKind::Temporal]);
    }

    #[test]
    fn test_signal_kind_parse() {
        assert_eq!("text_embed".parse::<SignalKind>(), Ok(SignalKind::TextEmbed));
        assert_eq!("GNN".parse::<SignalKind>(), Ok(SignalKind::Gnn));
        assert!("sideboard".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_toml_kebab_case() {
        let w: FusionWeights = toml::from_str("text-embed = 0.5\ngnn = 0.0").unwrap();
        assert_eq!(w.text_embed, 0.5);
        assert_eq!(w.gnn, 0.0);
        assert_eq!(w.jaccard, 0.15);
    }
}
