//! Score aggregation strategies.
//!
//! All strategies consume the same candidate × signal matrix of
//! `Option<f64>`. "Unavailable" survives up to this point and is resolved
//! here, differently per strategy:
//!
//! ```text
//! Weighted  Σ w_i · s_i              unavailable s_i counts as 0, no renormalization
//! Rrf       Σ w_i / (k + rank_i)     unavailable signals give no rank and no term
//! CombMax   max of available s_i     0 when nothing is available
//! CombMin   min of available s_i     0 when nothing is available
//! ```
//!
//! Ranks for RRF are 1-based within the candidate pool, ordered by score
//! descending and then candidate name, so equal scores still get distinct,
//! deterministic ranks.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::weights::{FusionWeights, SignalKind};

/// How per-signal scores are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    /// Weighted sum of raw scores
    #[default]
    Weighted,
    /// Reciprocal rank fusion
    Rrf,
    CombMax,
    CombMin,
}

impl FromStr for Aggregator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" | "combsum" => Ok(Aggregator::Weighted),
            "rrf" => Ok(Aggregator::Rrf),
            "combmax" => Ok(Aggregator::CombMax),
            "combmin" => Ok(Aggregator::CombMin),
            other => Err(format!("unknown aggregator '{other}'")),
        }
    }
}

/// Scores of every candidate under every active signal.
///
/// `rows[i][j]` is candidate `names[i]` under signal `kinds[j]`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreMatrix<'a> {
    pub kinds: &'a [SignalKind],
    pub names: &'a [Arc<str>],
    pub rows: &'a [Vec<Option<f64>>],
}

impl Aggregator {
    /// Fused score per candidate, aligned with `matrix.rows`.
    pub fn fuse(&self, matrix: &ScoreMatrix<'_>, weights: &FusionWeights, rrf_k: f64) -> Vec<f64> {
        match self {
            Aggregator::Weighted => matrix
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .zip(matrix.kinds)
                        .map(|(s, &k)| weights.weight(k) * s.unwrap_or(0.0))
                        .sum()
                })
                .collect(),
            Aggregator::CombMax => Self::extreme(matrix, weights, f64::max),
            Aggregator::CombMin => Self::extreme(matrix, weights, f64::min),
            Aggregator::Rrf => Self::reciprocal_rank(matrix, weights, rrf_k),
        }
    }

    fn extreme(
        matrix: &ScoreMatrix<'_>,
        weights: &FusionWeights,
        pick: fn(f64, f64) -> f64,
    ) -> Vec<f64> {
        matrix
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(matrix.kinds)
                    .filter(|(_, k)| weights.weight(**k) > 0.0)
                    .filter_map(|(s, _)| *s)
                    .reduce(pick)
                    .unwrap_or(0.0)
            })
            .collect()
    }

    fn reciprocal_rank(matrix: &ScoreMatrix<'_>, weights: &FusionWeights, rrf_k: f64) -> Vec<f64> {
        let mut fused = vec![0.0; matrix.rows.len()];
        for (col, &kind) in matrix.kinds.iter().enumerate() {
            let w = weights.weight(kind);
            if w <= 0.0 {
                continue;
            }
            let mut ranked: Vec<(usize, f64)> = matrix
                .rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.get(col).copied().flatten().map(|s| (i, s)))
                .collect();
            ranked.sort_by(|a, b| {
                b.1.total_cmp(&a.1)
                    .then_with(|| matrix.names[a.0].cmp(&matrix.names[b.0]))
            });
            for (pos, (row, _)) in ranked.into_iter().enumerate() {
                fused[row] += w / (rrf_k + (pos + 1) as f64);
            }
        }
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<Arc<str>> {
        n.iter().map(|s| Arc::from(*s)).collect()
    }

    fn weights() -> FusionWeights {
        FusionWeights::zero()
            .with(SignalKind::Jaccard, 0.5)
            .with(SignalKind::Temporal, 0.25)
    }

    const KINDS: [SignalKind; 2] = [SignalKind::Jaccard, SignalKind::Temporal];

    #[test]
    fn test_weighted_does_not_renormalize() {
        let n = names(&["a", "b"]);
        let rows = vec![vec![Some(1.0), Some(1.0)], vec![Some(1.0), None]];
        let m = ScoreMatrix {
            kinds: &KINDS,
            names: &n,
            rows: &rows,
        };
        let fused = Aggregator::Weighted.fuse(&m, &weights(), 0.0);
        assert!((fused[0] - 0.75).abs() < 1e-12);
        // Missing temporal lowers the score instead of shifting weight to jaccard.
        assert!((fused[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_ranks_and_tie_break() {
        let n = names(&["b", "a", "c"]);
        let rows = vec![
            vec![Some(0.5), Some(0.1)],
            vec![Some(0.5), None],
            vec![Some(0.9), Some(0.2)],
        ];
        let m = ScoreMatrix {
            kinds: &KINDS,
            names: &n,
            rows: &rows,
        };
        let fused = Aggregator::Rrf.fuse(&m, &weights(), 0.0);
        // jaccard ranks: c=1, a=2 (name tie-break), b=3; temporal ranks: c=1, b=2
        assert!((fused[2] - (0.5 / 1.0 + 0.25 / 1.0)).abs() < 1e-12);
        assert!((fused[1] - 0.5 / 2.0).abs() < 1e-12);
        assert!((fused[0] - (0.5 / 3.0 + 0.25 / 2.0)).abs() < 1e-12);

        let smoothed = Aggregator::Rrf.fuse(&m, &weights(), 60.0);
        assert!((smoothed[2] - (0.5 / 61.0 + 0.25 / 61.0)).abs() < 1e-12);
        assert!(smoothed.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn test_comb_max_min_ignore_unavailable() {
        let n = names(&["a", "b"]);
        let rows = vec![vec![Some(0.2), Some(0.8)], vec![None, None]];
        let m = ScoreMatrix {
            kinds: &KINDS,
            names: &n,
            rows: &rows,
        };
        assert_eq!(Aggregator::CombMax.fuse(&m, &weights(), 0.0), vec![0.8, 0.0]);
        assert_eq!(Aggregator::CombMin.fuse(&m, &weights(), 0.0), vec![0.2, 0.0]);

        let only_jaccard = FusionWeights::zero().with(SignalKind::Jaccard, 1.0);
        assert_eq!(Aggregator::CombMax.fuse(&m, &only_jaccard, 0.0), vec![0.2, 0.0]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("RRF".parse::<Aggregator>(), Ok(Aggregator::Rrf));
        assert_eq!("combsum".parse::<Aggregator>(), Ok(Aggregator::Weighted));
        assert!("borda".parse::<Aggregator>().is_err());
    }
}
