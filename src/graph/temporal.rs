//! Temporal statistics over an edge's monthly histogram.
//!
//! The histogram maps "YYYY-MM" buckets to accumulated co-occurrence weight.
//! Everything here is a pure function of that map plus an explicit reference
//! time, so two evaluations with the same inputs always agree.
//!
//! # Temporal similarity
//!
//! ```text
//! recency      count-weighted mean of exp(-days_ago / decay_days)
//! consistency  1 / (1 + cv)           cv = stddev / mean of monthly counts
//! trend        clamp((slope + 5) / 10) slope over the last N months
//! format_w     (in * 2.0 + other * 0.3) / total    (1.0 without a format)
//!
//! score = min(1, 0.4 * recency * format_w + 0.3 * consistency + 0.2 * trend + 0.1)
//! ```
//!
//! Recent co-occurrence under the query's format therefore outweighs old or
//! cross-format co-occurrence, while the 0.1 baseline keeps any observed
//! pair strictly positive.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::model::CoEdge;
use crate::types::parse_month_key;

/// Default exponential decay constant for recency, in days.
pub const DEFAULT_DECAY_DAYS: f64 = 365.0;

/// Default window for trend estimation, in months.
pub const DEFAULT_TREND_LOOKBACK: usize = 6;

/// Summary statistics of a monthly histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalStats {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub months_active: usize,
    /// Busiest month; earliest wins on ties
    pub peak_month: Option<String>,
    pub peak_count: f64,
    /// 1 / (1 + volatility), 1.0 for a single active month
    pub consistency: f64,
    /// Coefficient of variation of monthly counts
    pub volatility: f64,
    /// Least-squares slope over the most recent months
    pub recent_trend: f64,
    pub activity_span_days: i64,
}

/// Compute histogram statistics.
///
/// # Arguments
/// * `monthly` - "YYYY-MM" -> accumulated weight
/// * `first_seen`, `last_seen` - observation window of the edge
/// * `trend_lookback` - number of most recent months used for the slope
pub fn compute_stats(
    monthly: &BTreeMap<String, f64>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    trend_lookback: usize,
) -> TemporalStats {
    let mut peak: Option<(&String, f64)> = None;
    for (month, &count) in monthly {
        if peak.map_or(true, |(_, best)| count > best) {
            peak = Some((month, count));
        }
    }
    let (consistency, volatility) = consistency_and_volatility(monthly);

    TemporalStats {
        first_seen,
        last_seen,
        months_active: monthly.len(),
        peak_month: peak.map(|(m, _)| m.clone()),
        peak_count: peak.map_or(0.0, |(_, c)| c),
        consistency,
        volatility,
        recent_trend: trend_slope(monthly, trend_lookback),
        activity_span_days: (last_seen - first_seen).num_days(),
    }
}

/// Count-weighted exponential recency in `[0, 1]`.
///
/// Each month is dated at its first day. Months after `reference` contribute
/// nothing to the numerator but still count toward the total, and
/// non-positive counts are ignored.
pub fn recency_score(
    monthly: &BTreeMap<String, f64>,
    reference: DateTime<Utc>,
    decay_days: f64,
) -> f64 {
    let decay = if decay_days > 0.0 {
        decay_days
    } else {
        DEFAULT_DECAY_DAYS
    };
    let reference_day = reference.date_naive();

    let mut weighted = 0.0;
    let mut total = 0.0;
    for (month, &count) in monthly {
        if count <= 0.0 {
            continue;
        }
        total += count;
        let Some(start) = parse_month_key(month) else {
            continue;
        };
        let days_ago = days_between(start, reference_day);
        if days_ago < 0 {
            continue;
        }
        weighted += count * (-(days_ago as f64) / decay).exp();
    }

    if total > 0.0 {
        (weighted / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Consistency `1 / (1 + cv)` and volatility `cv` of the monthly counts.
///
/// Uses the population standard deviation. An empty histogram is neither
/// consistent nor volatile.
pub fn consistency_and_volatility(monthly: &BTreeMap<String, f64>) -> (f64, f64) {
    let counts: Vec<f64> = monthly.values().copied().collect();
    match counts.len() {
        0 => (0.0, 0.0),
        1 => (1.0, 0.0),
        n => {
            let mean = counts.iter().sum::<f64>() / n as f64;
            if mean <= 0.0 {
                return (0.0, 0.0);
            }
            let var = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n as f64;
            let cv = var.sqrt() / mean;
            (1.0 / (1.0 + cv), cv)
        }
    }
}

/// Least-squares slope of the last `lookback` months, indexed 0..n.
///
/// Months are taken in key order and gaps are not filled, matching how the
/// histogram is stored.
pub fn trend_slope(monthly: &BTreeMap<String, f64>, lookback: usize) -> f64 {
    let lookback = lookback.max(2);
    let skip = monthly.len().saturating_sub(lookback);
    let ys: Vec<f64> = monthly.values().skip(skip).copied().collect();
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Relative weight of in-format versus other co-occurrence.
///
/// In-format volume counts double, everything else 0.3. Without a format, or
/// for a weightless edge, the factor is neutral.
pub fn format_weight(edge: &CoEdge, format: Option<&str>) -> f64 {
    let Some(format) = format else {
        return 1.0;
    };
    let total = edge.weight;
    if total <= 0.0 {
        return 1.0;
    }
    let in_format = edge.format_count(format).min(total);
    let other = total - in_format;
    (in_format * 2.0 + other * 0.3) / total
}

/// Parameters of the temporal similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalParams {
    pub decay_days: f64,
    pub trend_lookback_months: usize,
    /// Format the query is evaluated under, if any
    pub format: Option<String>,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            decay_days: DEFAULT_DECAY_DAYS,
            trend_lookback_months: DEFAULT_TREND_LOOKBACK,
            format: None,
        }
    }
}

/// Recency- and format-weighted co-occurrence score in `[0, 1]`.
///
/// Returns `None` for an edge with an empty histogram.
pub fn temporal_similarity(
    edge: &CoEdge,
    reference: DateTime<Utc>,
    params: &TemporalParams,
) -> Option<f64> {
    if edge.monthly_counts.is_empty() {
        return None;
    }
    let recency = recency_score(&edge.monthly_counts, reference, params.decay_days);
    let (consistency, _) = consistency_and_volatility(&edge.monthly_counts);
    let slope = trend_slope(&edge.monthly_counts, params.trend_lookback_months);
    let trend = ((slope + 5.0) / 10.0).clamp(0.0, 1.0);
    let fw = format_weight(edge, params.format.as_deref());

    let score = 0.4 * recency * fw + 0.3 * consistency + 0.2 * trend + 0.1;
    Some(score.min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Contribution, EdgeKey};
    use crate::types::{parse_timestamp, Game};

    fn hist(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_recency_current_month_is_one() {
        let h = hist(&[("2024-06", 5.0)]);
        let score = recency_score(&h, at("2024-06-01"), 365.0);
        assert!((score - 1.0).abs() < 1e-9, "score = {score}");
    }

    #[test]
    fn test_recency_decays_with_age() {
        let recent = hist(&[("2024-05", 1.0)]);
        let old = hist(&[("2021-05", 1.0)]);
        let reference = at("2024-06-01");
        let r = recency_score(&recent, reference, 365.0);
        let o = recency_score(&old, reference, 365.0);
        assert!(r > o, "recent {r} should beat old {o}");
        assert!(o > 0.0);
    }

    #[test]
    fn test_recency_skips_future_months() {
        let h = hist(&[("2024-01", 1.0), ("2030-01", 1.0)]);
        let score = recency_score(&h, at("2024-01-01"), 365.0);
        // The future month is excluded from the numerator only.
        assert!((score - 0.5).abs() < 1e-9, "score = {score}");
    }

    #[test]
    fn test_consistency() {
        assert_eq!(consistency_and_volatility(&hist(&[])), (0.0, 0.0));
        assert_eq!(consistency_and_volatility(&hist(&[("2024-01", 3.0)])), (1.0, 0.0));

        let flat = hist(&[("2024-01", 2.0), ("2024-02", 2.0), ("2024-03", 2.0)]);
        let (c, v) = consistency_and_volatility(&flat);
        assert_eq!(v, 0.0);
        assert_eq!(c, 1.0);

        let spiky = hist(&[("2024-01", 1.0), ("2024-02", 9.0)]);
        let (c, v) = consistency_and_volatility(&spiky);
        assert!((v - 0.8).abs() < 1e-9, "cv = {v}");
        assert!(c < 1.0);
    }

    #[test]
    fn test_trend_slope() {
        let rising = hist(&[("2024-01", 1.0), ("2024-02", 2.0), ("2024-03", 3.0)]);
        assert!((trend_slope(&rising, 6) - 1.0).abs() < 1e-9);

        let falling = hist(&[("2024-01", 9.0), ("2024-02", 5.0), ("2024-03", 1.0)]);
        assert!((trend_slope(&falling, 6) + 4.0).abs() < 1e-9);

        // Only the last two months are considered.
        let windowed = hist(&[("2024-01", 100.0), ("2024-02", 1.0), ("2024-03", 2.0)]);
        assert!((trend_slope(&windowed, 2) - 1.0).abs() < 1e-9);

        assert_eq!(trend_slope(&hist(&[("2024-01", 4.0)]), 6), 0.0);
    }

    #[test]
    fn test_stats_peak_and_span() {
        let h = hist(&[("2024-01", 2.0), ("2024-02", 5.0), ("2024-03", 5.0)]);
        let stats = compute_stats(&h, at("2024-01-10"), at("2024-03-10"), 6);
        assert_eq!(stats.months_active, 3);
        assert_eq!(stats.peak_month.as_deref(), Some("2024-02"));
        assert_eq!(stats.peak_count, 5.0);
        assert_eq!(stats.activity_span_days, 60);
    }

    fn edge_with(format_counts: &[(&str, f64)]) -> CoEdge {
        let mut edge = CoEdge::new(EdgeKey::new(Game::Magic, "A", "B"), at("2024-01-01"));
        let none: Vec<String> = Vec::new();
        for (format, inc) in format_counts {
            edge.record(
                Contribution {
                    increment: *inc,
                    timestamp: at("2024-01-01"),
                    format: Some(*format),
                    ..Contribution::default()
                },
                &none,
            );
        }
        edge
    }

    #[test]
    fn test_format_weight() {
        let edge = edge_with(&[("Modern", 3.0), ("Legacy", 1.0)]);
        assert_eq!(format_weight(&edge, None), 1.0);
        let modern = format_weight(&edge, Some("Modern"));
        assert!((modern - (3.0 * 2.0 + 1.0 * 0.3) / 4.0).abs() < 1e-9);
        let pauper = format_weight(&edge, Some("Pauper"));
        assert!((pauper - 0.3).abs() < 1e-9);
        assert!(modern > pauper);
    }

    #[test]
    fn test_temporal_similarity_bounds() {
        let edge = edge_with(&[("Modern", 2.0)]);
        let params = TemporalParams::default();
        let score = temporal_similarity(&edge, at("2024-01-01"), &params).unwrap();
        // recency 1, consistency 1, trend 0.5
        assert!((score - (0.4 + 0.3 + 0.1 + 0.1)).abs() < 1e-9, "score = {score}");

        let with_format = TemporalParams {
            format: Some("Modern".into()),
            ..TemporalParams::default()
        };
        let boosted = temporal_similarity(&edge, at("2024-01-01"), &with_format).unwrap();
        assert_eq!(boosted, 1.0);

        let empty = CoEdge::new(EdgeKey::new(Game::Magic, "A", "B"), at("2024-01-01"));
        assert!(temporal_similarity(&empty, at("2024-01-01"), &params).is_none());
    }
}
