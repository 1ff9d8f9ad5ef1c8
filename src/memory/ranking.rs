//! Merging of ranked hits from independent full-text lookups.
//!
//! Tier-1 search queries three FTS indexes separately. Their bm25 scores are not on a
//! common scale, so how they are combined is a policy choice, captured by
//! [`RankingStrategy`]. All strategies share the same skeleton: dedup by session with
//! first-seen-wins identity, score, sort ascending (lower is better), truncate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which index a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Summary,
    Topic,
    Snippet,
}

/// How per-index scores are combined into one ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Keep the first-seen raw score. Scores from different indexes are compared as-is.
    #[default]
    RawScore,
    /// Min-max normalize each index's scores to `[0, 1]`, then keep the session's best.
    MinMaxPerSource,
    /// First-seen raw score, improved by a fixed fraction per additional matching index.
    SourceBoost,
}

impl RankingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawScore => "raw_score",
            Self::MinMaxPerSource => "min_max_per_source",
            Self::SourceBoost => "source_boost",
        }
    }
}

impl std::fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RankingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw_score" | "raw" => Ok(Self::RawScore),
            "min_max_per_source" | "min_max" => Ok(Self::MinMaxPerSource),
            "source_boost" | "boost" => Ok(Self::SourceBoost),
            _ => Err(format!("unknown ranking strategy: {s}")),
        }
    }
}

/// One row from one index lookup.
#[derive(Debug, Clone)]
pub struct RankedHit<T> {
    pub key: i64,
    pub source: MatchSource,
    pub score: f64,
    pub item: T,
}

struct Entry<T> {
    item: T,
    first_score: f64,
    sources: Vec<(MatchSource, f64)>,
}

/// Merge hits by `key`, score them with `strategy`, and return at most `limit` items with
/// their final score, best first.
///
/// `source_boost` is only read by [`RankingStrategy::SourceBoost`].
pub fn merge_hits<T>(
    hits: Vec<RankedHit<T>>,
    strategy: RankingStrategy,
    source_boost: f64,
    limit: usize,
) -> Vec<(T, f64)> {
    let bounds = source_bounds(&hits);

    let mut order: Vec<i64> = Vec::new();
    let mut entries: HashMap<i64, Entry<T>> = HashMap::new();
    for hit in hits {
        match entries.get_mut(&hit.key) {
            Some(entry) => entry.sources.push((hit.source, hit.score)),
            None => {
                order.push(hit.key);
                entries.insert(
                    hit.key,
                    Entry {
                        item: hit.item,
                        first_score: hit.score,
                        sources: vec![(hit.source, hit.score)],
                    },
                );
            }
        }
    }

    let mut scored: Vec<(T, f64)> = order
        .into_iter()
        .filter_map(|key| entries.remove(&key))
        .map(|entry| {
            let score = match strategy {
                RankingStrategy::RawScore => entry.first_score,
                RankingStrategy::MinMaxPerSource => entry
                    .sources
                    .iter()
                    .map(|(source, score)| normalize(*score, bounds.get(source).copied()))
                    .fold(f64::INFINITY, f64::min),
                RankingStrategy::SourceBoost => {
                    let mut distinct: Vec<MatchSource> = Vec::with_capacity(3);
                    for (source, _) in &entry.sources {
                        if !distinct.contains(source) {
                            distinct.push(*source);
                        }
                    }
                    let extra = distinct.len().saturating_sub(1) as f64;
                    entry.first_score - entry.first_score.abs() * source_boost.max(0.0) * extra
                }
            };
            (entry.item, score)
        })
        .collect();

    // Stable: equal scores keep first-seen order.
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(limit);
    scored
}

fn source_bounds<T>(hits: &[RankedHit<T>]) -> HashMap<MatchSource, (f64, f64)> {
    let mut bounds: HashMap<MatchSource, (f64, f64)> = HashMap::new();
    for hit in hits {
        bounds
            .entry(hit.source)
            .and_modify(|(lo, hi)| {
                *lo = lo.min(hit.score);
                *hi = hi.max(hit.score);
            })
            .or_insert((hit.score, hit.score));
    }
    bounds
}

fn normalize(score: f64, bounds: Option<(f64, f64)>) -> f64 {
    match bounds {
        Some((lo, hi)) if hi > lo => (score - lo) / (hi - lo),
        _ => 0.0,
    }
}
