//! Budgeted best-combination search.

use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geocoder::CandidateSet;
use crate::maybe_rayon::*;
use crate::point::{find_duplicate_position, NamedPoint};

use super::combinations::CartesianCombinations;
use super::shape::Polygon;
use super::{MatchConfig, MatchResult, ScoredCombination, SearchStats};

/// Two candidates closer than this (in degrees) are the same place.
const SAME_PLACE_TOL: f64 = 1e-12;

/// A combination pulled from the enumerator, ready to be scored.
struct Pending {
    index: u64,
    choice: Vec<usize>,
    geo: Vec<(f64, f64)>,
}

/// Find the candidate choice whose geographic polygon best matches the anchors.
///
/// `anchors[i]` is compared against `candidates.candidates(i)`. Combinations
/// are scored in batches of `config.batch_size`; the search stops after the
/// first batch containing an exact match, when the enumerator is exhausted,
/// or when the budget (`max_combinations`, `timeout_ms`) runs out.
///
/// The result is independent of `config.parallel`: scores are merged in
/// combination order and ties resolve to the lowest index.
pub fn find_best_match(
    anchors: &[NamedPoint],
    candidates: &CandidateSet,
    config: &MatchConfig,
) -> Result<MatchResult> {
    let t0 = Instant::now();

    if anchors.len() != candidates.len() {
        return Err(Error::InvalidInput(format!(
            "{} anchors but {} candidate lists",
            anchors.len(),
            candidates.len()
        )));
    }
    if config.batch_size == 0 {
        return Err(Error::InvalidInput("batch_size must be positive".into()));
    }

    let mut enumerator = CartesianCombinations::new(candidates.lists())?;

    let pixel: Vec<(f64, f64)> = anchors.iter().map(|a| a.position).collect();
    if let Some((i, j)) = find_duplicate_position(&pixel, 0.0) {
        return Err(Error::InvalidInput(format!(
            "anchors {:?} and {:?} share pixel position {:?}",
            anchors[i].name, anchors[j].name, pixel[i]
        )));
    }
    let pixel_polygon = Polygon::new(&pixel)
        .ok_or_else(|| Error::InvalidInput("anchor polygon is degenerate".into()))?;

    let mut stats = SearchStats {
        total: enumerator.combination_count(),
        ..SearchStats::default()
    };
    debug!(
        "Searching {} names, {} combinations (sizes {:?}), budget {}",
        anchors.len(),
        stats
            .total
            .map_or_else(|| "overflow".to_string(), |t| t.to_string()),
        candidates.sizes(),
        config.max_combinations
    );

    // Every scored combination within `exact_epsilon` of the running minimum.
    let mut near_best: Vec<ScoredCombination> = Vec::new();
    let mut min_score = f64::INFINITY;

    loop {
        let remaining = config.max_combinations.saturating_sub(stats.examined);
        if remaining == 0 {
            let more = stats.total.map_or(true, |t| t > stats.examined as u128);
            if more {
                warn!(
                    "Combination budget of {} exhausted before the search space was covered",
                    config.max_combinations
                );
                stats.budget_exhausted = true;
            }
            break;
        }
        // the timeout only applies between batches, so at least one is scored
        if let Some(limit) = config.timeout_ms.filter(|_| stats.examined > 0) {
            if elapsed_ms(t0) >= limit as f32 {
                warn!(
                    "Match timeout after {:.1}ms ({} combinations examined)",
                    elapsed_ms(t0),
                    stats.examined
                );
                stats.budget_exhausted = true;
                break;
            }
        }

        let take = remaining.min(config.batch_size as u64) as usize;
        let batch: Vec<Pending> = enumerator
            .by_ref()
            .take(take)
            .map(|c| Pending {
                index: c.index,
                geo: c.items.iter().map(|p| p.position).collect(),
                choice: c.choice,
            })
            .collect();
        if batch.is_empty() {
            break;
        }
        stats.examined += batch.len() as u64;

        let scores = score_batch(&pixel_polygon, &batch, config);

        for (pending, score) in batch.into_iter().zip(scores) {
            let Some(score) = score else {
                stats.skipped += 1;
                continue;
            };
            if score < min_score {
                min_score = score;
                near_best.retain(|c| c.score <= min_score + config.exact_epsilon);
            }
            if score <= min_score + config.exact_epsilon {
                near_best.push(ScoredCombination {
                    index: pending.index,
                    choice: pending.choice,
                    score,
                });
            }
        }

        if min_score <= config.exact_epsilon {
            debug!(
                "Exact match (score {:.3e}) within the first {} combinations",
                min_score, stats.examined
            );
            stats.exact = true;
            break;
        }
    }

    stats.elapsed_ms = elapsed_ms(t0);

    if near_best.is_empty() || min_score > config.score_threshold {
        return Err(Error::NoMatchFound {
            threshold: config.score_threshold,
            best_score: min_score.is_finite().then_some(min_score),
            examined: stats.examined,
        });
    }

    near_best.sort_by_key(|c| c.index);
    let best = near_best[0].clone();
    if near_best.len() > 1 {
        warn!(
            "{} combinations tie within {:e} of the best score {:.3e}; choosing index {}",
            near_best.len(),
            config.exact_epsilon,
            best.score,
            best.index
        );
    }
    debug!(
        "Best combination #{} score {:.3e} ({} examined, {} skipped) in {:.1}ms",
        best.index, best.score, stats.examined, stats.skipped, stats.elapsed_ms
    );

    let matched = best
        .choice
        .iter()
        .enumerate()
        .map(|(name_idx, &cand_idx)| candidates.candidates(name_idx)[cand_idx].clone())
        .collect();

    Ok(MatchResult {
        best,
        ties: near_best,
        anchors: anchors.to_vec(),
        matched,
        stats,
    })
}

/// Score every combination of a batch, preserving batch order.
///
/// `None` marks combinations that cannot be scored: two names mapped to the
/// same place, or a degenerate geographic polygon.
fn score_batch(pixel: &Polygon, batch: &[Pending], config: &MatchConfig) -> Vec<Option<f64>> {
    let score_one = |p: &Pending| -> Option<f64> {
        if find_duplicate_position(&p.geo, SAME_PLACE_TOL).is_some() {
            return None;
        }
        let geo = Polygon::new(&p.geo)?;
        Some(pixel.score(&geo, config.allow_reflection))
    };

    if config.parallel {
        batch.par_iter().map(score_one).collect()
    } else {
        batch.iter().map(score_one).collect()
    }
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors() -> Vec<NamedPoint> {
        vec![
            NamedPoint::new("A", 0.0, 0.0),
            NamedPoint::new("B", 10.0, 0.0),
            NamedPoint::new("C", 10.0, 10.0),
            NamedPoint::new("D", 0.0, 10.0),
        ]
    }

    fn single(names: &[(&str, f64, f64)]) -> CandidateSet {
        let mut set = CandidateSet::new();
        for &(n, x, y) in names {
            set.push(n, vec![NamedPoint::new(n, x, y)]);
        }
        set
    }

    #[test]
    fn test_single_combination_exact() {
        let set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 1.0, 1.0), ("D", 0.0, 1.0)]);
        let result = find_best_match(&anchors(), &set, &MatchConfig::default()).unwrap();
        assert_eq!(result.best.index, 0);
        assert!(result.score() < 1e-12);
        assert!(result.stats.exact);
        assert_eq!(result.stats.examined, 1);
        assert_eq!(result.tie_points().len(), 4);
    }

    #[test]
    fn test_prefers_consistent_candidate() {
        let mut set = CandidateSet::new();
        set.push("A", vec![NamedPoint::new("A", 5.0, 50.0)]);
        set.push(
            "B",
            vec![
                NamedPoint::new("B far", 80.0, -20.0),
                NamedPoint::new("B", 6.0, 50.0),
            ],
        );
        set.push("C", vec![NamedPoint::new("C", 6.0, 51.0)]);
        set.push("D", vec![NamedPoint::new("D", 5.0, 51.0)]);
        let result = find_best_match(&anchors(), &set, &MatchConfig::default()).unwrap();
        assert_eq!(result.best.choice, vec![0, 1, 0, 0]);
        assert_eq!(result.matched[1].name, "B");
        assert!(!result.is_ambiguous());
    }

    #[test]
    fn test_same_place_twice_is_skipped() {
        let mut set = CandidateSet::new();
        set.push("A", vec![NamedPoint::new("A", 0.0, 0.0)]);
        set.push("B", vec![NamedPoint::new("A", 0.0, 0.0), NamedPoint::new("B", 1.0, 0.0)]);
        set.push("C", vec![NamedPoint::new("C", 1.0, 1.0)]);
        set.push("D", vec![NamedPoint::new("D", 0.0, 1.0)]);
        let result = find_best_match(&anchors(), &set, &MatchConfig::default()).unwrap();
        assert_eq!(result.stats.skipped, 1);
        assert_eq!(result.best.choice, vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_no_match_reports_best_score() {
        // a thin sliver cannot look like a square
        let set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 2.0, 0.01), ("D", 3.0, 0.0)]);
        match find_best_match(&anchors(), &set, &MatchConfig::default()) {
            Err(Error::NoMatchFound { best_score, examined, .. }) => {
                assert!(best_score.unwrap() > 0.1);
                assert_eq!(examined, 1);
            }
            other => panic!("expected NoMatchFound, got {other:?}"),
        }
    }

    #[test]
    fn test_ties_are_reported() {
        // the same true place listed twice under different names
        let mut set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 1.0, 1.0)]);
        set.push(
            "D",
            vec![NamedPoint::new("D", 0.0, 1.0), NamedPoint::new("D dup", 0.0, 1.0 + 1e-13)],
        );
        let result = find_best_match(&anchors(), &set, &MatchConfig::default()).unwrap();
        assert!(result.is_ambiguous());
        assert_eq!(result.ties.len(), 2);
        assert_eq!(result.best.index, 0);
    }

    #[test]
    fn test_budget_exhausted_keeps_best_acceptable() {
        let mut set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 1.0, 1.0)]);
        // the right candidate for D is last; the first ones are close but imperfect
        let mut d: Vec<NamedPoint> = (0..50)
            .map(|i| NamedPoint::new(format!("D{i}"), 0.05 + 0.001 * i as f64, 1.0))
            .collect();
        d.push(NamedPoint::new("D", 0.0, 1.0));
        set.push("D", d);

        let config = MatchConfig {
            max_combinations: 10,
            batch_size: 4,
            ..MatchConfig::default()
        };
        let result = find_best_match(&anchors(), &set, &config).unwrap();
        assert!(result.stats.budget_exhausted);
        assert_eq!(result.stats.examined, 10);
        assert_eq!(result.best.index, 0);
        assert!(result.score() > 1e-9 && result.score() <= 0.1);
    }

    #[test]
    fn test_timeout_returns_best_of_first_batch() {
        let mut set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 1.0, 1.0)]);
        let mut d: Vec<NamedPoint> = (0..50)
            .map(|i| NamedPoint::new(format!("D{i}"), 0.05 + 0.001 * i as f64, 1.0))
            .collect();
        d.push(NamedPoint::new("D", 0.0, 1.0));
        set.push("D", d);

        let config = MatchConfig {
            timeout_ms: Some(0),
            batch_size: 4,
            parallel: false,
            ..MatchConfig::default()
        };
        let result = find_best_match(&anchors(), &set, &config).unwrap();
        assert!(result.stats.budget_exhausted);
        assert!(!result.stats.exact);
        assert_eq!(result.stats.examined, 4);
        assert_eq!(result.best.index, 0);
        assert!(result.score() > 1e-9 && result.score() <= 0.1);

        // nothing acceptable in the first batch
        let strict = MatchConfig {
            score_threshold: 1e-3,
            ..config
        };
        match find_best_match(&anchors(), &set, &strict) {
            Err(Error::NoMatchFound { examined, best_score, .. }) => {
                assert_eq!(examined, 4);
                assert!(best_score.unwrap() > 1e-3);
            }
            other => panic!("expected NoMatchFound, got {other:?}"),
        }
    }

    #[test]
    fn test_anchor_validation() {
        let set = single(&[("A", 0.0, 0.0), ("B", 1.0, 0.0), ("C", 1.0, 1.0)]);
        let err = find_best_match(&anchors(), &set, &MatchConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let dup = vec![
            NamedPoint::new("A", 0.0, 0.0),
            NamedPoint::new("B", 0.0, 0.0),
            NamedPoint::new("C", 1.0, 1.0),
        ];
        let err = find_best_match(&dup, &set, &MatchConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
