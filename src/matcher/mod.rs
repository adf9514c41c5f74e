//! Control-point matching by shape similarity.
//!
//! Each detected name may correspond to several real places. The matcher
//! picks one candidate per name so that the geographic polygon they form has
//! the same shape as the pixel polygon formed by the anchors:
//!
//! 1. **Enumeration**: candidate choices are walked lazily in lexicographic
//!    order ([`combinations::CartesianCombinations`]).
//! 2. **Scoring**: each geographic polygon is normalized and compared to the
//!    pixel polygon after optimal rotation ([`shape::Polygon::score`]).
//! 3. **Search**: scoring proceeds in fixed-size batches under a combination
//!    budget and an optional timeout, stopping after the first batch that
//!    contains an exact match ([`search::find_best_match`]).

pub mod combinations;
pub mod search;
pub mod shape;

use crate::point::{NamedPoint, TiePoint};

pub use search::find_best_match;

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling the combination search.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Largest shape score accepted as a match. Default 0.1.
    pub score_threshold: f64,
    /// Scores at or below this are exact matches; scores within this of the
    /// best are ties. Default 1e-9.
    pub exact_epsilon: f64,
    /// Maximum number of combinations to examine. Default 1,000,000.
    pub max_combinations: u64,
    /// Wall-clock limit in milliseconds, checked between batches. None = no limit.
    pub timeout_ms: Option<u64>,
    /// Combinations scored per batch. Default 1024.
    pub batch_size: usize,
    /// Also accept mirror-image shapes. Default false.
    pub allow_reflection: bool,
    /// Score each batch on the rayon pool (only with the `parallel` feature).
    /// Results are identical either way. Default true.
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.1,
            exact_epsilon: 1e-9,
            max_combinations: 1_000_000,
            timeout_ms: None,
            batch_size: 1024,
            allow_reflection: false,
            parallel: true,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// One scored combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCombination {
    /// Lexicographic position of the combination.
    pub index: u64,
    /// Candidate index chosen for each name.
    pub choice: Vec<usize>,
    pub score: f64,
}

/// Counters from one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Total combinations in the search space, if it fits in `u128`.
    pub total: Option<u128>,
    /// Combinations pulled from the enumerator (scored or skipped).
    pub examined: u64,
    /// Combinations skipped as unscorable (degenerate polygon or two names
    /// mapped to the same place).
    pub skipped: u64,
    /// The combination budget or timeout ended the search early.
    pub budget_exhausted: bool,
    /// The search stopped early on an exact match.
    pub exact: bool,
    pub elapsed_ms: f32,
}

/// Outcome of a successful combination search.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Selected combination: the lowest index among the ties.
    pub best: ScoredCombination,
    /// All combinations scoring within `exact_epsilon` of the best, by index.
    /// Contains `best`; more than one entry means the match is ambiguous.
    pub ties: Vec<ScoredCombination>,
    /// Pixel anchors, in input order.
    pub anchors: Vec<NamedPoint>,
    /// Chosen geographic candidate for each anchor.
    pub matched: Vec<NamedPoint>,
    pub stats: SearchStats,
}

impl MatchResult {
    pub fn score(&self) -> f64 {
        self.best.score
    }

    pub fn is_ambiguous(&self) -> bool {
        self.ties.len() > 1
    }

    /// Control points pairing each anchor with its chosen candidate.
    pub fn tie_points(&self) -> Vec<TiePoint> {
        self.anchors
            .iter()
            .zip(&self.matched)
            .map(|(a, m)| TiePoint::new(a, m))
            .collect()
    }
}
