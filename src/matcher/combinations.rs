//! Lexicographic cartesian-product iterator over per-name candidate lists.
//!
//! Yields one candidate per name, in lexicographic order of candidate indices
//! with the leftmost name varying slowest. The product is never materialized:
//! the iterator keeps a single odometer of indices and advances it in place,
//! so callers may stop after any number of combinations.

use crate::error::{Error, Result};

/// Minimum number of names for a polygon comparison to be meaningful.
pub const MIN_NAMES: usize = 3;

/// One choice of candidate per name.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination<'a, T> {
    /// Position of this combination in lexicographic order (0-based).
    pub index: u64,
    /// Chosen candidate index for each name.
    pub choice: Vec<usize>,
    /// Chosen candidate for each name, aligned with `choice`.
    pub items: Vec<&'a T>,
}

/// Lazy cartesian product of `lists`.
pub struct CartesianCombinations<'a, T> {
    lists: Vec<&'a [T]>,
    cursor: Option<Vec<usize>>,
    index: u64,
}

impl<'a, T> CartesianCombinations<'a, T> {
    /// Create the iterator.
    ///
    /// Fails with [`Error::InsufficientInput`] when fewer than [`MIN_NAMES`]
    /// lists are given or when any list is empty.
    pub fn new(lists: Vec<&'a [T]>) -> Result<Self> {
        if lists.len() < MIN_NAMES {
            return Err(Error::InsufficientInput(format!(
                "need at least {} names to form a polygon, got {}",
                MIN_NAMES,
                lists.len()
            )));
        }
        if let Some(pos) = lists.iter().position(|l| l.is_empty()) {
            return Err(Error::InsufficientInput(format!(
                "name #{} has no candidates",
                pos
            )));
        }
        let n = lists.len();
        Ok(Self {
            lists,
            cursor: Some(vec![0; n]),
            index: 0,
        })
    }

    /// Total number of combinations `Π c_i`, or `None` if it overflows `u128`.
    pub fn combination_count(&self) -> Option<u128> {
        self.lists
            .iter()
            .try_fold(1u128, |acc, l| acc.checked_mul(l.len() as u128))
    }

    /// Number of combinations yielded so far.
    pub fn yielded(&self) -> u64 {
        self.index
    }
}

impl<'a, T> Iterator for CartesianCombinations<'a, T> {
    type Item = Combination<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.take()?;

        // Advance the odometer: rightmost position increments first.
        let mut next = current.clone();
        let mut pos = next.len();
        let mut exhausted = true;
        while pos > 0 {
            pos -= 1;
            next[pos] += 1;
            if next[pos] < self.lists[pos].len() {
                exhausted = false;
                break;
            }
            next[pos] = 0;
        }
        if !exhausted {
            self.cursor = Some(next);
        }

        let items = current
            .iter()
            .zip(&self.lists)
            .map(|(&i, list)| &list[i])
            .collect();
        let combo = Combination {
            index: self.index,
            choice: current,
            items,
        };
        self.index += 1;
        Some(combo)
    }
}
