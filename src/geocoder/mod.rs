//! Candidate geocoding: turning detected names into geographic candidates.
//!
//! The geocoder is the only I/O boundary of the engine. It is called exactly
//! once per distinct name, before any combination is enumerated, and its
//! failures are passed through as [`Error::GeocoderFailure`] without retry.

pub mod gazetteer;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::point::NamedPoint;

pub use gazetteer::{Gazetteer, GazetteerEntry};

/// Maps a name to an ordered list of geographic candidates.
///
/// Returning an empty list is not an error. Transport or lookup failures are
/// returned as `Err` and surfaced unchanged by the caller.
pub trait CandidateGeocoder {
    fn geocode(&self, name: &str, limit: usize) -> anyhow::Result<Vec<NamedPoint>>;
}

impl<F> CandidateGeocoder for F
where
    F: Fn(&str, usize) -> anyhow::Result<Vec<NamedPoint>>,
{
    fn geocode(&self, name: &str, limit: usize) -> anyhow::Result<Vec<NamedPoint>> {
        self(name, limit)
    }
}

/// Resolved candidates for each input name, aligned with the anchor list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    entries: Vec<(String, Vec<NamedPoint>)>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the candidate list for the next name in anchor order.
    pub fn push(&mut self, name: impl Into<String>, candidates: Vec<NamedPoint>) {
        self.entries.push((name.into(), candidates));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.entries[idx].0
    }

    pub fn candidates(&self, idx: usize) -> &[NamedPoint] {
        &self.entries[idx].1
    }

    /// Candidate lists in anchor order.
    pub fn lists(&self) -> Vec<&[NamedPoint]> {
        self.entries.iter().map(|(_, c)| c.as_slice()).collect()
    }

    /// Number of candidates per name.
    pub fn sizes(&self) -> Vec<usize> {
        self.entries.iter().map(|(_, c)| c.len()).collect()
    }

    /// Names that resolved to zero candidates, in anchor order.
    pub fn missing_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, c)| c.is_empty())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Copy of this set restricted to names with at least one candidate.
    ///
    /// Also returns the anchor indices that were kept, so callers can restrict
    /// their anchor list the same way.
    pub fn without_missing(&self) -> (CandidateSet, Vec<usize>) {
        let mut kept = Vec::new();
        let mut out = CandidateSet::new();
        for (i, (name, cands)) in self.entries.iter().enumerate() {
            if !cands.is_empty() {
                kept.push(i);
                out.push(name.clone(), cands.clone());
            }
        }
        (out, kept)
    }
}

/// Geocode each name once and collect the results in input order.
///
/// Repeated names reuse the first lookup. `limit` is forwarded to the
/// geocoder unchanged.
pub fn resolve_candidates<G>(geocoder: &G, names: &[&str], limit: usize) -> Result<CandidateSet>
where
    G: CandidateGeocoder + ?Sized,
{
    let mut cache: HashMap<&str, Vec<NamedPoint>> = HashMap::new();
    let mut set = CandidateSet::new();

    for &name in names {
        if !cache.contains_key(name) {
            let found = geocoder
                .geocode(name, limit)
                .map_err(|e| Error::GeocoderFailure {
                    name: name.to_string(),
                    source: e.into(),
                })?;
            debug!("geocoded {:?}: {} candidates", name, found.len());
            cache.insert(name, found);
        }
        set.push(name, cache[name].clone());
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_resolve_keeps_empty_lists() {
        let coder = |name: &str, _limit: usize| -> anyhow::Result<Vec<NamedPoint>> {
            Ok(match name {
                "Atlantis" => Vec::new(),
                other => vec![NamedPoint::new(other, 1.0, 2.0)],
            })
        };
        let set = resolve_candidates(&coder, &["Bergen", "Atlantis", "Molde"], 10).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.sizes(), vec![1, 0, 1]);
        assert_eq!(set.missing_names(), vec!["Atlantis"]);

        let (trimmed, kept) = set.without_missing();
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(trimmed.name(1), "Molde");
    }

    #[test]
    fn test_resolve_calls_geocoder_once_per_name() {
        let calls = Cell::new(0usize);
        let coder = |name: &str, _limit: usize| -> anyhow::Result<Vec<NamedPoint>> {
            calls.set(calls.get() + 1);
            Ok(vec![NamedPoint::new(name, 0.0, 0.0)])
        };
        let set = resolve_candidates(&coder, &["A", "B", "A", "C", "B"], 5).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_geocoder_failure_is_surfaced() {
        let coder = |name: &str, _limit: usize| -> anyhow::Result<Vec<NamedPoint>> {
            if name == "Timeout" {
                anyhow::bail!("connection reset");
            }
            Ok(Vec::new())
        };
        let err = resolve_candidates(&coder, &["Ok", "Timeout"], 5).unwrap_err();
        match err {
            Error::GeocoderFailure { name, source } => {
                assert_eq!(name, "Timeout");
                assert!(source.to_string().contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
