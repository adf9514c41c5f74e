//! In-memory gazetteer with a case-insensitive name index.
//!
//! Each entry carries one or more alternate names. Lookups match any alternate
//! name exactly (ignoring case and surrounding whitespace), the same contract
//! as a `'|' || names || '|' LIKE '%|name|%'` query over a pipe-joined name
//! column, but without returning the same place twice.
//!
//! The index stores, for every normalized name, a compact slice of entry
//! indices (offsets into a single `entry_indices` array), so lookups cost a
//! hash probe plus the number of hits.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::point::NamedPoint;

use super::CandidateGeocoder;

/// A gazetteer place: alternate names and a `(longitude, latitude)` position.
#[derive(Debug, Clone, PartialEq)]
pub struct GazetteerEntry {
    pub names: Vec<String>,
    pub lon: f64,
    pub lat: f64,
}

impl GazetteerEntry {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, lon: f64, lat: f64) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            lon,
            lat,
        }
    }

    /// Display name: all alternate names joined with `|`.
    pub fn display_name(&self) -> String {
        self.names.join("|")
    }
}

#[derive(Debug, Clone)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    name_slots: HashMap<String, (u32, u32)>,
    entry_indices: Vec<u32>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Gazetteer {
    /// Build the gazetteer and its name index.
    pub fn new(entries: Vec<GazetteerEntry>) -> Self {
        let mut bins: HashMap<String, Vec<u32>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for name in &entry.names {
                let key = normalize_name(name);
                if key.is_empty() {
                    continue;
                }
                let bin = bins.entry(key).or_default();
                // an entry listing the same alias twice is indexed once
                if bin.last() != Some(&(idx as u32)) {
                    bin.push(idx as u32);
                }
            }
        }

        let mut keys: Vec<String> = bins.keys().cloned().collect();
        keys.sort();

        let mut name_slots = HashMap::with_capacity(keys.len());
        let mut entry_indices = Vec::new();
        for key in keys {
            let start = entry_indices.len() as u32;
            entry_indices.extend(&bins[&key]);
            let end = entry_indices.len() as u32;
            name_slots.insert(key, (start, end));
        }

        Self {
            entries,
            name_slots,
            entry_indices,
        }
    }

    /// Load a gazetteer from a CSV file with columns `names,lon,lat`.
    ///
    /// The first row is a header. `names` holds pipe-separated alternate names.
    /// Rows whose coordinates do not parse are skipped.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut rdr = csv::Reader::from_path(path.as_ref())?;
        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let record = result?;
            let names = record.get(0).unwrap_or("");
            let lon: Option<f64> = record.get(1).and_then(|s| s.trim().parse().ok());
            let lat: Option<f64> = record.get(2).and_then(|s| s.trim().parse().ok());
            match (lon, lat) {
                (Some(lon), Some(lat)) if !names.trim().is_empty() => {
                    entries.push(GazetteerEntry::new(
                        names.split('|').map(str::trim).filter(|n| !n.is_empty()),
                        lon,
                        lat,
                    ));
                }
                _ => skipped += 1,
            }
        }
        info!(
            "Loaded gazetteer from {}: {} entries ({} rows skipped)",
            path.as_ref().display(),
            entries.len(),
            skipped
        );
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GazetteerEntry] {
        &self.entries
    }

    /// Entry indices whose alternate names include `name`.
    pub fn lookup_indices(&self, name: &str) -> &[u32] {
        match self.name_slots.get(&normalize_name(name)) {
            Some(&(start, end)) => &self.entry_indices[start as usize..end as usize],
            None => &[],
        }
    }

    /// Up to `limit` matches for `name`, in insertion order, one per distinct position.
    pub fn lookup(&self, name: &str, limit: usize) -> Vec<NamedPoint> {
        let mut out: Vec<NamedPoint> = Vec::new();
        for &idx in self.lookup_indices(name) {
            if out.len() >= limit {
                break;
            }
            let entry = &self.entries[idx as usize];
            if out
                .iter()
                .any(|p| p.position == (entry.lon, entry.lat))
            {
                continue;
            }
            out.push(NamedPoint::new(entry.display_name(), entry.lon, entry.lat));
        }
        out
    }
}

impl CandidateGeocoder for Gazetteer {
    fn geocode(&self, name: &str, limit: usize) -> anyhow::Result<Vec<NamedPoint>> {
        Ok(self.lookup(name, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Gazetteer {
        Gazetteer::new(vec![
            GazetteerEntry::new(["Paris", "Paris, France"], 2.35, 48.86),
            GazetteerEntry::new(["Paris"], -95.55, 33.66),
            GazetteerEntry::new(["Lyon"], 4.84, 45.76),
            // same place listed by a second source
            GazetteerEntry::new(["paris", "Lutetia"], 2.35, 48.86),
        ])
    }

    #[test]
    fn test_lookup_case_insensitive_and_deduplicated() {
        let g = sample();
        let hits = g.lookup("  PARIS ", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, (2.35, 48.86));
        assert_eq!(hits[0].name, "Paris|Paris, France");
        assert_eq!(hits[1].position, (-95.55, 33.66));
    }

    #[test]
    fn test_lookup_alternate_name_and_limit() {
        let g = sample();
        assert_eq!(g.lookup("Lutetia", 10).len(), 1);
        assert_eq!(g.lookup("Paris", 1).len(), 1);
        assert!(g.lookup("Atlantis", 10).is_empty());
        assert!(g.lookup("", 10).is_empty());
    }

    #[test]
    fn test_from_csv() {
        let path = std::env::temp_dir().join(format!("georef_gazetteer_{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "names,lon,lat\nBergen|Bjørgvin,5.32,60.39\nOslo,10.75,59.91\nBroken,,\n",
        )
        .unwrap();
        let g = Gazetteer::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(g.len(), 2);
        let hits = g.geocode("bjørgvin", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, (5.32, 60.39));
    }
}
