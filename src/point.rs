//! Named coordinates and control points.
//!
//! A [`NamedPoint`] is used both for pixel-space anchors (toponyms detected in
//! the image) and for geographic gazetteer hits. Pixel positions are
//! `(column, row)`; geographic positions are `(longitude, latitude)` in degrees.

/// A coordinate pair labelled with the name it was detected or looked up under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPoint {
    pub name: String,
    pub position: (f64, f64),
}

impl NamedPoint {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            position: (x, y),
        }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.position.0
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position.1
    }

    /// Euclidean distance to another point in the same coordinate space.
    pub fn distance(&self, other: &NamedPoint) -> f64 {
        let dx = self.position.0 - other.position.0;
        let dy = self.position.1 - other.position.1;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A matched control point: a pixel anchor paired with a geographic position.
#[derive(Debug, Clone, PartialEq)]
pub struct TiePoint {
    /// Name as detected in the image.
    pub name: String,
    /// Anchor position in pixels `(column, row)`.
    pub pixel: (f64, f64),
    /// Name of the matched gazetteer entry.
    pub matched_name: String,
    /// Matched position `(longitude, latitude)` in degrees.
    pub geo: (f64, f64),
}

impl TiePoint {
    pub fn new(anchor: &NamedPoint, matched: &NamedPoint) -> Self {
        Self {
            name: anchor.name.clone(),
            pixel: anchor.position,
            matched_name: matched.name.clone(),
            geo: matched.position,
        }
    }
}

/// Split tie-points into parallel pixel and geographic coordinate arrays.
pub fn split_tie_points(tie_points: &[TiePoint]) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    tie_points.iter().map(|t| (t.pixel, t.geo)).unzip()
}

/// Returns the first pair of indices whose positions coincide (within `tol`).
pub(crate) fn find_duplicate_position(points: &[(f64, f64)], tol: f64) -> Option<(usize, usize)> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let dx = points[i].0 - points[j].0;
            let dy = points[i].1 - points[j].1;
            if dx.abs() <= tol && dy.abs() <= tol {
                return Some((i, j));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_point_from_named_points() {
        let anchor = NamedPoint::new("Oslo", 120.0, 340.0);
        let hit = NamedPoint::new("Oslo, Norway", 10.75, 59.91);
        let tp = TiePoint::new(&anchor, &hit);
        assert_eq!(tp.name, "Oslo");
        assert_eq!(tp.matched_name, "Oslo, Norway");
        assert_eq!(tp.pixel, (120.0, 340.0));
        assert_eq!(tp.geo, (10.75, 59.91));
    }

    #[test]
    fn test_find_duplicate_position() {
        let pts = [(0.0, 0.0), (1.0, 2.0), (3.0, 1.0), (1.0, 2.0)];
        assert_eq!(find_duplicate_position(&pts, 0.0), Some((1, 3)));
        assert_eq!(find_duplicate_position(&pts[..3], 0.0), None);
    }
}
