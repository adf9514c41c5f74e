//! Normalized polygon comparison.
//!
//! Two polygons with the same vertex count are compared vertex-by-vertex
//! (vertex `i` against vertex `i`, never re-paired) after removing
//! translation and scale, and after the best rotation aligning them.
//!
//! For centred, unit-scale polygons `p` and `q` the optimal 2D rotation has
//! a closed form: with `a = Σ p·q` and `b = Σ p×q`, the minimum of
//! `Σ |p_i − R q_i|²` is `Σ|p|² + Σ|q|² − 2·sqrt(a² + b²)`.

/// Polygons whose largest centroid distance is below this are degenerate.
pub const DEGENERATE_RADIUS: f64 = 1e-12;

/// A polygon with its centroid at the origin and its farthest vertex at distance 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<(f64, f64)>,
    /// Scale that was divided out (largest vertex distance to the centroid).
    radius: f64,
}

impl Polygon {
    /// Normalize `vertices`.
    ///
    /// Returns `None` for fewer than 3 vertices, for non-finite coordinates,
    /// or when all vertices coincide.
    pub fn new(vertices: &[(f64, f64)]) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let n = vertices.len() as f64;
        let cx = vertices.iter().map(|v| v.0).sum::<f64>() / n;
        let cy = vertices.iter().map(|v| v.1).sum::<f64>() / n;
        if !cx.is_finite() || !cy.is_finite() {
            return None;
        }

        let radius = vertices
            .iter()
            .map(|v| ((v.0 - cx).powi(2) + (v.1 - cy).powi(2)).sqrt())
            .fold(0.0f64, f64::max);
        if !(radius > DEGENERATE_RADIUS) || !radius.is_finite() {
            return None;
        }

        Some(Self {
            vertices: vertices
                .iter()
                .map(|v| ((v.0 - cx) / radius, (v.1 - cy) / radius))
                .collect(),
            radius,
        })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Residual after optimal rotation of `other` onto `self`, in `[0, 2N]`.
    ///
    /// With `allow_reflection`, `other` mirrored about its x axis is also tried
    /// and the smaller residual returned. Polygons of different lengths score
    /// `f64::INFINITY`.
    pub fn score(&self, other: &Polygon, allow_reflection: bool) -> f64 {
        if self.len() != other.len() {
            return f64::INFINITY;
        }
        let direct = rotation_residual(&self.vertices, &other.vertices, false);
        if allow_reflection {
            direct.min(rotation_residual(&self.vertices, &other.vertices, true))
        } else {
            direct
        }
    }
}

fn rotation_residual(p: &[(f64, f64)], q: &[(f64, f64)], mirror: bool) -> f64 {
    let sign = if mirror { -1.0 } else { 1.0 };
    let mut a = 0.0;
    let mut b = 0.0;
    let mut norms = 0.0;
    for (&(px, py), &(qx, qy)) in p.iter().zip(q) {
        let qy = sign * qy;
        a += px * qx + py * qy;
        b += qx * py - qy * px;
        norms += px * px + py * py + qx * qx + qy * qy;
    }
    (norms - 2.0 * a.hypot(b)).max(0.0)
}

/// Score two raw vertex lists, or `None` if either is degenerate.
pub fn shape_score(a: &[(f64, f64)], b: &[(f64, f64)], allow_reflection: bool) -> Option<f64> {
    let pa = Polygon::new(a)?;
    let pb = Polygon::new(b)?;
    Some(pa.score(&pb, allow_reflection))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kite() -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (4.0, 1.0), (5.0, 5.0), (1.0, 3.0), (-1.0, 1.5)]
    }

    fn similarity(pts: &[(f64, f64)], scale: f64, angle: f64, t: (f64, f64)) -> Vec<(f64, f64)> {
        let (s, c) = angle.sin_cos();
        pts.iter()
            .map(|&(x, y)| {
                (
                    scale * (c * x - s * y) + t.0,
                    scale * (s * x + c * y) + t.1,
                )
            })
            .collect()
    }

    #[test]
    fn test_normalization() {
        let p = Polygon::new(&[(10.0, 10.0), (14.0, 10.0), (14.0, 14.0), (10.0, 14.0)]).unwrap();
        let (sx, sy) = p
            .vertices()
            .iter()
            .fold((0.0, 0.0), |acc, v| (acc.0 + v.0, acc.1 + v.1));
        assert!(sx.abs() < 1e-12 && sy.abs() < 1e-12);
        let max_r = p
            .vertices()
            .iter()
            .map(|v| v.0.hypot(v.1))
            .fold(0.0f64, f64::max);
        assert!((max_r - 1.0).abs() < 1e-12);
        assert!((p.radius() - 8f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_invariant_under_similarity() {
        let base = kite();
        for &(scale, angle, t) in &[
            (1.0, 0.0, (0.0, 0.0)),
            (0.01, 0.3, (10.5, 59.9)),
            (250.0, -2.1, (-1000.0, 42.0)),
            (3.0, std::f64::consts::PI, (1.0, 1.0)),
        ] {
            let moved = similarity(&base, scale, angle, t);
            let s = shape_score(&base, &moved, false).unwrap();
            assert!(s < 1e-12, "score {s} for scale {scale} angle {angle}");
        }
    }

    #[test]
    fn test_reflection_only_when_allowed() {
        let base = kite();
        let mirrored: Vec<_> = base.iter().map(|&(x, y)| (x, -y)).collect();
        let without = shape_score(&base, &mirrored, false).unwrap();
        let with = shape_score(&base, &mirrored, true).unwrap();
        assert!(without > 0.1, "mirror image should not match: {without}");
        assert!(with < 1e-12);
    }

    #[test]
    fn test_vertex_order_matters() {
        let base = kite();
        let mut swapped = base.clone();
        swapped.swap(1, 3);
        let s = shape_score(&base, &swapped, true).unwrap();
        assert!(s > 0.1);
        assert!(s <= 2.0 * base.len() as f64);
    }

    #[test]
    fn test_degenerate_and_short() {
        assert!(Polygon::new(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]).is_none());
        assert!(Polygon::new(&[(0.0, 0.0), (1.0, 1.0)]).is_none());
        assert!(Polygon::new(&[(0.0, 0.0), (f64::NAN, 1.0), (2.0, 2.0)]).is_none());
        // collinear is still a valid shape
        assert!(Polygon::new(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).is_some());
    }

    #[test]
    fn test_length_mismatch_scores_infinite() {
        let a = Polygon::new(&kite()).unwrap();
        let b = Polygon::new(&kite()[..4]).unwrap();
        assert_eq!(a.score(&b, false), f64::INFINITY);
    }
}
