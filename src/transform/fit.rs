//! Least-squares solves behind [`PolynomialTransform`](super::PolynomialTransform).

use nalgebra::{DMatrix, DVector, Matrix3};
use tracing::debug;

use crate::error::{Error, Result};

use super::{basis, num_terms, Coefficients};

/// Relative tolerance for discarding small singular values.
const SVD_RCOND: f64 = 1e-12;

/// `|det|` below this fraction of the largest product term counts as singular.
const SINGULAR_RTOL: f64 = 1e-10;

/// Least-squares coefficients plus the numerical rank of the design matrix.
pub(crate) struct LeastSquares {
    pub coefficients: Coefficients,
    pub rank: usize,
}

/// Fit `dst ≈ P(src)` independently for both output coordinates.
///
/// Columns of the design matrix are equilibrated before the SVD so that
/// cubic terms of large pixel coordinates do not swamp the constant term.
/// A rank-deficient design yields the minimum-norm solution; callers
/// decide whether that is acceptable from `rank`.
pub(crate) fn solve_least_squares(
    order: u32,
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
) -> Result<LeastSquares> {
    if src.len() != dst.len() {
        return Err(Error::InvalidInput(format!(
            "{} source points but {} target points",
            src.len(),
            dst.len()
        )));
    }
    let terms = num_terms(order);
    let n = src.len();
    if n < terms {
        return Err(Error::UnderdeterminedFit {
            order,
            required: terms,
            got: n,
        });
    }
    if src
        .iter()
        .chain(dst)
        .any(|p| !p.0.is_finite() || !p.1.is_finite())
    {
        return Err(Error::InvalidInput("non-finite coordinate".into()));
    }

    let mut a_mat = DMatrix::<f64>::zeros(n, terms);
    let mut bx = DVector::<f64>::zeros(n);
    let mut by = DVector::<f64>::zeros(n);
    for (row, (s, d)) in src.iter().zip(dst).enumerate() {
        for (col, v) in basis(order, s.0, s.1).into_iter().enumerate() {
            a_mat[(row, col)] = v;
        }
        bx[row] = d.0;
        by[row] = d.1;
    }

    // Scale each column to unit norm; an all-zero column keeps scale 1.
    let scales: Vec<f64> = (0..terms)
        .map(|c| {
            let norm = a_mat.column(c).norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect();
    for (c, &s) in scales.iter().enumerate() {
        a_mat.column_mut(c).unscale_mut(s);
    }

    let svd = a_mat.svd(true, true);
    let sv_max = svd.singular_values.max();
    let eps = sv_max * SVD_RCOND * n.max(terms) as f64;
    let rank = svd.singular_values.iter().filter(|&&s| s > eps).count();
    if rank < terms {
        debug!(
            "Order-{} design matrix is rank deficient ({} of {} terms)",
            order, rank, terms
        );
    }

    let solve = |b: &DVector<f64>| -> Result<Vec<f64>> {
        let c = svd
            .solve(b, eps)
            .map_err(|e| Error::InvalidInput(format!("least-squares solve failed: {}", e)))?;
        Ok(c.iter().zip(&scales).map(|(v, s)| v / s).collect())
    };

    Ok(LeastSquares {
        coefficients: Coefficients {
            x: solve(&bx)?,
            y: solve(&by)?,
        },
        rank,
    })
}

/// True inverse of an order-1 transform via its augmented 3×3 matrix.
pub(crate) fn invert_affine(forward: &Coefficients) -> Result<Coefficients> {
    let (a, b, c) = (forward.x[0], forward.x[1], forward.x[2]);
    let (d, e, f) = (forward.y[0], forward.y[1], forward.y[2]);

    let determinant = a * e - b * d;
    let magnitude = (a * e).abs().max((b * d).abs());
    if !determinant.is_finite() || determinant.abs() <= SINGULAR_RTOL * magnitude {
        return Err(Error::SingularTransform { determinant });
    }

    let m = Matrix3::new(a, b, c, d, e, f, 0.0, 0.0, 1.0);
    let inv = m
        .try_inverse()
        .ok_or(Error::SingularTransform { determinant })?;

    Ok(Coefficients {
        x: vec![inv[(0, 0)], inv[(0, 1)], inv[(0, 2)]],
        y: vec![inv[(1, 0)], inv[(1, 1)], inv[(1, 2)]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_recovered() {
        let src = [(0.0, 0.0), (100.0, 0.0), (0.0, 50.0), (70.0, 30.0)];
        let dst: Vec<(f64, f64)> = src
            .iter()
            .map(|&(x, y)| (2.0 * x - 0.5 * y + 7.0, 0.25 * x + 3.0 * y - 1.0))
            .collect();
        let fit = solve_least_squares(1, &src, &dst).unwrap();
        assert_eq!(fit.rank, 3);
        let c = fit.coefficients;
        for (got, want) in c.x.iter().zip([2.0, -0.5, 7.0]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        for (got, want) in c.y.iter().zip([0.25, 3.0, -1.0]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn test_collinear_rank() {
        let src = [(0.0, 1.0), (1.0, 1.0), (2.0, 1.0), (3.0, 1.0)];
        let dst = [(5.0, 50.0), (6.0, 50.0), (7.0, 50.0), (8.0, 50.0)];
        assert_eq!(solve_least_squares(1, &src, &dst).unwrap().rank, 2);
    }

    #[test]
    fn test_invert_affine() {
        let fwd = Coefficients {
            x: vec![2.0, 0.0, 1.0],
            y: vec![0.0, 4.0, -2.0],
        };
        let inv = invert_affine(&fwd).unwrap();
        assert!((inv.x[0] - 0.5).abs() < 1e-12);
        assert!((inv.x[2] + 0.5).abs() < 1e-12);
        assert!((inv.y[1] - 0.25).abs() < 1e-12);
        assert!((inv.y[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_singular_affine() {
        let fwd = Coefficients {
            x: vec![0.5, 0.5, 0.0],
            y: vec![0.5, 0.5, 0.0],
        };
        assert!(matches!(
            invert_affine(&fwd),
            Err(Error::SingularTransform { .. })
        ));
    }
}
