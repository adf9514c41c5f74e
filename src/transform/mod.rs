//! Polynomial transforms between pixel and geographic coordinates.
//!
//! A transform of order `o` maps `(x, y)` to
//!
//! ```text
//! X = Σ a_pq · x^p · y^q      (0 ≤ p+q ≤ o)
//! Y = Σ b_pq · x^p · y^q
//! ```
//!
//! Terms are ordered by decreasing total degree, then decreasing power of x:
//!
//! ```text
//! order 1: x, y, 1
//! order 2: x², xy, y², x, y, 1
//! order 3: x³, x²y, xy², y³, x², xy, y², x, y, 1
//! ```
//!
//! The forward direction (pixel → geographic) is fit by least squares. The
//! inverse direction depends on the order: an affine map is inverted exactly
//! through its augmented 3×3 matrix, while higher orders fit a second,
//! independent polynomial with inputs and outputs swapped. For orders 2 and 3
//! `forward ∘ inverse` is therefore only approximately the identity.

pub mod fit;

use nalgebra::DMatrix;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Error, Result};

/// Polynomial orders a transform may take.
pub const SUPPORTED_ORDERS: [u32; 3] = [1, 2, 3];

// ── Term helpers ────────────────────────────────────────────────────────────

/// Number of monomial terms of a full 2D polynomial: `(o+1)(o+2)/2`.
pub fn num_terms(order: u32) -> usize {
    let o = order as usize;
    (o + 1) * (o + 2) / 2
}

/// Order with exactly `terms` monomials, if any supported order has that many.
pub fn order_for_terms(terms: usize) -> Option<u32> {
    SUPPORTED_ORDERS
        .iter()
        .copied()
        .find(|&o| num_terms(o) == terms)
}

/// `(p, q)` exponent pairs in basis order.
pub fn term_pairs(order: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(num_terms(order));
    for s in (0..=order).rev() {
        for p in (0..=s).rev() {
            pairs.push((p, s - p));
        }
    }
    pairs
}

/// Evaluate the monomial basis at `(x, y)`.
pub fn basis(order: u32, x: f64, y: f64) -> Vec<f64> {
    term_pairs(order)
        .into_iter()
        .map(|(p, q)| x.powi(p as i32) * y.powi(q as i32))
        .collect()
}

fn check_order(order: u32) -> Result<()> {
    if SUPPORTED_ORDERS.contains(&order) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "unsupported polynomial order {} (expected one of {:?})",
            order, SUPPORTED_ORDERS
        )))
    }
}

// ── Model ───────────────────────────────────────────────────────────────────

/// Coefficient vectors for the two output coordinates, in basis order.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Coefficients {
    fn eval(&self, order: u32, p: (f64, f64)) -> (f64, f64) {
        let b = basis(order, p.0, p.1);
        let dot = |c: &[f64]| c.iter().zip(&b).map(|(c, v)| c * v).sum::<f64>();
        (dot(&self.x), dot(&self.y))
    }

    /// Square `terms × terms` matrix: rows 0 and 1 hold the x and y
    /// coefficients, the remaining rows are identity rows.
    fn square_matrix(&self) -> DMatrix<f64> {
        let terms = self.x.len();
        let mut m = DMatrix::<f64>::identity(terms, terms);
        for c in 0..terms {
            m[(0, c)] = self.x[c];
            m[(1, c)] = self.y[c];
        }
        m
    }

    fn from_square_matrix(m: &DMatrix<f64>) -> Self {
        Self {
            x: m.row(0).iter().copied().collect(),
            y: m.row(1).iter().copied().collect(),
        }
    }
}

/// How the inverse direction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum InverseKind {
    /// Matrix inverse of an affine transform.
    Exact,
    /// Separately regressed polynomial with inputs and outputs swapped.
    Refit,
}

/// Inverse-direction coefficients together with their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseModel {
    pub kind: InverseKind,
    pub coefficients: Coefficients,
}

/// Forward and inverse coefficient matrices in a flat, serializable form.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TransformMatrices {
    pub order: u32,
    /// Row-major `terms × terms` forward matrix.
    pub forward: Vec<f64>,
    /// Row-major `terms × terms` inverse matrix; empty if no inverse was computed.
    pub inverse: Vec<f64>,
    pub inverse_kind: Option<InverseKind>,
}

/// Polynomial pixel → geographic transform with an optional inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialTransform {
    order: u32,
    forward: Option<Coefficients>,
    inverse: Option<InverseModel>,
}

impl PolynomialTransform {
    /// An unfit transform of the given order.
    pub fn new(order: u32) -> Result<Self> {
        check_order(order)?;
        Ok(Self {
            order,
            forward: None,
            inverse: None,
        })
    }

    /// Fit both directions on `src → dst` and return the model.
    pub fn fitted(order: u32, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Result<Self> {
        let mut model = Self::new(order)?;
        model.fit(src, dst)?;
        Ok(model)
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn num_terms(&self) -> usize {
        num_terms(self.order)
    }

    pub fn is_fit(&self) -> bool {
        self.forward.is_some()
    }

    pub fn forward_coefficients(&self) -> Option<&Coefficients> {
        self.forward.as_ref()
    }

    pub fn inverse(&self) -> Option<&InverseModel> {
        self.inverse.as_ref()
    }

    pub fn inverse_kind(&self) -> Option<InverseKind> {
        self.inverse.as_ref().map(|i| i.kind)
    }

    /// Fit the forward direction and derive the inverse.
    ///
    /// Order 1 inverts the forward matrix. Higher orders regress `dst → src`.
    /// Points that do not determine every term (e.g. collinear ones) fail
    /// with [`Error::SingularTransform`] at order 1 and
    /// [`Error::UnderdeterminedFit`] above. On any error the model is left
    /// unfit.
    pub fn fit(&mut self, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Result<()> {
        self.forward = None;
        self.inverse = None;

        let forward = full_rank_fit(self.order, src, dst)?;
        let inverse = if self.order == 1 {
            InverseModel {
                kind: InverseKind::Exact,
                coefficients: fit::invert_affine(&forward)?,
            }
        } else {
            InverseModel {
                kind: InverseKind::Refit,
                coefficients: full_rank_fit(self.order, dst, src)?,
            }
        };

        self.forward = Some(forward);
        self.inverse = Some(inverse);
        Ok(())
    }

    /// Fit only the forward direction; any previous inverse is discarded.
    ///
    /// Rank-deficient input fails as in [`fit`](Self::fit).
    pub fn fit_forward(&mut self, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Result<()> {
        self.forward = None;
        self.inverse = None;
        self.forward = Some(full_rank_fit(self.order, src, dst)?);
        Ok(())
    }

    /// Map a pixel position to geographic coordinates.
    pub fn predict(&self, p: (f64, f64)) -> Result<(f64, f64)> {
        let forward = self
            .forward
            .as_ref()
            .ok_or(Error::ModelNotFit("forward transform has not been fit"))?;
        Ok(forward.eval(self.order, p))
    }

    pub fn predict_many(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
        points.iter().map(|&p| self.predict(p)).collect()
    }

    /// Map geographic coordinates back to a pixel position.
    pub fn predict_inverse(&self, p: (f64, f64)) -> Result<(f64, f64)> {
        let inverse = self
            .inverse
            .as_ref()
            .ok_or(Error::ModelNotFit("inverse transform has not been computed"))?;
        Ok(inverse.coefficients.eval(self.order, p))
    }

    pub fn predict_inverse_many(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>> {
        points.iter().map(|&p| self.predict_inverse(p)).collect()
    }

    /// The same transform with its directions swapped (geographic → pixel).
    pub fn inverted(&self) -> Result<PolynomialTransform> {
        let forward = self
            .forward
            .clone()
            .ok_or(Error::ModelNotFit("forward transform has not been fit"))?;
        let inverse = self
            .inverse
            .clone()
            .ok_or(Error::ModelNotFit("inverse transform has not been computed"))?;
        Ok(PolynomialTransform {
            order: self.order,
            forward: Some(inverse.coefficients),
            inverse: Some(InverseModel {
                kind: inverse.kind,
                coefficients: forward,
            }),
        })
    }

    /// Square forward coefficient matrix (x row, y row, identity completion).
    pub fn matrix(&self) -> Result<DMatrix<f64>> {
        self.forward
            .as_ref()
            .map(Coefficients::square_matrix)
            .ok_or(Error::ModelNotFit("forward transform has not been fit"))
    }

    /// Square inverse coefficient matrix, laid out like [`matrix`](Self::matrix).
    pub fn inverse_matrix(&self) -> Result<DMatrix<f64>> {
        self.inverse
            .as_ref()
            .map(|i| i.coefficients.square_matrix())
            .ok_or(Error::ModelNotFit("inverse transform has not been computed"))
    }

    /// Rebuild a fit transform from square coefficient matrices.
    ///
    /// The order is inferred from the matrix size (3, 6 or 10). An `Exact`
    /// inverse is only valid for order 1.
    pub fn from_matrix(
        forward: &DMatrix<f64>,
        inverse: Option<(InverseKind, &DMatrix<f64>)>,
    ) -> Result<Self> {
        if forward.nrows() != forward.ncols() {
            return Err(Error::InvalidInput(format!(
                "transform matrix must be square, got {}x{}",
                forward.nrows(),
                forward.ncols()
            )));
        }
        let order = order_for_terms(forward.nrows()).ok_or_else(|| {
            Error::InvalidInput(format!(
                "no polynomial order has {} terms",
                forward.nrows()
            ))
        })?;

        let inverse = match inverse {
            None => None,
            Some((kind, m)) => {
                if m.shape() != forward.shape() {
                    return Err(Error::InvalidInput(format!(
                        "inverse matrix shape {:?} does not match forward {:?}",
                        m.shape(),
                        forward.shape()
                    )));
                }
                if kind == InverseKind::Exact && order != 1 {
                    return Err(Error::InvalidInput(format!(
                        "an exact inverse is only defined for order 1, not {}",
                        order
                    )));
                }
                Some(InverseModel {
                    kind,
                    coefficients: Coefficients::from_square_matrix(m),
                })
            }
        };

        Ok(Self {
            order,
            forward: Some(Coefficients::from_square_matrix(forward)),
            inverse,
        })
    }

    /// Export both directions as flat row-major matrices.
    pub fn matrices(&self) -> Result<TransformMatrices> {
        let forward = self.matrix()?;
        let (inverse, inverse_kind) = match &self.inverse {
            Some(inv) => (
                row_major(&inv.coefficients.square_matrix()),
                Some(inv.kind),
            ),
            None => (Vec::new(), None),
        };
        Ok(TransformMatrices {
            order: self.order,
            forward: row_major(&forward),
            inverse,
            inverse_kind,
        })
    }

    /// Inverse of [`matrices`](Self::matrices).
    pub fn from_matrices(m: &TransformMatrices) -> Result<Self> {
        check_order(m.order)?;
        let terms = num_terms(m.order);
        let square = |v: &[f64]| -> Result<DMatrix<f64>> {
            if v.len() != terms * terms {
                return Err(Error::InvalidInput(format!(
                    "order {} needs {} matrix entries, got {}",
                    m.order,
                    terms * terms,
                    v.len()
                )));
            }
            Ok(DMatrix::from_row_slice(terms, terms, v))
        };
        let forward = square(&m.forward)?;
        match m.inverse_kind {
            Some(kind) => {
                let inverse = square(&m.inverse)?;
                Self::from_matrix(&forward, Some((kind, &inverse)))
            }
            None => Self::from_matrix(&forward, None),
        }
    }
}

fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().as_slice().to_vec()
}

/// Least-squares coefficients, rejecting a design that cannot determine
/// every term.
fn full_rank_fit(order: u32, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Result<Coefficients> {
    let ls = fit::solve_least_squares(order, src, dst)?;
    let terms = num_terms(order);
    if ls.rank == terms {
        return Ok(ls.coefficients);
    }
    if order == 1 {
        let c = &ls.coefficients;
        return Err(Error::SingularTransform {
            determinant: c.x[0] * c.y[1] - c.x[1] * c.y[0],
        });
    }
    Err(Error::UnderdeterminedFit {
        order,
        required: terms,
        got: ls.rank,
    })
}
