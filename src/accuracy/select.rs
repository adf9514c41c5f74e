//! Robust model selection: choosing a polynomial order and dropping outliers.
//!
//! Both algorithms score candidates by leave-one-out RMSE under a single
//! residual metric. Dropping is greedy: one point per iteration, the one with
//! the largest held-out residual, kept only if the RMSE falls by at least the
//! configured ratio. It finds a locally improving subset, not the optimal one.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transform::{num_terms, PolynomialTransform};

use super::{
    fit_for_metric, model_accuracy, required_points, AccuracyOptions, ResidualMetric,
    ResidualReport,
};

/// Outcome of [`auto_choose_model`].
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub order: u32,
    /// Winning order fit on all points.
    pub model: PolynomialTransform,
    pub report: ResidualReport,
    /// RMSE per candidate order, ascending by order; `None` if it was infeasible.
    pub evaluated: Vec<(u32, Option<f64>)>,
}

/// Choose the order with the lowest RMSE.
///
/// Orders without enough points (or whose fit is degenerate) are skipped.
/// Exact ties go to the lower order. Fails with
/// [`Error::InsufficientPoints`] when no order can be evaluated.
pub fn auto_choose_model(
    pixels: &[(f64, f64)],
    coords: &[(f64, f64)],
    orders: &[u32],
    options: &AccuracyOptions,
) -> Result<ModelSelection> {
    if pixels.len() != coords.len() {
        return Err(Error::InvalidInput(format!(
            "{} pixel points but {} coordinates",
            pixels.len(),
            coords.len()
        )));
    }
    let mut orders = orders.to_vec();
    orders.sort_unstable();
    orders.dedup();
    if orders.is_empty() {
        return Err(Error::InvalidInput("no candidate orders given".into()));
    }

    let n = pixels.len();
    let mut evaluated = Vec::with_capacity(orders.len());
    let mut best: Option<(u32, ResidualReport)> = None;

    for &order in &orders {
        let report = match model_accuracy(order, pixels, coords, options) {
            Ok(r) => r,
            Err(e @ (Error::InsufficientPoints { .. }
            | Error::UnderdeterminedFit { .. }
            | Error::SingularTransform { .. })) => {
                debug!("Order {} skipped: {}", order, e);
                evaluated.push((order, None));
                continue;
            }
            Err(e) => return Err(e),
        };
        evaluated.push((order, Some(report.rmse)));
        let better = match &best {
            Some((_, b)) => report.rmse < b.rmse,
            None => true,
        };
        if better {
            best = Some((order, report));
        }
    }

    let (order, report) = best.ok_or_else(|| Error::InsufficientPoints {
        required: orders
            .iter()
            .map(|&o| required_points(o, options.leave_one_out))
            .min()
            .unwrap_or(0),
        got: n,
    })?;

    let model = fit_for_metric(order, pixels, coords, options.metric)?;
    info!(
        "Chose order {} (RMSE {:.4} {}) among {:?}",
        order,
        report.rmse,
        options.metric.unit(),
        evaluated
    );

    Ok(ModelSelection {
        order,
        model,
        report,
        evaluated,
    })
}

/// Parameters for [`auto_drop_models`].
#[derive(Debug, Clone, PartialEq)]
pub struct DropConfig {
    /// Relative RMSE reduction required to keep a drop. Default 0.10.
    pub improvement_ratio: f64,
    /// Fewest points to retain. None = `terms + 1`; smaller values are raised
    /// to `terms + 1`.
    pub min_points: Option<usize>,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            improvement_ratio: 0.10,
            min_points: None,
        }
    }
}

impl DropConfig {
    /// Effective minimum point count for an order.
    pub fn min_points_for(&self, order: u32) -> usize {
        let floor = num_terms(order) + 1;
        self.min_points.unwrap_or(floor).max(floor)
    }
}

/// Outcome of [`auto_drop_models`].
#[derive(Debug, Clone)]
pub struct DropOutcome {
    pub order: u32,
    /// Transform fit on the retained points.
    pub model: PolynomialTransform,
    /// Indices (into the input) of the retained points, ascending.
    pub kept: Vec<usize>,
    /// Indices of the dropped points, in drop order.
    pub dropped: Vec<usize>,
    /// Report on the retained points, aligned with `kept`.
    pub report: ResidualReport,
    /// RMSE of every accepted state, starting with all points.
    pub rmse_history: Vec<f64>,
}

impl DropOutcome {
    /// Retained subset of `points` (any slice aligned with the input).
    pub fn select<T: Clone>(&self, points: &[T]) -> Vec<T> {
        self.kept.iter().map(|&i| points[i].clone()).collect()
    }
}

/// RMSE at or below which a fit counts as exact and no point is dropped.
fn negligible_rmse(metric: ResidualMetric) -> f64 {
    match metric {
        ResidualMetric::PixelEuclidean => 1e-9,
        ResidualMetric::GeographicGeodesic => 1e-6,
    }
}

/// Greedily drop the worst point while that improves RMSE enough.
///
/// Each iteration removes the point with the largest residual (the first
/// one on ties) and refits. The removal is kept when
/// `new_rmse ≤ old_rmse × (1 − improvement_ratio)`, the RMSE strictly
/// falls, and at least `min_points` remain; otherwise, or if the refit
/// fails, the last accepted state is returned. A fit whose RMSE is already
/// at rounding level (1e-9 px or 1e-6 m) keeps every point.
pub fn auto_drop_models(
    order: u32,
    pixels: &[(f64, f64)],
    coords: &[(f64, f64)],
    config: &DropConfig,
    options: &AccuracyOptions,
) -> Result<DropOutcome> {
    if !(0.0..1.0).contains(&config.improvement_ratio) {
        return Err(Error::InvalidInput(format!(
            "improvement ratio must be in [0, 1), got {}",
            config.improvement_ratio
        )));
    }
    let min_points = config.min_points_for(order);

    let mut kept: Vec<usize> = (0..pixels.len()).collect();
    let mut dropped = Vec::new();
    let mut report = model_accuracy(order, pixels, coords, options)?;
    let mut rmse_history = vec![report.rmse];

    loop {
        if kept.len() <= min_points {
            debug!("Drop loop stopped at the {}-point minimum", min_points);
            break;
        }
        if report.rmse <= negligible_rmse(options.metric) {
            debug!(
                "RMSE {:.3e} {} is at rounding level; nothing to drop",
                report.rmse,
                options.metric.unit()
            );
            break;
        }
        let Some(worst) = report.worst() else {
            break;
        };

        let trial: Vec<usize> = kept
            .iter()
            .enumerate()
            .filter(|&(pos, _)| pos != worst)
            .map(|(_, &i)| i)
            .collect();
        let px: Vec<_> = trial.iter().map(|&i| pixels[i]).collect();
        let co: Vec<_> = trial.iter().map(|&i| coords[i]).collect();

        let candidate = match model_accuracy(order, &px, &co, options) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "Refit without point {} failed ({}); keeping {} points",
                    kept[worst],
                    e,
                    kept.len()
                );
                break;
            }
        };

        let target = report.rmse * (1.0 - config.improvement_ratio);
        if candidate.rmse > target || candidate.rmse >= report.rmse {
            debug!(
                "Dropping point {} gives RMSE {:.4}, needed <= {:.4}; stopping",
                kept[worst], candidate.rmse, target
            );
            break;
        }

        debug!(
            "Dropped point {} (residual {:.4}): RMSE {:.4} -> {:.4}",
            kept[worst], report.residuals[worst], report.rmse, candidate.rmse
        );
        dropped.push(kept[worst]);
        kept = trial;
        report = candidate;
        rmse_history.push(report.rmse);
    }

    let px: Vec<_> = kept.iter().map(|&i| pixels[i]).collect();
    let co: Vec<_> = kept.iter().map(|&i| coords[i]).collect();
    let model = fit_for_metric(order, &px, &co, options.metric)?;

    info!(
        "Outlier dropping: {} of {} points kept, RMSE {:.4} -> {:.4} {}",
        kept.len(),
        pixels.len(),
        rmse_history[0],
        report.rmse,
        options.metric.unit()
    );

    Ok(DropOutcome {
        order,
        model,
        kept,
        dropped,
        report,
        rmse_history,
    })
}
