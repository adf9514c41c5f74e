//! Residuals and aggregate error of a fitted transform.
//!
//! A residual is measured in exactly one space, chosen by [`ResidualMetric`]:
//!
//! - **Pixel-Euclidean**: the geographic coordinate is mapped back through
//!   the inverse transform and compared to the anchor, in pixels.
//! - **Geographic-geodesic**: the anchor is mapped through the forward
//!   transform and compared to the geographic coordinate, in meters on WGS84.
//!
//! With leave-one-out, each point's residual comes from a model refit on all
//! other points, so a wrong control point cannot hide by pulling the fit
//! toward itself.

pub mod geodesic;
pub mod select;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::maybe_rayon::*;
use crate::transform::{num_terms, PolynomialTransform};

pub use geodesic::geodesic_distance;
pub use select::{auto_choose_model, auto_drop_models, DropConfig, DropOutcome, ModelSelection};

/// Space in which residuals are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Archive, Serialize, Deserialize)]
pub enum ResidualMetric {
    /// Distance in pixels, through the inverse transform.
    #[default]
    PixelEuclidean,
    /// Distance in meters on WGS84, through the forward transform.
    GeographicGeodesic,
}

impl ResidualMetric {
    pub fn unit(&self) -> &'static str {
        match self {
            ResidualMetric::PixelEuclidean => "px",
            ResidualMetric::GeographicGeodesic => "m",
        }
    }
}

/// How residuals are computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyOptions {
    pub metric: ResidualMetric,
    /// Refit without each point before measuring it. Default true.
    pub leave_one_out: bool,
    /// Run leave-one-out refits on the rayon pool (`parallel` feature only).
    /// Default true.
    pub parallel: bool,
}

impl Default for AccuracyOptions {
    fn default() -> Self {
        Self {
            metric: ResidualMetric::PixelEuclidean,
            leave_one_out: true,
            parallel: true,
        }
    }
}

impl AccuracyOptions {
    pub fn with_metric(metric: ResidualMetric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }
}

/// Per-point residuals and their root-mean-square.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualReport {
    pub metric: ResidualMetric,
    pub leave_one_out: bool,
    pub rmse: f64,
    /// One residual per input point, in input order.
    pub residuals: Vec<f64>,
}

impl ResidualReport {
    /// Index of the largest residual; the first one wins on ties.
    pub fn worst(&self) -> Option<usize> {
        let mut worst: Option<usize> = None;
        for (i, &r) in self.residuals.iter().enumerate() {
            match worst {
                Some(w) if self.residuals[w] >= r => {}
                _ => worst = Some(i),
            }
        }
        worst
    }
}

/// Root-mean-square of `values` (0 for an empty slice).
pub fn rmse(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Minimum number of points for an order under the given evaluation mode.
pub fn required_points(order: u32, leave_one_out: bool) -> usize {
    num_terms(order) + usize::from(leave_one_out)
}

/// Fit an order-`order` transform on `pixels → coords` for the given metric.
///
/// Pixel residuals need the inverse direction; geodesic residuals only the
/// forward one, so they never fail on a singular affine inverse.
pub(crate) fn fit_for_metric(
    order: u32,
    pixels: &[(f64, f64)],
    coords: &[(f64, f64)],
    metric: ResidualMetric,
) -> Result<PolynomialTransform> {
    let mut model = PolynomialTransform::new(order)?;
    match metric {
        ResidualMetric::PixelEuclidean => model.fit(pixels, coords)?,
        ResidualMetric::GeographicGeodesic => model.fit_forward(pixels, coords)?,
    }
    Ok(model)
}

/// Residual of one control point under `model`.
pub fn point_residual(
    model: &PolynomialTransform,
    pixel: (f64, f64),
    coord: (f64, f64),
    metric: ResidualMetric,
) -> Result<f64> {
    match metric {
        ResidualMetric::PixelEuclidean => {
            let p = model.predict_inverse(coord)?;
            Ok((p.0 - pixel.0).hypot(p.1 - pixel.1))
        }
        ResidualMetric::GeographicGeodesic => {
            let g = model.predict(pixel)?;
            Ok(geodesic_distance(g, coord))
        }
    }
}

/// Residual report of an order-`order` transform on the given control points.
///
/// Fails with [`Error::InsufficientPoints`] when fewer than `terms + 1`
/// points are given for leave-one-out (`terms` in-sample).
pub fn model_accuracy(
    order: u32,
    pixels: &[(f64, f64)],
    coords: &[(f64, f64)],
    options: &AccuracyOptions,
) -> Result<ResidualReport> {
    if pixels.len() != coords.len() {
        return Err(Error::InvalidInput(format!(
            "{} pixel points but {} coordinates",
            pixels.len(),
            coords.len()
        )));
    }
    // validates the order
    PolynomialTransform::new(order)?;

    let n = pixels.len();
    let required = required_points(order, options.leave_one_out);
    if n < required {
        return Err(Error::InsufficientPoints { required, got: n });
    }

    let metric = options.metric;
    let residuals: Vec<f64> = if options.leave_one_out {
        let held_out = |i: usize| -> Result<f64> {
            let (px, co): (Vec<_>, Vec<_>) = pixels
                .iter()
                .zip(coords)
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, (&p, &c))| (p, c))
                .unzip();
            let model = fit_for_metric(order, &px, &co, metric)?;
            point_residual(&model, pixels[i], coords[i], metric)
        };
        if options.parallel {
            (0..n).into_par_iter().map(held_out).collect::<Result<Vec<f64>>>()?
        } else {
            (0..n).map(held_out).collect::<Result<Vec<f64>>>()?
        }
    } else {
        let model = fit_for_metric(order, pixels, coords, metric)?;
        pixels
            .iter()
            .zip(coords)
            .map(|(&p, &c)| point_residual(&model, p, c, metric))
            .collect::<Result<Vec<f64>>>()?
    };

    let report = ResidualReport {
        metric,
        leave_one_out: options.leave_one_out,
        rmse: rmse(&residuals),
        residuals,
    };
    debug!(
        "Order {} on {} points: RMSE {:.4} {} (leave-one-out: {})",
        order,
        n,
        report.rmse,
        metric.unit(),
        report.leave_one_out
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four corners of a square plus its center, mapped by an exact affine.
    fn square_with_center() -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        let pixels = vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (50.0, 50.0)];
        let coords = pixels
            .iter()
            .map(|&(x, y)| (10.0 + 0.01 * x, 50.0 - 0.01 * y))
            .collect();
        (pixels, coords)
    }

    #[test]
    fn test_exact_data_has_zero_residuals() {
        let (pixels, coords) = square_with_center();
        for metric in [ResidualMetric::PixelEuclidean, ResidualMetric::GeographicGeodesic] {
            for loo in [false, true] {
                let opts = AccuracyOptions {
                    metric,
                    leave_one_out: loo,
                    parallel: false,
                };
                let report = model_accuracy(1, &pixels, &coords, &opts).unwrap();
                assert_eq!(report.residuals.len(), 5);
                assert!(report.rmse < 1e-6, "{metric:?} loo={loo}: {}", report.rmse);
                assert_eq!(report.metric, metric);
            }
        }
    }

    #[test]
    fn test_outlier_residuals() {
        let (pixels, mut coords) = square_with_center();
        coords[4].0 += 0.3;
        let opts = AccuracyOptions {
            parallel: false,
            ..AccuracyOptions::default()
        };
        let report = model_accuracy(1, &pixels, &coords, &opts).unwrap();
        let expected = [22.2222, 18.1818, 18.1818, 22.2222, 30.0];
        for (got, want) in report.residuals.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
        assert!((report.rmse - 22.58).abs() < 0.01);
        assert_eq!(report.worst(), Some(4));
    }

    #[test]
    fn test_insufficient_points() {
        let (pixels, coords) = square_with_center();
        let loo = AccuracyOptions::default();
        match model_accuracy(1, &pixels[..3], &coords[..3], &loo) {
            Err(Error::InsufficientPoints { required, got }) => assert_eq!((required, got), (4, 3)),
            other => panic!("expected InsufficientPoints, got {other:?}"),
        }
        let in_sample = AccuracyOptions {
            leave_one_out: false,
            ..loo
        };
        assert!(model_accuracy(1, &pixels[..3], &coords[..3], &in_sample).is_ok());
        assert!(model_accuracy(2, &pixels, &coords, &in_sample).is_err());
    }

    #[test]
    fn test_geodesic_residuals_in_meters() {
        let (pixels, mut coords) = square_with_center();
        coords[4].1 += 0.001;
        let opts = AccuracyOptions {
            metric: ResidualMetric::GeographicGeodesic,
            leave_one_out: false,
            parallel: false,
        };
        let report = model_accuracy(1, &pixels, &coords, &opts).unwrap();
        // a millidegree of latitude is about 111 m; least squares spreads it
        assert!(report.residuals[4] > 50.0 && report.residuals[4] < 111.5);
        assert_eq!(ResidualMetric::GeographicGeodesic.unit(), "m");
    }

    #[test]
    fn test_worst_prefers_first_on_ties() {
        let report = ResidualReport {
            metric: ResidualMetric::PixelEuclidean,
            leave_one_out: true,
            rmse: 0.0,
            residuals: vec![1.0, 3.0, 2.0, 3.0],
        };
        assert_eq!(report.worst(), Some(1));
    }
}
