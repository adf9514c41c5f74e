//! Final georeferencing package: transforms, their accuracy, and the
//! control points they were fit on. Serializable with rkyv.

use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::accuracy::{ResidualMetric, ResidualReport};
use crate::error::{Error, Result};
use crate::point::TiePoint;
use crate::transform::{PolynomialTransform, TransformMatrices};

/// Accuracy of one transform direction.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ResidualInfo {
    pub metric: ResidualMetric,
    pub leave_one_out: bool,
    pub rmse: f64,
    /// Aligned with [`GeoreferenceOutput::control_points`].
    pub residuals: Vec<f64>,
}

impl From<&ResidualReport> for ResidualInfo {
    fn from(r: &ResidualReport) -> Self {
        Self {
            metric: r.metric,
            leave_one_out: r.leave_one_out,
            rmse: r.rmse,
            residuals: r.residuals.clone(),
        }
    }
}

/// A transform direction with its accuracy.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TransformInfo {
    pub model: TransformMatrices,
    pub error: ResidualInfo,
}

/// An accepted control point.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ControlPoint {
    pub name: String,
    pub matched_name: String,
    /// `[column, row]`.
    pub pixel: [f64; 2],
    /// `[longitude, latitude]`.
    pub geo: [f64; 2],
    /// Residual under [`GeoreferenceOutput::residual_metric`].
    pub residual: f64,
}

/// Output of a successful georeferencing run.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct GeoreferenceOutput {
    /// Pixel → geographic transform; residuals in meters.
    pub forward: TransformInfo,
    /// Geographic → pixel transform; residuals in pixels.
    pub backward: TransformInfo,
    /// Metric used to select the order and drop outliers.
    pub residual_metric: ResidualMetric,
    pub control_points: Vec<ControlPoint>,
}

impl GeoreferenceOutput {
    /// Assemble the package from the final transform and its reports.
    ///
    /// `selection` is the report under the configured metric; its residuals
    /// are attached to the control points.
    pub(crate) fn build(
        transform: &PolynomialTransform,
        tie_points: &[TiePoint],
        forward_report: &ResidualReport,
        backward_report: &ResidualReport,
        selection: &ResidualReport,
    ) -> Result<Self> {
        if selection.residuals.len() != tie_points.len() {
            return Err(Error::InvalidInput(format!(
                "{} residuals for {} control points",
                selection.residuals.len(),
                tie_points.len()
            )));
        }
        let control_points = tie_points
            .iter()
            .zip(&selection.residuals)
            .map(|(t, &residual)| ControlPoint {
                name: t.name.clone(),
                matched_name: t.matched_name.clone(),
                pixel: [t.pixel.0, t.pixel.1],
                geo: [t.geo.0, t.geo.1],
                residual,
            })
            .collect();

        Ok(Self {
            forward: TransformInfo {
                model: transform.matrices()?,
                error: forward_report.into(),
            },
            backward: TransformInfo {
                model: transform.inverted()?.matrices()?,
                error: backward_report.into(),
            },
            residual_metric: selection.metric,
            control_points,
        })
    }

    /// Pixel → geographic transform.
    pub fn forward_transform(&self) -> Result<PolynomialTransform> {
        PolynomialTransform::from_matrices(&self.forward.model)
    }

    /// Geographic → pixel transform.
    pub fn backward_transform(&self) -> Result<PolynomialTransform> {
        PolynomialTransform::from_matrices(&self.backward.model)
    }

    /// Control points as tie-points.
    pub fn tie_points(&self) -> Vec<TiePoint> {
        self.control_points
            .iter()
            .map(|c| TiePoint {
                name: c.name.clone(),
                pixel: (c.pixel[0], c.pixel[1]),
                matched_name: c.matched_name.clone(),
                geo: (c.geo[0], c.geo[1]),
            })
            .collect()
    }

    /// Geographic bounding box `(min_lon, min_lat, max_lon, max_lat)` of an
    /// image of the given size, from its four corners.
    pub fn image_bounds(&self, width: u32, height: u32) -> Result<(f64, f64, f64, f64)> {
        let forward = self.forward_transform()?;
        let (w, h) = (width as f64, height as f64);
        let corners = forward.predict_many(&[(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;
        Ok(corners.iter().fold(
            (
                f64::INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::NEG_INFINITY,
            ),
            |b, c| (b.0.min(c.0), b.1.min(c.1), b.2.max(c.0), b.3.max(c.1)),
        ))
    }

    /// Serialize with rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save to a file using rkyv.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(
            "Saved georeference to {} ({} bytes)",
            path.as_ref().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Load from an rkyv file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let out = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded georeference: order {}, {} control points",
            out.forward.model.order,
            out.control_points.len()
        );
        Ok(out)
    }
}
