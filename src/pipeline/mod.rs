//! End-to-end georeferencing: names and anchors in, validated transform out.
//!
//! The run moves through fixed stages:
//!
//! ```text
//! Unmatched → Matched → Fit → Validated → Final
//! ```
//!
//! - **Matched**: every name is geocoded once, and the combination search picks
//!   one candidate per name ([`crate::matcher`]).
//! - **Fit**: a polynomial order is fixed or chosen by leave-one-out RMSE
//!   ([`crate::accuracy::auto_choose_model`]).
//! - **Validated**: outliers are dropped greedily while that improves the
//!   RMSE enough ([`crate::accuracy::auto_drop_models`]).
//! - **Final**: both transform directions are fit on the retained points and
//!   packaged with their accuracy ([`GeoreferenceOutput`]).
//!
//! A failing stage does not discard earlier work. [`georeference`] returns a
//! [`GeoreferenceResult`] holding the last stage reached, all partial data,
//! and the error that stopped the run. Precomputed stage inputs can be
//! supplied as [`Priors`] to skip the stages that would produce them.

pub mod output;

use std::time::Instant;

use tracing::{info, warn};

use crate::accuracy::{
    auto_choose_model, auto_drop_models, fit_for_metric, model_accuracy, AccuracyOptions,
    DropConfig, ResidualMetric, ResidualReport,
};
use crate::error::{Error, Result};
use crate::geocoder::{resolve_candidates, CandidateGeocoder, CandidateSet};
use crate::matcher::{find_best_match, MatchConfig, MatchResult};
use crate::point::{split_tie_points, NamedPoint, TiePoint};
use crate::transform::{PolynomialTransform, SUPPORTED_ORDERS};

pub use output::{ControlPoint, GeoreferenceOutput, ResidualInfo, TransformInfo};

// ── Configuration ───────────────────────────────────────────────────────────

/// Polynomial order of the transform.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOrder {
    Fixed(u32),
    /// Choose among these orders by leave-one-out RMSE.
    Auto(Vec<u32>),
}

impl Default for ModelOrder {
    fn default() -> Self {
        ModelOrder::Auto(SUPPORTED_ORDERS.to_vec())
    }
}

/// Parameters for transform estimation.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Default: choose among orders 1, 2 and 3.
    pub order: ModelOrder,
    /// Metric for order choice and outlier dropping. Default pixel-Euclidean.
    pub metric: ResidualMetric,
    /// Drop outliers greedily after the order is fixed. Default true.
    pub auto_drop: bool,
    /// Improvement ratio and minimum retained points for dropping.
    pub drop: DropConfig,
    /// Run leave-one-out refits in parallel. Default true.
    pub parallel: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            order: ModelOrder::default(),
            metric: ResidualMetric::PixelEuclidean,
            auto_drop: true,
            drop: DropConfig::default(),
            parallel: true,
        }
    }
}

impl TransformConfig {
    fn accuracy_options(&self, metric: ResidualMetric) -> AccuracyOptions {
        AccuracyOptions {
            metric,
            leave_one_out: true,
            parallel: self.parallel,
        }
    }
}

/// Parameters for a full georeferencing run.
#[derive(Debug, Clone)]
pub struct GeoreferenceConfig {
    /// Maximum candidates requested per name. Default 10.
    pub geocode_limit: usize,
    pub matching: MatchConfig,
    pub transform: TransformConfig,
    /// Drop names without any candidate instead of failing. Default false.
    pub drop_names_without_candidates: bool,
}

impl Default for GeoreferenceConfig {
    fn default() -> Self {
        Self {
            geocode_limit: 10,
            matching: MatchConfig::default(),
            transform: TransformConfig::default(),
            drop_names_without_candidates: false,
        }
    }
}

/// Precomputed inputs that skip pipeline stages.
///
/// The most advanced prior wins: tie-points skip geocoding and matching, a
/// match result skips them too, and candidates skip only geocoding.
#[derive(Debug, Clone, Default)]
pub struct Priors {
    pub candidates: Option<CandidateSet>,
    pub matched: Option<MatchResult>,
    pub tie_points: Option<Vec<TiePoint>>,
}

// ── Results ─────────────────────────────────────────────────────────────────

/// Last stage a run completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Unmatched,
    Matched,
    Fit,
    Validated,
    Final,
}

/// Order and transform chosen at the Fit stage.
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub order: u32,
    /// Transform fit on all matched points.
    pub model: PolynomialTransform,
    /// Leave-one-out report on all matched points.
    pub report: ResidualReport,
    /// RMSE per candidate order; `None` where the order was infeasible.
    pub evaluated: Vec<(u32, Option<f64>)>,
}

/// Points retained at the Validated stage.
#[derive(Debug, Clone)]
pub struct Validation {
    /// Indices into the matched tie-points, ascending.
    pub kept: Vec<usize>,
    /// Indices of dropped tie-points, in drop order.
    pub dropped: Vec<usize>,
    /// Report on the retained points.
    pub report: ResidualReport,
    pub rmse_history: Vec<f64>,
}

/// Wall-clock time per stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    pub matching_ms: f32,
    pub fitting_ms: f32,
    pub validation_ms: f32,
    pub finalize_ms: f32,
    pub total_ms: f32,
}

/// Everything a run produced, whether or not it reached the Final stage.
#[derive(Debug)]
pub struct GeoreferenceResult {
    pub stage: PipelineStage,
    pub candidates: Option<CandidateSet>,
    /// Names dropped for lack of candidates.
    pub dropped_names: Vec<String>,
    pub matched: Option<MatchResult>,
    pub tie_points: Option<Vec<TiePoint>>,
    pub fit: Option<ModelFit>,
    pub validation: Option<Validation>,
    pub output: Option<GeoreferenceOutput>,
    /// Why the run stopped before the Final stage.
    pub error: Option<Error>,
    pub timings: StageTimings,
}

impl GeoreferenceResult {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Unmatched,
            candidates: None,
            dropped_names: Vec::new(),
            matched: None,
            tie_points: None,
            fit: None,
            validation: None,
            output: None,
            error: None,
            timings: StageTimings::default(),
        }
    }

    fn fail(mut self, err: Error, t0: Instant) -> Self {
        warn!("Georeferencing stopped at {:?}: {}", self.stage, err);
        self.error = Some(err);
        self.timings.total_ms = elapsed_ms(t0);
        self
    }

    pub fn is_final(&self) -> bool {
        self.stage == PipelineStage::Final
    }

    /// The output package, or the error that prevented it.
    pub fn into_output(self) -> Result<GeoreferenceOutput> {
        match (self.output, self.error) {
            (Some(out), _) => Ok(out),
            (None, Some(err)) => Err(err),
            (None, None) => Err(Error::InvalidInput(format!(
                "run stopped at {:?} without an error",
                self.stage
            ))),
        }
    }
}

// ── Stages ──────────────────────────────────────────────────────────────────

/// Run the full pipeline.
///
/// `anchors` are the detected names with their pixel positions; they are
/// ignored when `priors` already provides a match or tie-points.
pub fn georeference<G>(
    anchors: &[NamedPoint],
    geocoder: &G,
    priors: Priors,
    config: &GeoreferenceConfig,
) -> GeoreferenceResult
where
    G: CandidateGeocoder + ?Sized,
{
    let t0 = Instant::now();
    let mut result = GeoreferenceResult::new();

    // Unmatched → Matched
    let t = Instant::now();
    let tie_points = if let Some(tp) = priors.tie_points {
        info!("Using {} prior tie-points", tp.len());
        tp
    } else if let Some(m) = priors.matched {
        let tp = m.tie_points();
        result.matched = Some(m);
        tp
    } else {
        match match_stage(anchors, geocoder, priors.candidates, config, &mut result) {
            Ok(m) => {
                let tp = m.tie_points();
                result.matched = Some(m);
                tp
            }
            Err(e) => {
                result.timings.matching_ms = elapsed_ms(t);
                return result.fail(e, t0);
            }
        }
    };
    result.timings.matching_ms = elapsed_ms(t);
    result.tie_points = Some(tie_points.clone());
    result.stage = PipelineStage::Matched;

    // Matched → Fit
    let t = Instant::now();
    let fit = fit_stage(&tie_points, &config.transform);
    result.timings.fitting_ms = elapsed_ms(t);
    let fit = match fit {
        Ok(f) => f,
        Err(e) => return result.fail(e, t0),
    };
    let order = fit.order;
    result.fit = Some(fit);
    result.stage = PipelineStage::Fit;

    // Fit → Validated
    let t = Instant::now();
    let validation = match &result.fit {
        Some(fit) => validate_stage(&tie_points, fit, &config.transform),
        None => Err(Error::ModelNotFit("no fit stage result")),
    };
    result.timings.validation_ms = elapsed_ms(t);
    let validation = match validation {
        Ok(v) => v,
        Err(e) => return result.fail(e, t0),
    };

    // Validated → Final
    let t = Instant::now();
    let output = finalize(&tie_points, order, &validation, &config.transform);
    result.validation = Some(validation);
    result.stage = PipelineStage::Validated;
    result.timings.finalize_ms = elapsed_ms(t);
    match output {
        Ok(out) => {
            result.output = Some(out);
            result.stage = PipelineStage::Final;
        }
        Err(e) => return result.fail(e, t0),
    }

    result.timings.total_ms = elapsed_ms(t0);
    info!(
        "Georeferencing finished in {:.1}ms: order {}, {} control points",
        result.timings.total_ms,
        order,
        result
            .output
            .as_ref()
            .map_or(0, |o| o.control_points.len())
    );
    result
}

/// Estimate the final transform directly from matched tie-points.
///
/// Runs the Fit, Validated and Final stages and returns only the output.
pub fn estimate_transform(
    tie_points: &[TiePoint],
    config: &TransformConfig,
) -> Result<GeoreferenceOutput> {
    let fit = fit_stage(tie_points, config)?;
    let validation = validate_stage(tie_points, &fit, config)?;
    finalize(tie_points, fit.order, &validation, config)
}

fn match_stage<G>(
    anchors: &[NamedPoint],
    geocoder: &G,
    prior_candidates: Option<CandidateSet>,
    config: &GeoreferenceConfig,
    result: &mut GeoreferenceResult,
) -> Result<MatchResult>
where
    G: CandidateGeocoder + ?Sized,
{
    let candidates = match prior_candidates {
        Some(c) => c,
        None => {
            let names: Vec<&str> = anchors.iter().map(|a| a.name.as_str()).collect();
            resolve_candidates(geocoder, &names, config.geocode_limit)?
        }
    };
    result.candidates = Some(candidates.clone());

    let missing: Vec<String> = candidates
        .missing_names()
        .into_iter()
        .map(String::from)
        .collect();
    if missing.is_empty() {
        return find_best_match(anchors, &candidates, &config.matching);
    }
    if !config.drop_names_without_candidates {
        return Err(Error::InsufficientInput(format!(
            "no candidates for {:?}",
            missing
        )));
    }

    if anchors.len() != candidates.len() {
        return Err(Error::InvalidInput(format!(
            "{} anchors but {} candidate lists",
            anchors.len(),
            candidates.len()
        )));
    }
    let (reduced, kept) = candidates.without_missing();
    let kept_anchors: Vec<NamedPoint> = kept.iter().map(|&i| anchors[i].clone()).collect();
    info!(
        "Dropped {} names without candidates: {:?}",
        missing.len(),
        missing
    );
    result.dropped_names = missing;
    find_best_match(&kept_anchors, &reduced, &config.matching)
}

fn fit_stage(tie_points: &[TiePoint], config: &TransformConfig) -> Result<ModelFit> {
    let (pixels, coords) = split_tie_points(tie_points);
    let options = config.accuracy_options(config.metric);
    match &config.order {
        ModelOrder::Fixed(order) => {
            let report = model_accuracy(*order, &pixels, &coords, &options)?;
            let model = fit_for_metric(*order, &pixels, &coords, config.metric)?;
            Ok(ModelFit {
                order: *order,
                model,
                evaluated: vec![(*order, Some(report.rmse))],
                report,
            })
        }
        ModelOrder::Auto(orders) => {
            let sel = auto_choose_model(&pixels, &coords, orders, &options)?;
            Ok(ModelFit {
                order: sel.order,
                model: sel.model,
                report: sel.report,
                evaluated: sel.evaluated,
            })
        }
    }
}

fn validate_stage(
    tie_points: &[TiePoint],
    fit: &ModelFit,
    config: &TransformConfig,
) -> Result<Validation> {
    if !config.auto_drop {
        return Ok(Validation {
            kept: (0..tie_points.len()).collect(),
            dropped: Vec::new(),
            report: fit.report.clone(),
            rmse_history: vec![fit.report.rmse],
        });
    }
    let (pixels, coords) = split_tie_points(tie_points);
    let options = config.accuracy_options(config.metric);
    let out = auto_drop_models(fit.order, &pixels, &coords, &config.drop, &options)?;
    for &i in &out.dropped {
        info!(
            "Dropped control point {:?} -> {:?}",
            tie_points[i].name, tie_points[i].matched_name
        );
    }
    Ok(Validation {
        kept: out.kept,
        dropped: out.dropped,
        report: out.report,
        rmse_history: out.rmse_history,
    })
}

fn finalize(
    tie_points: &[TiePoint],
    order: u32,
    validation: &Validation,
    config: &TransformConfig,
) -> Result<GeoreferenceOutput> {
    let kept: Vec<TiePoint> = validation
        .kept
        .iter()
        .map(|&i| tie_points[i].clone())
        .collect();
    let (pixels, coords) = split_tie_points(&kept);
    let transform = PolynomialTransform::fitted(order, &pixels, &coords)?;

    let report_for = |metric: ResidualMetric| -> Result<ResidualReport> {
        if validation.report.metric == metric && validation.report.leave_one_out {
            Ok(validation.report.clone())
        } else {
            model_accuracy(order, &pixels, &coords, &config.accuracy_options(metric))
        }
    };
    let forward = report_for(ResidualMetric::GeographicGeodesic)?;
    let backward = report_for(ResidualMetric::PixelEuclidean)?;

    info!(
        "Final order-{} transform on {} points: forward RMSE {:.1} m, backward RMSE {:.2} px",
        order,
        kept.len(),
        forward.rmse,
        backward.rmse
    );
    GeoreferenceOutput::build(&transform, &kept, &forward, &backward, &validation.report)
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_tie_points() -> Vec<TiePoint> {
        let pixels = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (50.0, 50.0)];
        pixels
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| TiePoint {
                name: format!("P{i}"),
                pixel: (x, y),
                matched_name: format!("G{i}"),
                geo: (10.0 + 0.01 * x, 50.0 - 0.01 * y),
            })
            .collect()
    }

    fn no_geocoder(_: &str, _: usize) -> anyhow::Result<Vec<NamedPoint>> {
        anyhow::bail!("geocoder should not be called")
    }

    #[test]
    fn test_tie_point_prior_skips_matching() {
        let config = GeoreferenceConfig {
            transform: TransformConfig {
                order: ModelOrder::Fixed(1),
                auto_drop: false,
                parallel: false,
                ..TransformConfig::default()
            },
            ..GeoreferenceConfig::default()
        };
        let priors = Priors {
            tie_points: Some(square_tie_points()),
            ..Priors::default()
        };
        let result = georeference(&[], &no_geocoder, priors, &config);
        assert!(result.is_final(), "{:?}", result.error);
        assert!(result.matched.is_none());
        let out = result.into_output().unwrap();
        assert_eq!(out.control_points.len(), 5);
        assert_eq!(out.forward.model.order, 1);
        assert_eq!(out.residual_metric, ResidualMetric::PixelEuclidean);
        assert_eq!(out.backward.error.metric, ResidualMetric::PixelEuclidean);
        assert_eq!(out.forward.error.metric, ResidualMetric::GeographicGeodesic);
    }

    #[test]
    fn test_fit_failure_keeps_matched_state() {
        let config = GeoreferenceConfig {
            transform: TransformConfig {
                order: ModelOrder::Fixed(2),
                ..TransformConfig::default()
            },
            ..GeoreferenceConfig::default()
        };
        let priors = Priors {
            tie_points: Some(square_tie_points()),
            ..Priors::default()
        };
        let result = georeference(&[], &no_geocoder, priors, &config);
        assert_eq!(result.stage, PipelineStage::Matched);
        assert_eq!(result.tie_points.as_ref().map(Vec::len), Some(5));
        assert!(matches!(
            result.error,
            Some(Error::InsufficientPoints { required: 7, got: 5 })
        ));
        assert!(result.output.is_none());
    }

    #[test]
    fn test_missing_names_fail_or_drop() {
        let anchors = vec![
            NamedPoint::new("A", 0.0, 0.0),
            NamedPoint::new("B", 10.0, 0.0),
            NamedPoint::new("Nowhere", 5.0, 5.0),
            NamedPoint::new("C", 10.0, 10.0),
            NamedPoint::new("D", 0.0, 10.0),
        ];
        let geocoder = |name: &str, _: usize| -> anyhow::Result<Vec<NamedPoint>> {
            Ok(match name {
                "A" => vec![NamedPoint::new("A", 0.0, 0.0)],
                "B" => vec![NamedPoint::new("B", 1.0, 0.0)],
                "C" => vec![NamedPoint::new("C", 1.0, 1.0)],
                "D" => vec![NamedPoint::new("D", 0.0, 1.0)],
                _ => Vec::new(),
            })
        };

        let strict = georeference(
            &anchors,
            &geocoder,
            Priors::default(),
            &GeoreferenceConfig::default(),
        );
        assert_eq!(strict.stage, PipelineStage::Unmatched);
        assert!(matches!(strict.error, Some(Error::InsufficientInput(_))));
        assert_eq!(strict.candidates.as_ref().map(CandidateSet::len), Some(5));

        let lenient = GeoreferenceConfig {
            drop_names_without_candidates: true,
            transform: TransformConfig {
                order: ModelOrder::Fixed(1),
                auto_drop: false,
                ..TransformConfig::default()
            },
            ..GeoreferenceConfig::default()
        };
        let result = georeference(&anchors, &geocoder, Priors::default(), &lenient);
        assert_eq!(result.dropped_names, vec!["Nowhere".to_string()]);
        assert_eq!(result.matched.as_ref().map(|m| m.anchors.len()), Some(4));
        assert!(result.is_final(), "{:?}", result.error);
        assert_eq!(result.into_output().unwrap().control_points.len(), 4);
    }
}
