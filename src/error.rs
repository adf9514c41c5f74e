//! Error types for control-point matching and transform estimation.
//!
//! Every failure is recoverable by the caller. Operations return the error and
//! leave deciding what to do next (relax parameters, fall back to manual
//! control points, abort the run) to the orchestrator.

/// Errors produced by the matching and transform-estimation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Too few names or points to form a polygon or a candidate search space.
    #[error("insufficient input: {0}")]
    InsufficientInput(String),

    /// Malformed input (length mismatch, duplicate anchors, unsupported order).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No combination reached the shape-match score threshold.
    #[error("no combination matched within threshold {threshold} (best score: {best_score:?}, {examined} examined)")]
    NoMatchFound {
        /// Configured acceptance threshold.
        threshold: f64,
        /// Lowest score seen, if any combination could be scored.
        best_score: Option<f64>,
        /// Number of combinations examined before giving up.
        examined: u64,
    },

    /// Fewer points, or fewer independent points, than polynomial terms.
    #[error("underdetermined fit: order {order} needs {required} independent points, got {got}")]
    UnderdeterminedFit {
        order: u32,
        required: usize,
        got: usize,
    },

    /// Not enough points for the requested accuracy evaluation or selection.
    #[error("insufficient points: need at least {required}, got {got}")]
    InsufficientPoints { required: usize, got: usize },

    /// The order-1 coefficient matrix is (or would be) singular.
    #[error("singular transform: determinant {determinant:.3e}")]
    SingularTransform { determinant: f64 },

    /// Prediction requested from a model that has not been fit.
    #[error("model not fit: {0}")]
    ModelNotFit(&'static str),

    /// The candidate geocoder failed for a name; passed through without retry.
    #[error("geocoder failed for {name:?}")]
    GeocoderFailure {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
