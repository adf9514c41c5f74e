//! # georef
//!
//! Georeferencing of scanned maps from **toponyms**: place names read off the
//! image, each with a pixel position.
//!
//! Every name is looked up in a gazetteer, which usually returns several
//! candidate locations. The engine picks the one combination of candidates
//! whose geographic layout has the same *shape* as the layout of the names in
//! the image. It then fits a polynomial transform between pixel and
//! geographic space, rejects outlying control points and reports accuracy
//! under leave-one-out cross-validation.
//!
//! ## Example
//!
//! ```no_run
//! use georef::{georeference, Gazetteer, GeoreferenceConfig, NamedPoint, Priors};
//!
//! let gazetteer = Gazetteer::from_csv("data/places.csv").unwrap();
//! let anchors = vec![
//!     NamedPoint::new("Springfield", 120.0, 340.0),
//!     NamedPoint::new("Shelbyville", 810.0, 295.0),
//!     NamedPoint::new("Ogdenville", 460.0, 720.0),
//!     NamedPoint::new("North Haverbrook", 300.0, 90.0),
//!     // ... more names ...
//! ];
//!
//! let result = georeference(&anchors, &gazetteer, Priors::default(), &GeoreferenceConfig::default());
//! match result.into_output() {
//!     Ok(out) => {
//!         let forward = out.forward_transform().unwrap();
//!         println!("center: {:?}", forward.predict((512.0, 512.0)).unwrap());
//!         println!("RMSE: {:.1} m", out.forward.error.rmse);
//!         out.save_to_file("data/map.georef").unwrap();
//!     }
//!     Err(e) => eprintln!("georeferencing failed: {e}"),
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Geocoding**: each distinct name is resolved once to a candidate list
//! 2. **Combination search**: the cartesian product of the lists is enumerated
//!    lazily, and each combination is scored by 2-D Procrustes distance
//!    against the pixel anchors, in batches with an exact-match short circuit
//! 3. **Order selection**: polynomial orders 1 to 3 are compared by
//!    leave-one-out RMSE
//! 4. **Outlier dropping**: the worst control point is removed greedily while
//!    the RMSE improves by a configurable ratio
//! 5. **Final transform**: forward and backward transforms are refit on the
//!    retained points and packaged with their accuracy

pub mod accuracy;
pub mod error;
pub mod geocoder;
pub mod matcher;
pub(crate) mod maybe_rayon;
pub mod pipeline;
pub mod point;
pub mod transform;

pub use accuracy::{
    auto_choose_model, auto_drop_models, geodesic_distance, model_accuracy, AccuracyOptions,
    DropConfig, DropOutcome, ModelSelection, ResidualMetric, ResidualReport,
};
pub use error::{Error, Result};
pub use geocoder::{resolve_candidates, CandidateGeocoder, CandidateSet, Gazetteer, GazetteerEntry};
pub use matcher::{find_best_match, MatchConfig, MatchResult, ScoredCombination, SearchStats};
pub use pipeline::{
    estimate_transform, georeference, ControlPoint, GeoreferenceConfig, GeoreferenceOutput,
    GeoreferenceResult, ModelOrder, PipelineStage, Priors, TransformConfig,
};
pub use point::{split_tie_points, NamedPoint, TiePoint};
pub use transform::{InverseKind, PolynomialTransform, TransformMatrices};
