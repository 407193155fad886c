//! Geomag Adjusted - Adjusted matrix calculation for magnetic observatories
//!
//! Calibrates variometer ordinates against absolute observations. Each
//! calibration reading pairs a raw `(H, E, Z)` ordinate with a geographic
//! `(X, Y, Z)` absolute; this crate fits a sequence of 4×4 affine matrices
//! mapping one onto the other, one per time window, plus a pier correction for
//! total-field data.
//!
//! # Features
//!
//! - Exponential time weighting, causal or acausal
//! - Weighted interquartile outlier rejection on baselines
//! - Ten constrained fitting strategies (least squares, SVD, QR)
//! - Multi-stage fits composed into one matrix per window
//! - Reset markers that discard readings from before an instrument change
//! - Serde configuration and results
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::{TimeDelta, TimeZone, Utc};
//! use geomag_adjusted::{Absolute, Affine, Element, Reading, Transform, TransformKind};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let readings: Vec<Reading> = (0..4)
//!     .map(|i| {
//!         let (t, x) = (start + TimeDelta::days(i), i as f64);
//!         let end = t + TimeDelta::minutes(30);
//!         Reading::new(
//!             vec![
//!                 Absolute::new(Element::D, 8.0 + 0.1 * x, 0.02 * x, t, end),
//!                 Absolute::new(Element::H, 20500.0 + 40.0 * x, 300.0 + x, t, end),
//!                 Absolute::new(Element::Z, 47000.0 - 15.0 * x, 500.0 - 0.5 * x, t, end),
//!             ],
//!             -1.2,
//!         )
//!     })
//!     .collect();
//!
//! let affine = Affine::new("BOU", start, start + TimeDelta::days(4))
//!     .with_update_interval(None)
//!     .with_acausal(true)
//!     .with_transforms(vec![Transform::new(TransformKind::TranslateOrigins)]);
//!
//! let matrices = affine.calculate(&readings).unwrap();
//! assert_eq!(matrices.len(), 1);
//! assert!(matrices[0].is_valid());
//! ```

mod adjusted_matrix;
mod affine;
mod error;
mod math;
mod metric;
mod observations;
pub mod outliers;
mod transform;
mod types;
mod weights;

// Re-export all public types and functions
pub use adjusted_matrix::AdjustedMatrix;
pub use affine::{Affine, DEFAULT_UPDATE_INTERVAL};
pub use error::{AdjustedError, Result};
pub use math::{AffineExt, SECONDS_PER_DAY, epoch_seconds, weighted_mean};
pub use metric::{Metric, MetricElement};
pub use observations::Observations;
pub use outliers::{filter_iqr, filter_iqrs};
pub use transform::{Transform, TransformKind};
pub use types::*;
pub use weights::time_weights;
