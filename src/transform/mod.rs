//! Constrained affine transform estimation
//!
//! Every transform maps variometer ordinates `(H, E, Z)` onto geographic
//! absolutes `(X, Y, Z)` with a 4×4 homogeneous matrix. The variants differ in
//! which entries of that matrix are free:
//!
//! | Kind | Method | Linear block | Translation |
//! |---|---|---|---|
//! | `NoConstraints` | least squares | full 3×3 | xyz |
//! | `ZRotationShear` | least squares | 2×2 XY, Z scale | xyz |
//! | `ZRotationHscale` | least squares | XY rotation + uniform scale, Z scale | xyz |
//! | `ZRotationHscaleZbaseline` | least squares | XY rotation + uniform scale | z |
//! | `Rescale3D` | least squares | diagonal | none |
//! | `TranslateOrigins` | least squares | identity | xyz |
//! | `ShearYZ` | least squares | unit lower triangular | none |
//! | `RotationTranslation3D` | SVD | proper rotation | xyz |
//! | `RotationTranslationXY` | SVD | XY proper rotation | xyz |
//! | `QRFactorization` | least squares + QR | XY rotation + shear | xyz |
//!
//! A fit without enough independent weighted observations returns a matrix of
//! `NaN`s rather than an error.

mod least_squares;
mod qr;
mod svd;

use nalgebra::{Matrix3xX, Matrix4};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdjustedError, Result};
use crate::math::nan_matrix;
use crate::weights::time_weights;

/// Constraint class of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Unconstrained 12-parameter affine map
    NoConstraints,
    /// XY independent of Z and Z independent of XY; shear and scale allowed in XY
    ZRotationShear,
    /// Rotation about Z with uniform horizontal scale; Z scaled and shifted
    ZRotationHscale,
    /// Rotation about Z with uniform horizontal scale; Z shifted only
    ZRotationHscaleZbaseline,
    /// Independent rescaling of each axis
    Rescale3D,
    /// Pure translation
    TranslateOrigins,
    /// Unit diagonal with Y sheared by X and Z sheared by X and Y
    ShearYZ,
    /// Rigid 3D rotation and translation
    RotationTranslation3D,
    /// Rigid rotation and translation in XY, translation in Z
    RotationTranslationXY,
    /// XY rotation and shear separated by QR factorisation, translation in Z
    QRFactorization,
}

/// One stage of an adjusted matrix calculation
///
/// # Example
/// ```
/// use geomag_adjusted::{Transform, TransformKind, SECONDS_PER_DAY};
///
/// let stage = Transform::new(TransformKind::RotationTranslationXY)
///     .with_memory(100.0 * SECONDS_PER_DAY)
///     .with_acausal(true);
/// assert_eq!(stage.memory_seconds(), 8_640_000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Constraint class
    #[serde(rename = "type")]
    pub kind: TransformKind,
    /// Exponential decay time constant in seconds; `None` means no decay
    #[serde(default)]
    pub memory: Option<f64>,
    /// Whether readings after the target epoch may contribute
    #[serde(default)]
    pub acausal: bool,
}

impl Transform {
    /// Create a causal transform with infinite memory
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            memory: None,
            acausal: false,
        }
    }

    /// Set the memory in seconds
    pub fn with_memory(mut self, seconds: f64) -> Self {
        self.memory = Some(seconds);
        self
    }

    pub fn with_acausal(mut self, acausal: bool) -> Self {
        self.acausal = acausal;
        self
    }

    /// Memory in seconds, `f64::INFINITY` when unset
    pub fn memory_seconds(&self) -> f64 {
        self.memory.unwrap_or(f64::INFINITY)
    }

    /// Reject memories that are not strictly positive
    pub fn validate(&self) -> Result<()> {
        match self.memory {
            Some(memory) if !(memory > 0.0) => Err(AdjustedError::InvalidMemory { memory }),
            _ => Ok(()),
        }
    }

    /// Time weights for this stage centred on `epoch`
    ///
    /// Readings after the epoch are admitted when either this transform or the
    /// caller (`acausal`) allows it.
    pub fn weights(&self, times: &[f64], epoch: f64, acausal: bool) -> Vec<f64> {
        time_weights(times, self.memory_seconds(), epoch, self.acausal || acausal)
    }

    /// Fit this transform's matrix
    ///
    /// # Arguments
    /// * `ordinates` - `(H, E, Z)` columns, one per reading
    /// * `absolutes` - `(X, Y, Z)` columns, one per reading
    /// * `weights` - Per-reading weights; `None` weighs every reading equally
    ///
    /// # Returns
    /// The fitted 4×4 matrix, all `NaN` if the fit is under-determined or a
    /// reading with positive weight is not finite. Readings with zero weight
    /// are dropped before fitting.
    ///
    /// # Errors
    /// [`AdjustedError::ShapeMismatch`] if the inputs disagree in length
    pub fn calculate(
        &self,
        ordinates: &Matrix3xX<f64>,
        absolutes: &Matrix3xX<f64>,
        weights: Option<&[f64]>,
    ) -> Result<Matrix4<f64>> {
        let n = ordinates.ncols();
        check_len("absolutes", n, absolutes.ncols())?;
        let ones;
        let weights = match weights {
            Some(w) => {
                check_len("weights", n, w.len())?;
                w
            }
            None => {
                ones = vec![1.0; n];
                &ones
            }
        };

        // zero-weight readings contribute nothing, whatever their values
        let kept: Vec<usize> = (0..n).filter(|&i| weights[i] > 0.0).collect();
        let ordinates = ordinates.select_columns(&kept);
        let absolutes = absolutes.select_columns(&kept);
        let weights: Vec<f64> = kept.iter().map(|&i| weights[i]).collect();

        let finite = ordinates
            .iter()
            .chain(absolutes.iter())
            .chain(&weights)
            .all(|v| v.is_finite());
        if !finite {
            warn!("Non-finite weighted inputs to {:?}, returning NaNs", self.kind);
            return Ok(nan_matrix());
        }

        debug!("Fitting {:?} to {} of {} readings", self.kind, kept.len(), n);
        let (o, a, w) = (&ordinates, &absolutes, weights.as_slice());
        let matrix = match self.kind {
            TransformKind::NoConstraints => least_squares::no_constraints(o, a, w),
            TransformKind::ZRotationShear => least_squares::z_rotation_shear(o, a, w),
            TransformKind::ZRotationHscale => least_squares::z_rotation_hscale(o, a, w),
            TransformKind::ZRotationHscaleZbaseline => {
                least_squares::z_rotation_hscale_zbaseline(o, a, w)
            }
            TransformKind::Rescale3D => least_squares::rescale_3d(o, a, w),
            TransformKind::TranslateOrigins => least_squares::translate_origins(o, a, w),
            TransformKind::ShearYZ => least_squares::shear_yz(o, a, w),
            TransformKind::RotationTranslation3D => svd::rotation_translation_3d(o, a, w),
            TransformKind::RotationTranslationXY => svd::rotation_translation_xy(o, a, w),
            TransformKind::QRFactorization => qr::qr_factorization(o, a, w),
        };
        Ok(matrix)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AdjustedError::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}
