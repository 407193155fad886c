//! Calibration result for one time window

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3xX, Matrix4, Matrix4xX};
use serde::{Deserialize, Serialize};

use crate::math::AffineExt;
use crate::metric::Metric;

/// Affine matrix and pier correction valid over `[starttime, endtime)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedMatrix {
    /// Maps `(H, E, Z, 1)` ordinates to `(X, Y, Z, 1)`
    pub matrix: Matrix4<f64>,
    /// Offset added to total-field samples
    pub pier_correction: f64,
    pub starttime: Option<DateTime<Utc>>,
    pub endtime: Option<DateTime<Utc>>,
    /// Fit quality over the readings used, X, Y, Z then dF
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl Default for AdjustedMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl AdjustedMatrix {
    /// Identity matrix with no pier correction and no validity interval
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
            pier_correction: 0.0,
            starttime: None,
            endtime: None,
            metrics: Vec::new(),
        }
    }

    /// Whether the matrix holds a usable calibration (no `NaN` entries)
    pub fn is_valid(&self) -> bool {
        !self.matrix.has_nan()
    }

    /// Whether `time` falls inside the validity interval; open ends always match
    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.starttime.is_none_or(|start| *time >= start)
            && self.endtime.is_none_or(|end| *time < end)
    }

    /// Calibrate raw samples
    ///
    /// `samples` holds one `(H, E, Z, F)` column per sample. The result holds
    /// `(X, Y, Z, F)`: the first three rows through the matrix and `F` shifted by
    /// the pier correction.
    ///
    /// # Example
    /// ```
    /// use geomag_adjusted::AdjustedMatrix;
    /// use nalgebra::{Matrix4xX, Vector4};
    ///
    /// let mut adjusted = AdjustedMatrix::identity();
    /// adjusted.pier_correction = -2.5;
    /// let samples = Matrix4xX::from_columns(&[Vector4::new(20000.0, 10.0, 45000.0, 49000.0)]);
    /// let calibrated = adjusted.process(&samples);
    /// assert_eq!(calibrated[(0, 0)], 20000.0);
    /// assert_eq!(calibrated[(3, 0)], 48997.5);
    /// ```
    pub fn process(&self, samples: &Matrix4xX<f64>) -> Matrix4xX<f64> {
        let hez: Matrix3xX<f64> = samples.fixed_rows::<3>(0).into_owned();
        let xyz = self.matrix.apply(&hez);

        let mut out = Matrix4xX::zeros(samples.ncols());
        out.fixed_rows_mut::<3>(0).copy_from(&xyz);
        for (calibrated, raw) in out.row_mut(3).iter_mut().zip(samples.row(3).iter()) {
            *calibrated = raw + self.pier_correction;
        }
        out
    }
}
