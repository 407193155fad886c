//! Numerical helpers and nalgebra extensions for adjusted matrix calculations

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Matrix3xX, Matrix4, Vector3};

/// Seconds per day, the natural unit for memories and update intervals
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Seconds since the Unix epoch, with sub-second precision
pub fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9
}

/// 4×4 matrix of `NaN`, meaning "no result"
pub fn nan_matrix() -> Matrix4<f64> {
    Matrix4::from_element(f64::NAN)
}

/// Stack 3-vectors into a 3×N matrix; an empty slice gives a 3×0 matrix
pub fn stack_columns(columns: &[Vector3<f64>]) -> Matrix3xX<f64> {
    Matrix3xX::from_fn(columns.len(), |row, col| columns[col][row])
}

/// Weighted mean of `values`; `NaN` when the weights sum to zero
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return f64::NAN;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total
}

/// Rank of a matrix from its singular values
///
/// Singular values below `σ_max · max(rows, cols) · ε` count as zero, the same
/// cutoff LAPACK-based least-squares solvers use.
pub fn numerical_rank(singular_values: &[f64], rows: usize, cols: usize) -> usize {
    let tolerance = rank_tolerance(singular_values, rows, cols);
    singular_values.iter().filter(|&&s| s > tolerance).count()
}

/// Cutoff below which a singular value is treated as zero
pub fn rank_tolerance(singular_values: &[f64], rows: usize, cols: usize) -> f64 {
    let max = singular_values.iter().cloned().fold(0.0, f64::max);
    max * rows.max(cols) as f64 * f64::EPSILON
}

/// Extension trait for 4×4 homogeneous affine matrices
pub trait AffineExt {
    /// Build an affine matrix from a linear block and a translation
    fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>) -> Matrix4<f64>;

    /// Upper-left 3×3 block
    fn linear(&self) -> Matrix3<f64>;

    /// Last column, first three rows
    fn translation(&self) -> Vector3<f64>;

    /// Apply to a batch of column vectors, treating each as `(x, y, z, 1)`
    fn apply(&self, points: &Matrix3xX<f64>) -> Matrix3xX<f64>;

    /// Whether any entry is `NaN`
    fn has_nan(&self) -> bool;
}

impl AffineExt for Matrix4<f64> {
    fn from_parts(linear: Matrix3<f64>, translation: Vector3<f64>) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        m
    }

    fn linear(&self) -> Matrix3<f64> {
        self.fixed_view::<3, 3>(0, 0).into_owned()
    }

    fn translation(&self) -> Vector3<f64> {
        self.fixed_view::<3, 1>(0, 3).into_owned()
    }

    fn apply(&self, points: &Matrix3xX<f64>) -> Matrix3xX<f64> {
        let mut out = self.linear() * points;
        let translation = self.translation();
        for mut column in out.column_iter_mut() {
            column += translation;
        }
        out
    }

    fn has_nan(&self) -> bool {
        self.iter().any(|v| v.is_nan())
    }
}
