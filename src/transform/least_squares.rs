//! Least-squares transforms
//!
//! Each reading contributes three equations (one per output axis). The
//! constraint class decides which matrix entries appear as unknowns, so the
//! regressor has one column per free parameter and `3 · n` rows. Rows are
//! scaled by `sqrt(w)` before solving.

use nalgebra::{DMatrix, DVector, Matrix3xX, Matrix4};
use tracing::warn;

use crate::math::{nan_matrix, numerical_rank, rank_tolerance};

/// Stacked regression problem, row `3·i + axis` for reading `i`
struct Design {
    regressors: DMatrix<f64>,
    targets: DVector<f64>,
}

impl Design {
    /// Empty regressor with the absolutes as targets
    fn new(absolutes: &Matrix3xX<f64>, parameters: usize) -> Self {
        let n = absolutes.ncols();
        Self {
            regressors: DMatrix::zeros(3 * n, parameters),
            targets: DVector::from_fn(3 * n, |row, _| absolutes[(row % 3, row / 3)]),
        }
    }

    fn set(&mut self, reading: usize, axis: usize, parameter: usize, value: f64) {
        self.regressors[(3 * reading + axis, parameter)] = value;
    }

    /// Move the ordinate of `axis` to the left-hand side, leaving only the
    /// correction to be explained by the free parameters
    fn subtract_ordinate(&mut self, ordinates: &Matrix3xX<f64>, axis: usize) {
        for (i, column) in ordinates.column_iter().enumerate() {
            self.targets[3 * i + axis] -= column[axis];
        }
    }

    /// Weighted solve; `None` if the regressor is rank deficient
    fn solve(mut self, weights: &[f64]) -> Option<DVector<f64>> {
        let (rows, parameters) = self.regressors.shape();
        if rows < parameters {
            warn!("{} equations for {} parameters, returning NaNs", rows, parameters);
            return None;
        }

        for (i, &w) in weights.iter().enumerate() {
            let scale = w.sqrt();
            for axis in 0..3 {
                self.regressors.row_mut(3 * i + axis).scale_mut(scale);
                self.targets[3 * i + axis] *= scale;
            }
        }

        let svd = self.regressors.svd(true, true);
        let singular_values = svd.singular_values.as_slice();
        let rank = numerical_rank(singular_values, rows, parameters);
        if rank < parameters {
            warn!(
                "Poorly conditioned or singular matrix (rank {} < {}), returning NaNs",
                rank, parameters
            );
            return None;
        }
        let tolerance = rank_tolerance(singular_values, rows, parameters);
        svd.solve(&self.targets, tolerance).ok()
    }
}

/// Full affine map with 12 free parameters
pub(super) fn no_constraints(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 12);
    for (i, o) in ordinates.column_iter().enumerate() {
        for axis in 0..3 {
            design.set(i, axis, 4 * axis, o[0]);
            design.set(i, axis, 4 * axis + 1, o[1]);
            design.set(i, axis, 4 * axis + 2, o[2]);
            design.set(i, axis, 4 * axis + 3, 1.0);
        }
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            m[0], m[1], m[2], m[3],
            m[4], m[5], m[6], m[7],
            m[8], m[9], m[10], m[11],
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// XY from H and E only, Z from Z only, each with an offset
pub(super) fn z_rotation_shear(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 8);
    for (i, o) in ordinates.column_iter().enumerate() {
        design.set(i, 0, 0, o[0]);
        design.set(i, 0, 1, o[1]);
        design.set(i, 0, 2, 1.0);
        design.set(i, 1, 3, o[0]);
        design.set(i, 1, 4, o[1]);
        design.set(i, 1, 5, 1.0);
        design.set(i, 2, 6, o[2]);
        design.set(i, 2, 7, 1.0);
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            m[0], m[1], 0.0, m[2],
            m[3], m[4], 0.0, m[5],
            0.0, 0.0, m[6], m[7],
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// Rotation about Z with a uniform horizontal scale
pub(super) fn z_rotation_hscale(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 6);
    for (i, o) in ordinates.column_iter().enumerate() {
        // x = a·h + b·e + tx,  y = -b·h + a·e + ty
        design.set(i, 0, 0, o[0]);
        design.set(i, 0, 1, o[1]);
        design.set(i, 0, 2, 1.0);
        design.set(i, 1, 0, o[1]);
        design.set(i, 1, 1, -o[0]);
        design.set(i, 1, 3, 1.0);
        design.set(i, 2, 4, o[2]);
        design.set(i, 2, 5, 1.0);
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            m[0], m[1], 0.0, m[2],
            -m[1], m[0], 0.0, m[3],
            0.0, 0.0, m[4], m[5],
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// Rotation about Z with a uniform horizontal scale, Z baseline shift only
pub(super) fn z_rotation_hscale_zbaseline(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 3);
    design.subtract_ordinate(ordinates, 2);
    for (i, o) in ordinates.column_iter().enumerate() {
        design.set(i, 0, 0, o[0]);
        design.set(i, 0, 1, o[1]);
        design.set(i, 1, 0, o[1]);
        design.set(i, 1, 1, -o[0]);
        design.set(i, 2, 2, 1.0);
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            m[0], m[1], 0.0, 0.0,
            -m[1], m[0], 0.0, 0.0,
            0.0, 0.0, 1.0, m[2],
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// Independent scale factor per axis
pub(super) fn rescale_3d(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 3);
    for (i, o) in ordinates.column_iter().enumerate() {
        for axis in 0..3 {
            design.set(i, axis, axis, o[axis]);
        }
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            m[0], 0.0, 0.0, 0.0,
            0.0, m[1], 0.0, 0.0,
            0.0, 0.0, m[2], 0.0,
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// Offset per axis, identity linear block
pub(super) fn translate_origins(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 3);
    for axis in 0..3 {
        design.subtract_ordinate(ordinates, axis);
    }
    for i in 0..ordinates.ncols() {
        for axis in 0..3 {
            design.set(i, axis, axis, 1.0);
        }
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            1.0, 0.0, 0.0, m[0],
            0.0, 1.0, 0.0, m[1],
            0.0, 0.0, 1.0, m[2],
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

/// Unit diagonal; Y sheared by X, Z sheared by X and Y
pub(super) fn shear_yz(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let mut design = Design::new(absolutes, 3);
    for axis in 0..3 {
        design.subtract_ordinate(ordinates, axis);
    }
    for (i, o) in ordinates.column_iter().enumerate() {
        design.set(i, 1, 0, o[0]);
        design.set(i, 2, 1, o[0]);
        design.set(i, 2, 2, o[1]);
    }

    match design.solve(weights) {
        #[rustfmt::skip]
        Some(m) => Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            m[0], 1.0, 0.0, 0.0,
            m[1], m[2], 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ),
        None => nan_matrix(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud() -> Matrix3xX<f64> {
        Matrix3xX::from_fn(6, |r, c| match r {
            0 => 20000.0 + 40.0 * c as f64,
            1 => -30.0 + 17.0 * ((c * c) % 5) as f64,
            _ => 45000.0 - 25.0 * ((c * 3) % 4) as f64,
        })
    }

    #[test]
    fn test_design_targets_interleaved() {
        let abs = cloud();
        let design = Design::new(&abs, 2);
        assert_eq!(design.targets.len(), 18);
        assert_eq!(design.targets[4], abs[(1, 1)]);
        assert_eq!(design.targets[17], abs[(2, 5)]);
    }

    #[test]
    fn test_zero_weights_are_rank_deficient() {
        let ord = cloud();
        let m = rescale_3d(&ord, &ord, &[0.0; 6]);
        assert!(m.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_too_few_readings() {
        let ord = cloud();
        let few = ord.columns(0, 3).into_owned();
        // 9 equations cannot pin down 12 parameters
        assert!(no_constraints(&few, &few, &[1.0; 3]).iter().all(|v| v.is_nan()));
        // one reading is enough for a pure translation
        let one = ord.columns(0, 1).into_owned();
        assert!(!translate_origins(&one, &one, &[1.0]).iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_identity_recovered() {
        let ord = cloud();
        let m = z_rotation_shear(&ord, &ord, &[1.0; 6]);
        assert!((m - Matrix4::identity()).abs().max() < 1e-6);
    }
}
