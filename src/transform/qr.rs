//! Horizontal rotation and shear separated by QR factorisation

use nalgebra::{DMatrix, Matrix2, Matrix3, Matrix3xX, Matrix4, Vector2};
use tracing::warn;

use super::svd::centroids;
use crate::math::{AffineExt, nan_matrix, numerical_rank, rank_tolerance};

/// Fit the 2×2 horizontal block, then strip per-axis scale from it
///
/// The weighted least-squares block `L` is factored as `L = Q·R`, with the
/// signs chosen so that `Q` has a positive diagonal and is a rotation.
/// Writing `R = S·H` with `S = diag(R)` leaves `H` as a unit upper-triangular
/// shear, and the linear part returned is `Q·H`.
pub(super) fn qr_factorization(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let Some((ord_centroid, abs_centroid)) = centroids(ordinates, absolutes, weights) else {
        warn!("No weighted observations, returning NaNs");
        return nan_matrix();
    };

    let n = ordinates.ncols();
    let ord = DMatrix::from_fn(n, 2, |i, axis| {
        (ordinates[(axis, i)] - ord_centroid[axis]) * weights[i].sqrt()
    });
    let abs = DMatrix::from_fn(n, 2, |i, axis| {
        (absolutes[(axis, i)] - abs_centroid[axis]) * weights[i].sqrt()
    });

    let svd = ord.svd(true, true);
    let singular_values = svd.singular_values.as_slice();
    let rank = numerical_rank(singular_values, n, 2);
    if rank < 2 {
        warn!("Poorly conditioned or singular matrix (rank {}), returning NaNs", rank);
        return nan_matrix();
    }
    let Ok(solution) = svd.solve(&abs, rank_tolerance(singular_values, n, 2)) else {
        return nan_matrix();
    };
    #[rustfmt::skip]
    let linear = Matrix2::new(
        solution[(0, 0)], solution[(1, 0)],
        solution[(0, 1)], solution[(1, 1)],
    );

    let qr = linear.qr();
    let mut q = qr.q();
    let mut r = qr.r();
    for k in 0..2 {
        if q[(k, k)] < 0.0 {
            q.column_mut(k).neg_mut();
            r.row_mut(k).neg_mut();
        }
    }

    let scale = Matrix2::from_diagonal(&r.diagonal());
    let Some(inverse_scale) = scale.try_inverse() else {
        warn!("Degenerate horizontal scale, returning NaNs");
        return nan_matrix();
    };
    let rotation_shear = q * inverse_scale * r;

    let translation_xy = Vector2::new(abs_centroid.x, abs_centroid.y)
        - rotation_shear * Vector2::new(ord_centroid.x, ord_centroid.y);

    let mut block = Matrix3::identity();
    block.fixed_view_mut::<2, 2>(0, 0).copy_from(&rotation_shear);
    Matrix4::from_parts(
        block,
        translation_xy.push(abs_centroid.z - ord_centroid.z),
    )
}
