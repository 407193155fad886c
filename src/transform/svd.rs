//! Rigid transforms by SVD of the weighted cross-covariance (Kabsch)

use nalgebra::{Matrix2, Matrix3, Matrix3xX, Matrix4, Vector3};
use tracing::warn;

use crate::math::{AffineExt, nan_matrix, numerical_rank};

/// Weighted centroids of ordinates and absolutes, `None` if the weights sum to zero
pub(super) fn centroids(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let mut ord = Vector3::zeros();
    let mut abs = Vector3::zeros();
    for ((o, a), &w) in ordinates.column_iter().zip(absolutes.column_iter()).zip(weights) {
        ord += o * w;
        abs += a * w;
    }
    Some((ord / total, abs / total))
}

/// `Σ w (o - ō)(a - ā)ᵀ`
fn cross_covariance(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
    ord_centroid: &Vector3<f64>,
    abs_centroid: &Vector3<f64>,
) -> Matrix3<f64> {
    let mut h = Matrix3::zeros();
    for ((o, a), &w) in ordinates.column_iter().zip(absolutes.column_iter()).zip(weights) {
        h += (o - ord_centroid) * (a - abs_centroid).transpose() * w;
    }
    h
}

/// Proper rotation and translation in 3D
pub(super) fn rotation_translation_3d(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let Some((ord_centroid, abs_centroid)) = centroids(ordinates, absolutes, weights) else {
        warn!("No weighted observations, returning NaNs");
        return nan_matrix();
    };
    let h = cross_covariance(ordinates, absolutes, weights, &ord_centroid, &abs_centroid);

    let svd = h.svd(true, true);
    let rank = numerical_rank(svd.singular_values.as_slice(), 3, 3);
    if rank < 2 {
        warn!("Poorly conditioned or singular matrix (rank {}), returning NaNs", rank);
        return nan_matrix();
    }
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return nan_matrix();
    };

    // flip the weakest axis if needed so the result is a rotation, not a reflection
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let rotation = v * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * u.transpose();

    Matrix4::from_parts(rotation, abs_centroid - rotation * ord_centroid)
}

/// Proper rotation about Z and translation in XY, Z shifted by the centroid difference
pub(super) fn rotation_translation_xy(
    ordinates: &Matrix3xX<f64>,
    absolutes: &Matrix3xX<f64>,
    weights: &[f64],
) -> Matrix4<f64> {
    let Some((ord_centroid, abs_centroid)) = centroids(ordinates, absolutes, weights) else {
        warn!("No weighted observations, returning NaNs");
        return nan_matrix();
    };
    let covariance =
        cross_covariance(ordinates, absolutes, weights, &ord_centroid, &abs_centroid);
    let h: Matrix2<f64> = covariance.fixed_view::<2, 2>(0, 0).into_owned();

    let svd = h.svd(true, true);
    let rank = numerical_rank(svd.singular_values.as_slice(), 2, 2);
    if rank < 1 {
        warn!("Poorly conditioned or singular matrix (rank {}), returning NaNs", rank);
        return nan_matrix();
    }
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return nan_matrix();
    };

    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let rotation_xy = v * Matrix2::new(1.0, 0.0, 0.0, d) * u.transpose();

    let mut rotation = Matrix3::identity();
    rotation.fixed_view_mut::<2, 2>(0, 0).copy_from(&rotation_xy);
    let mut translation = abs_centroid - rotation * ord_centroid;
    translation.z = abs_centroid.z - ord_centroid.z;

    Matrix4::from_parts(rotation, translation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation_z(angle: f64) -> Matrix3<f64> {
        let (s, c) = angle.sin_cos();
        Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
    }

    fn points() -> Matrix3xX<f64> {
        Matrix3xX::from_fn(5, |r, c| match r {
            0 => 20000.0 + 30.0 * c as f64,
            1 => 10.0 * ((c * 7) % 5) as f64,
            _ => 45000.0 + 12.0 * ((c * 3) % 5) as f64,
        })
    }

    #[test]
    fn test_centroids_zero_weight() {
        let p = points();
        assert!(centroids(&p, &p, &[0.0; 5]).is_none());
        let (o, _) = centroids(&p, &p, &[0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(o, p.column(2).into_owned());
    }

    #[test]
    fn test_xy_rotation_recovered() {
        let ord = points();
        let m = Matrix4::from_parts(rotation_z(0.01), Vector3::new(-50.0, 20.0, 3.0));
        let abs = m.apply(&ord);

        let fitted = rotation_translation_xy(&ord, &abs, &[1.0; 5]);
        assert!((fitted - m).abs().max() < 1e-6);
    }

    #[test]
    fn test_reflection_is_corrected() {
        let ord = points();
        // mirror Y; the best proper rotation is not a reflection
        let flip = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, 1.0));
        let mirror = Matrix4::from_parts(flip, Vector3::zeros());
        let abs = mirror.apply(&ord);

        let fitted = rotation_translation_3d(&ord, &abs, &[1.0; 5]);
        assert!((fitted.linear().determinant() - 1.0).abs() < 1e-9);
        let fitted = rotation_translation_xy(&ord, &abs, &[1.0; 5]);
        assert!((fitted.linear().determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let ord = points();
        let weights = [0.0, 1.0, 0.0, 0.0, 0.0];
        assert!(rotation_translation_3d(&ord, &ord, &weights).has_nan());
        assert!(rotation_translation_xy(&ord, &ord, &weights).has_nan());
    }
}
