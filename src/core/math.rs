//! Math primitives shared by the matching and mapping layers.

use nalgebra::{Matrix3, Vector3};

use crate::core::types::Transform;

/// Skew-symmetric (cross-product) matrix of a 3-vector.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Renormalize the rotation of a transform.
///
/// Long chains of compositions let the unit quaternion drift away from
/// unit length; this snaps it back without touching the translation.
#[inline]
pub fn orthonormalize(tf: &Transform) -> Transform {
    let mut out = *tf;
    out.rotation.renormalize();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-2.0, 0.5, 4.0);
        let cross = a.cross(&b);
        let via_skew = skew(&a) * b;
        assert_relative_eq!((cross - via_skew).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orthonormalize_preserves_pose() {
        let tf = Transform::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.3, -0.1, 0.2),
        );
        let out = orthonormalize(&tf);
        assert_relative_eq!(
            (tf.translation.vector - out.translation.vector).norm(),
            0.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(tf.rotation.angle_to(&out.rotation), 0.0, epsilon = 1e-9);
    }
}
