//! Rigid-body transforms and uncertainty in SE(3).

use nalgebra::{Isometry3, Matrix6, Translation3, UnitQuaternion, Vector3};

/// A rigid-body transform in 3D space.
///
/// Composition (`a * b`), inversion and construction from rotation +
/// translation come with the type. The map frame, robot frame and sensor
/// frames are all related by values of this type.
pub type Transform = Isometry3<f64>;

/// 6×6 covariance matrix in the tangent coordinates of SE(3).
///
/// Ordering is translation (x, y, z) followed by rotation (axis-angle).
/// Solvers consume the inverse (the information matrix).
pub type Covariance = Matrix6<f64>;

/// 6-vector representation of a transform: translation + axis-angle.
pub type Vector6 = nalgebra::Vector6<f64>;

/// Transformation with corresponding covariance matrix.
#[derive(Debug, Clone)]
pub struct TransformWithCovariance {
    pub transform: Transform,
    pub covariance: Covariance,
}

impl TransformWithCovariance {
    /// Create from a transform and its covariance.
    pub fn new(transform: Transform, covariance: Covariance) -> Self {
        Self {
            transform,
            covariance,
        }
    }
}

impl Default for TransformWithCovariance {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            covariance: Covariance::identity(),
        }
    }
}

/// Length of the translation component in meters.
#[inline]
pub fn translation_norm(tf: &Transform) -> f64 {
    tf.translation.vector.norm()
}

/// Magnitude of the rotation component in radians, in [0, π].
#[inline]
pub fn rotation_angle(tf: &Transform) -> f64 {
    tf.rotation.angle()
}

/// Convert a transform to its 6-vector form (translation + axis-angle).
pub fn transform_to_vector6(tf: &Transform) -> Vector6 {
    let t = tf.translation.vector;
    let r = tf.rotation.scaled_axis();
    Vector6::new(t.x, t.y, t.z, r.x, r.y, r.z)
}

/// Build a transform from its 6-vector form (translation + axis-angle).
pub fn transform_from_vector6(v: &Vector6) -> Transform {
    let translation = Translation3::new(v[0], v[1], v[2]);
    let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(v[3], v[4], v[5]));
    Transform::from_parts(translation, rotation)
}
