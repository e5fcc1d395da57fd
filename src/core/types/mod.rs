//! Core types for 3D graph SLAM.

mod measurement;
mod point_cloud;
mod transform;

pub use measurement::{Measurement, PointCloudMeasurement};
pub use point_cloud::PointCloud3D;
pub use transform::{
    rotation_angle, transform_from_vector6, transform_to_vector6, translation_norm, Covariance,
    Transform, TransformWithCovariance, Vector6,
};

/// Dense vertex identifier assigned on insertion.
pub type IdType = u32;

/// Timestamp in microseconds since an arbitrary epoch.
pub type Timestamp = u64;
