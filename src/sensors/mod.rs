//! Sensor-side processing: odometry sources and point cloud filters.

pub mod odometry;
pub mod preprocessing;

pub use odometry::Odometry;
