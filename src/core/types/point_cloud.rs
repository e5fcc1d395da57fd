//! Point cloud container for 3D range sensors.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::transform::Transform;

/// A 3D point cloud in meters.
///
/// Points are stored in the sensor frame of the measurement that produced
/// them; map-frame views are created with [`PointCloud3D::transformed`].
/// Auxiliary channels (intensity, rings) are intentionally not part of the
/// core container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud3D {
    /// XYZ points in meters.
    pub points: Vec<Point3<f64>>,
}

impl PointCloud3D {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cloud from existing points.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a single point.
    #[inline]
    pub fn push(&mut self, point: Point3<f64>) {
        self.points.push(point);
    }

    /// Append all points of another cloud.
    pub fn extend_from(&mut self, other: &PointCloud3D) {
        self.points.extend_from_slice(&other.points);
    }

    /// Return a copy of this cloud with every point transformed.
    pub fn transformed(&self, tf: &Transform) -> PointCloud3D {
        PointCloud3D {
            points: self.points.iter().map(|p| tf * p).collect(),
        }
    }

    /// Centroid of the cloud, or the origin for an empty cloud.
    pub fn centroid(&self) -> Point3<f64> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.points.len() as f64)
    }
}
