//! Voxel-grid downsampling.
//!
//! Partitions space into cubic cells of the given leaf size and replaces
//! all points inside a cell with their centroid.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::core::types::PointCloud3D;

/// Reduce cloud density by voxel-grid resampling.
///
/// Cells are `leaf_size` meters on each side; every occupied cell
/// contributes one point, the centroid of its members. A non-positive
/// leaf size returns the input unchanged.
pub fn voxel_downsample(cloud: &PointCloud3D, leaf_size: f64) -> PointCloud3D {
    if leaf_size <= 0.0 || cloud.is_empty() {
        return cloud.clone();
    }

    let inv = 1.0 / leaf_size;
    let mut cells: HashMap<(i64, i64, i64), (Vector3<f64>, usize)> = HashMap::new();

    for p in &cloud.points {
        let key = (
            (p.x * inv).floor() as i64,
            (p.y * inv).floor() as i64,
            (p.z * inv).floor() as i64,
        );
        let entry = cells.entry(key).or_insert((Vector3::zeros(), 0));
        entry.0 += p.coords;
        entry.1 += 1;
    }

    let mut points: Vec<Point3<f64>> = cells
        .into_values()
        .map(|(sum, n)| Point3::from(sum / n as f64))
        .collect();

    // Stable output order regardless of hash iteration.
    points.sort_by(|a, b| {
        (a.x, a.y, a.z)
            .partial_cmp(&(b.x, b.y, b.z))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    PointCloud3D::from_points(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_merges_points_in_same_cell() {
        let cloud = PointCloud3D::from_points(vec![
            Point3::new(0.01, 0.01, 0.01),
            Point3::new(0.03, 0.03, 0.03),
            Point3::new(1.0, 1.0, 1.0),
        ]);
        let out = voxel_downsample(&cloud, 0.1);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out.points[0].x, 0.02, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_leaf_is_passthrough() {
        let cloud = PointCloud3D::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.001, 0.0, 0.0),
        ]);
        let out = voxel_downsample(&cloud, 0.0);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_distinct_cells_preserved() {
        let mut cloud = PointCloud3D::new();
        for i in 0..10 {
            cloud.push(Point3::new(i as f64, 0.0, 0.0));
        }
        let out = voxel_downsample(&cloud, 0.5);
        assert_eq!(out.len(), 10);
    }
}
