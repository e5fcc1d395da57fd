//! Radius-based outlier removal.

use kiddo::SquaredEuclidean;

use crate::algorithms::matching::common::KdTree;
use crate::core::types::PointCloud3D;

/// Remove isolated points from a cloud.
///
/// A point is kept if at least `min_neighbors` other points lie within
/// `radius` meters of it. Effective against stray returns from dust and
/// multi-path reflections before map assembly.
pub fn remove_outliers(cloud: &PointCloud3D, radius: f64, min_neighbors: usize) -> PointCloud3D {
    if cloud.is_empty() || radius <= 0.0 || min_neighbors == 0 {
        return cloud.clone();
    }

    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, p) in cloud.points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }

    let radius_sq = radius * radius;
    let mut out = PointCloud3D::new();
    for p in &cloud.points {
        let found = tree.within_unsorted::<SquaredEuclidean>(&[p.x, p.y, p.z], radius_sq);
        // The query point itself is in the tree.
        if found.len() > min_neighbors {
            out.push(*p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn dense_cluster_with_stray() -> PointCloud3D {
        let mut cloud = PointCloud3D::new();
        for i in 0..5 {
            for j in 0..5 {
                cloud.push(Point3::new(i as f64 * 0.05, j as f64 * 0.05, 0.0));
            }
        }
        cloud.push(Point3::new(10.0, 10.0, 10.0));
        cloud
    }

    #[test]
    fn test_removes_isolated_point() {
        let cloud = dense_cluster_with_stray();
        let out = remove_outliers(&cloud, 0.2, 2);
        assert_eq!(out.len(), 25);
        assert!(out.points.iter().all(|p| p.x < 5.0));
    }

    #[test]
    fn test_zero_radius_is_passthrough() {
        let cloud = dense_cluster_with_stray();
        let out = remove_outliers(&cloud, 0.0, 2);
        assert_eq!(out.len(), cloud.len());
    }
}
