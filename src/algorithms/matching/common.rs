//! Shared helpers for the registration algorithms.

use kiddo::SquaredEuclidean;
use nalgebra::{Matrix3, Point3, Vector3};

use crate::core::types::PointCloud3D;

/// Kd-tree type with a bucket size large enough to hold point clouds where
/// many points share the same coordinate on one axis (e.g. flat ground
/// planes), which would otherwise overflow kiddo's default bucket size.
pub type KdTree<A, const K: usize> = kiddo::float::kdtree::KdTree<A, u64, K, 4096, u32>;

/// Eigenvalue assigned to the surface normal direction when regularizing
/// local covariances. The two in-plane directions are set to 1.
const NORMAL_EIGENVALUE: f64 = 1e-3;

/// Build a k-d tree over a point cloud.
///
/// Item payload is the point's index into `cloud.points`.
pub fn build_kdtree(cloud: &PointCloud3D) -> KdTree<f64, 3> {
    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, p) in cloud.points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

/// Nearest neighbor of a query point, as (index, squared distance).
#[inline]
pub fn nearest(tree: &KdTree<f64, 3>, p: &Point3<f64>) -> (usize, f64) {
    let nn = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
    (nn.item as usize, nn.distance)
}

/// Estimate a regularized surface covariance for every point of a cloud.
///
/// Each point's covariance is computed over its `k` nearest neighbors and
/// its eigenvalues are replaced by (1, 1, ε) with ε on the smallest axis,
/// turning every neighborhood into a locally planar distribution as in
/// Generalized-ICP.
pub fn surface_covariances(
    cloud: &PointCloud3D,
    tree: &KdTree<f64, 3>,
    k: usize,
) -> Vec<Matrix3<f64>> {
    let k = k.max(4).min(cloud.len());
    let mut covariances = Vec::with_capacity(cloud.len());

    for p in &cloud.points {
        let neighbors = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y, p.z], k);

        let mut mean = Vector3::zeros();
        for nn in &neighbors {
            mean += cloud.points[nn.item as usize].coords;
        }
        mean /= neighbors.len() as f64;

        let mut cov = Matrix3::zeros();
        for nn in &neighbors {
            let d = cloud.points[nn.item as usize].coords - mean;
            cov += d * d.transpose();
        }
        cov /= neighbors.len() as f64;

        covariances.push(regularize(&cov));
    }
    covariances
}

/// Replace the eigenvalues of a covariance with the (1, 1, ε) profile.
fn regularize(cov: &Matrix3<f64>) -> Matrix3<f64> {
    let eig = nalgebra::SymmetricEigen::new(*cov);
    let mut min_idx = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
            min_idx = i;
        }
    }

    let mut out = Matrix3::zeros();
    for i in 0..3 {
        let lambda = if i == min_idx { NORMAL_EIGENVALUE } else { 1.0 };
        let u = eig.eigenvectors.column(i);
        out += lambda * u * u.transpose();
    }
    out
}

/// Mean squared distance between transformed moving points and their
/// nearest fixed neighbors, ignoring pairs beyond the distance cutoff.
pub fn fitness_score(
    moving: &PointCloud3D,
    fixed_tree: &KdTree<f64, 3>,
    transform: &crate::core::types::Transform,
    max_distance: f64,
) -> f64 {
    let max_sq = max_distance * max_distance;
    let mut sum = 0.0;
    let mut count = 0usize;
    for p in &moving.points {
        let q = transform * p;
        let (_, dist_sq) = nearest(fixed_tree, &q);
        if dist_sq <= max_sq {
            sum += dist_sq;
            count += 1;
        }
    }
    if count == 0 {
        f64::MAX
    } else {
        sum / count as f64
    }
}
