//! RANSAC plane estimation.
//!
//! Used to locate the ground surface in an assembled map so a synthetic
//! floor disc can be added for downstream occupancy mapping.

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::types::PointCloud3D;

/// An infinite plane in Hessian normal form.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Unit normal of the plane.
    pub normal: Vector3<f64>,
    /// Signed distance of the origin: `normal · p + d = 0` for points on the plane.
    pub d: f64,
}

impl Plane {
    /// Orthogonal distance of a point to the plane.
    #[inline]
    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        (self.normal.dot(&p.coords) + self.d).abs()
    }

    /// Projection of a point onto the plane.
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        let signed = self.normal.dot(&p.coords) + self.d;
        Point3::from(p.coords - signed * self.normal)
    }

    /// Two unit vectors spanning the plane.
    pub fn basis(&self) -> (Vector3<f64>, Vector3<f64>) {
        let helper = if self.normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = self.normal.cross(&helper).normalize();
        let v = self.normal.cross(&u);
        (u, v)
    }
}

/// Configuration for RANSAC plane fitting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RansacPlaneConfig {
    /// Number of random minimal samples to draw.
    pub iterations: usize,

    /// Maximum orthogonal distance (meters) for a point to count as inlier.
    pub distance_threshold: f64,

    /// Seed for the sampling RNG, for reproducible fits.
    pub seed: u64,
}

impl Default for RansacPlaneConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            distance_threshold: 0.01,
            seed: 0x5eed,
        }
    }
}

/// Fit the dominant plane of a cloud with RANSAC.
///
/// Draws minimal 3-point samples, scores by inlier count within the
/// distance threshold and refines the winner with a least-squares fit over
/// its inliers. Returns `None` when the cloud has fewer than 3 points or
/// no sample produced a valid plane.
pub fn fit_plane_ransac(cloud: &PointCloud3D, config: &RansacPlaneConfig) -> Option<Plane> {
    let n = cloud.len();
    if n < 3 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_plane: Option<Plane> = None;
    let mut best_inliers = 0usize;

    for _ in 0..config.iterations {
        let a = cloud.points[rng.gen_range(0..n)];
        let b = cloud.points[rng.gen_range(0..n)];
        let c = cloud.points[rng.gen_range(0..n)];

        let normal = (b - a).cross(&(c - a));
        if normal.norm() < 1e-9 {
            continue;
        }
        let normal = normal.normalize();
        let plane = Plane {
            normal,
            d: -normal.dot(&a.coords),
        };

        let inliers = cloud
            .points
            .iter()
            .filter(|p| plane.distance(p) <= config.distance_threshold)
            .count();

        if inliers > best_inliers {
            best_inliers = inliers;
            best_plane = Some(plane);
        }
    }

    best_plane.map(|plane| refine_plane(cloud, &plane, config.distance_threshold))
}

/// Least-squares refinement over the inliers of a candidate plane.
fn refine_plane(cloud: &PointCloud3D, plane: &Plane, threshold: f64) -> Plane {
    let inliers: Vec<&Point3<f64>> = cloud
        .points
        .iter()
        .filter(|p| plane.distance(p) <= threshold)
        .collect();
    if inliers.len() < 3 {
        return *plane;
    }

    let centroid = inliers
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / inliers.len() as f64;

    let mut cov = nalgebra::Matrix3::<f64>::zeros();
    for p in &inliers {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }

    let eig = nalgebra::SymmetricEigen::new(cov);
    // Smallest eigenvalue's eigenvector is the plane normal.
    let mut min_idx = 0;
    for i in 1..3 {
        if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let mut normal = eig.eigenvectors.column(min_idx).into_owned();
    if normal.dot(&plane.normal) < 0.0 {
        normal = -normal;
    }
    let normal = normal.normalize();
    Plane {
        normal,
        d: -normal.dot(&centroid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_floor_with_noise() -> PointCloud3D {
        let mut cloud = PointCloud3D::new();
        for i in 0..20 {
            for j in 0..20 {
                cloud.push(Point3::new(i as f64 * 0.1, j as f64 * 0.1, 0.5));
            }
        }
        // A few points far off the plane.
        cloud.push(Point3::new(0.0, 0.0, 3.0));
        cloud.push(Point3::new(1.0, 1.0, 4.0));
        cloud
    }

    #[test]
    fn test_finds_horizontal_plane() {
        let cloud = flat_floor_with_noise();
        let plane = fit_plane_ransac(&cloud, &RansacPlaneConfig::default()).unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(plane.d.abs(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_lies_on_plane() {
        let cloud = flat_floor_with_noise();
        let plane = fit_plane_ransac(&cloud, &RansacPlaneConfig::default()).unwrap();
        let projected = plane.project(&Point3::new(0.3, 0.3, 2.0));
        assert_relative_eq!(plane.distance(&projected), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_points() {
        let cloud = PointCloud3D::from_points(vec![Point3::new(0.0, 0.0, 0.0)]);
        assert!(fit_plane_ransac(&cloud, &RansacPlaneConfig::default()).is_none());
    }
}
