//! Normal Distributions Transform.
//!
//! The fixed cloud is voxelized into per-cell Gaussians; alignment then
//! moves the other cloud so its points fall onto high-likelihood regions
//! of those distributions. Unlike ICP there is no explicit correspondence
//! search, which makes the method tolerant of moderate initial error, and
//! the initial guess seeds the optimization directly.
//!
//! The exponential weighting follows the mixture model of Biber & Straßer:
//! `outlier_ratio` flattens the per-cell Gaussian so stray points cannot
//! dominate the objective.

use std::collections::HashMap;
use std::ops::{AddAssign, SubAssign};

use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

use super::common::{build_kdtree, fitness_score};
use super::{AlignmentResult, Registration, RegistrationParameters};
use crate::core::math::skew;
use crate::core::types::{transform_from_vector6, PointCloud3D, Transform};

/// Minimum points per voxel for a stable covariance estimate.
const MIN_POINTS_PER_VOXEL: usize = 6;

/// Minimum moving points that must fall into occupied voxels.
const MIN_MATCHED_POINTS: usize = 10;

/// Eigenvalue floor relative to the largest eigenvalue, keeping planar
/// voxel distributions invertible.
const EIGENVALUE_FLOOR_RATIO: f64 = 0.01;

/// Levenberg damping added to the normal equations.
const DAMPING: f64 = 1e-6;

/// NDT matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ndt;

/// Gaussian statistics of one voxel of the fixed cloud.
struct NdtVoxel {
    mean: Vector3<f64>,
    inv_cov: Matrix3<f64>,
}

impl Registration for Ndt {
    fn align(
        &self,
        moving: &PointCloud3D,
        fixed: &PointCloud3D,
        guess: &Transform,
        params: &RegistrationParameters,
    ) -> AlignmentResult {
        let resolution = params.resolution;
        let grid = build_grid(fixed, resolution);
        if grid.is_empty() {
            return AlignmentResult::failed();
        }

        let gauss_d2 = mixture_exponent(params.outlier_ratio, resolution);

        let mut current = *guess;
        let mut converged = false;
        let mut iterations = 0;

        for _ in 0..params.maximum_iterations {
            iterations += 1;

            let mut h = Matrix6::<f64>::zeros();
            let mut b = Vector6::<f64>::zeros();
            let mut matched = 0usize;

            for p in &moving.points {
                let x = current * p;
                let key = voxel_key(&x.coords, resolution);
                let Some(voxel) = grid.get(&key) else {
                    continue;
                };
                matched += 1;

                let residual = x.coords - voxel.mean;
                let mahal = (residual.transpose() * voxel.inv_cov * residual)[0];
                let robust = (-0.5 * gauss_d2 * mahal).exp();
                if !robust.is_finite() || robust < 1e-12 {
                    continue;
                }
                let weight = voxel.inv_cov * robust;

                // r(δ) ≈ r + δt - [x]× δθ for the left-perturbation T ← exp(δ)·T
                let a = skew(&x.coords);
                let wa = weight * a;

                h.fixed_view_mut::<3, 3>(0, 0).add_assign(&weight);
                h.fixed_view_mut::<3, 3>(0, 3).sub_assign(&wa);
                h.fixed_view_mut::<3, 3>(3, 0).sub_assign(&wa.transpose());
                h.fixed_view_mut::<3, 3>(3, 3)
                    .add_assign(&(a.transpose() * wa));

                let wr = weight * residual;
                b.fixed_rows_mut::<3>(0).add_assign(&wr);
                b.fixed_rows_mut::<3>(3).sub_assign(&(a.transpose() * wr));
            }

            if matched < MIN_MATCHED_POINTS {
                return AlignmentResult {
                    transform: current,
                    fitness_score: f64::MAX,
                    converged: false,
                    iterations,
                };
            }

            for i in 0..6 {
                h[(i, i)] += DAMPING;
            }
            let Some(mut update) = h.lu().solve(&(-b)) else {
                return AlignmentResult {
                    transform: current,
                    fitness_score: f64::MAX,
                    converged: false,
                    iterations,
                };
            };

            // Limit the step length; NDT's objective is only locally valid.
            let norm = update.norm();
            if norm > params.step_size && norm > 0.0 {
                update *= params.step_size / norm;
            }

            current = transform_from_vector6(&update) * current;

            let step_translation = update.fixed_rows::<3>(0).norm();
            let step_rotation = update.fixed_rows::<3>(3).norm();
            if step_translation < params.transformation_epsilon
                && step_rotation < params.rotation_epsilon
            {
                converged = true;
                break;
            }
        }

        let fixed_tree = build_kdtree(fixed);
        let fitness = fitness_score(
            moving,
            &fixed_tree,
            &current,
            params.max_correspondence_distance,
        );

        AlignmentResult {
            transform: current,
            fitness_score: fitness,
            converged: converged || iterations == params.maximum_iterations,
            iterations,
        }
    }
}

/// Grid cell index of a point.
#[inline]
fn voxel_key(p: &Vector3<f64>, resolution: f64) -> (i64, i64, i64) {
    (
        (p.x / resolution).floor() as i64,
        (p.y / resolution).floor() as i64,
        (p.z / resolution).floor() as i64,
    )
}

/// Voxelize a cloud into Gaussian cells.
fn build_grid(cloud: &PointCloud3D, resolution: f64) -> HashMap<(i64, i64, i64), NdtVoxel> {
    let mut sums: HashMap<(i64, i64, i64), (Vector3<f64>, Matrix3<f64>, usize)> = HashMap::new();
    for p in &cloud.points {
        let entry = sums
            .entry(voxel_key(&p.coords, resolution))
            .or_insert((Vector3::zeros(), Matrix3::zeros(), 0));
        entry.0 += p.coords;
        entry.1 += p.coords * p.coords.transpose();
        entry.2 += 1;
    }

    let mut grid = HashMap::new();
    for (key, (sum, outer, n)) in sums {
        if n < MIN_POINTS_PER_VOXEL {
            continue;
        }
        let nf = n as f64;
        let mean = sum / nf;
        let cov = (outer - nf * mean * mean.transpose()) / (nf - 1.0);
        if let Some(inv_cov) = floored_inverse(&cov) {
            grid.insert(key, NdtVoxel { mean, inv_cov });
        }
    }
    grid
}

/// Invert a voxel covariance after flooring small eigenvalues.
fn floored_inverse(cov: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let eig = nalgebra::SymmetricEigen::new(*cov);
    let max_lambda = eig.eigenvalues.max();
    if !(max_lambda > 0.0) {
        return None;
    }
    let floor = EIGENVALUE_FLOOR_RATIO * max_lambda;

    let mut inv = Matrix3::zeros();
    for i in 0..3 {
        let lambda = eig.eigenvalues[i].max(floor);
        let u = eig.eigenvectors.column(i);
        inv += (1.0 / lambda) * u * u.transpose();
    }
    Some(inv)
}

/// Exponent of the Gaussian-plus-uniform mixture weighting.
fn mixture_exponent(outlier_ratio: f64, resolution: f64) -> f64 {
    let c1 = 10.0 * (1.0 - outlier_ratio);
    let c2 = outlier_ratio / (resolution * resolution * resolution);
    let d3 = -(c2.ln());
    let d1 = -((c1 + c2).ln()) - d3;
    let d2 = -2.0 * (((-((c1 * (-0.5f64).exp() + c2).ln()) - d3) / d1).ln());
    if d2.is_finite() && d2 > 0.0 {
        d2
    } else {
        1.0
    }
}
