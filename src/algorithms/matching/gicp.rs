//! Generalized Iterative Closest Point.
//!
//! Plane-to-plane ICP: every point carries a regularized covariance of its
//! local neighborhood, and each correspondence is weighted by the inverse
//! of the combined covariance. The transform is refined with Gauss-Newton
//! steps on SE(3).
//!
//! # Algorithm
//!
//! ```text
//! Input: moving cloud M, fixed cloud F, initial guess T₀
//!
//! 1. Estimate surface covariances C(m) and C(f) from k neighbors
//! 2. For each outer iteration:
//!    a. For every m in M, find nearest f in F under current T
//!    b. Gauss-Newton: minimize Σ rᵀ (C(f) + R C(m) Rᵀ)⁻¹ r,  r = f - T·m
//!    c. If the incremental update is below the epsilons, stop
//! 3. Report mean squared correspondence error as fitness
//! ```

use std::ops::{AddAssign, SubAssign};

use nalgebra::{Matrix3, Matrix6, Vector6};

use super::common::{build_kdtree, fitness_score, nearest, surface_covariances};
use super::{AlignmentResult, Registration, RegistrationParameters};
use crate::core::math::skew;
use crate::core::types::{transform_from_vector6, PointCloud3D, Transform};

/// Minimum correspondences required to attempt a Gauss-Newton step.
const MIN_CORRESPONDENCES: usize = 10;

/// Levenberg damping added to the normal equations.
const DAMPING: f64 = 1e-6;

/// Generalized-ICP matcher.
///
/// Stateless; all tuning comes from the [`RegistrationParameters`] passed
/// to [`Registration::align`]. The optimization has no native seed, so the
/// guess is applied to the moving cloud up front and composed back into
/// the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gicp;

impl Registration for Gicp {
    fn align(
        &self,
        moving: &PointCloud3D,
        fixed: &PointCloud3D,
        guess: &Transform,
        params: &RegistrationParameters,
    ) -> AlignmentResult {
        // Pre-shift by the guess; `delta` below starts at identity and the
        // returned transform is delta * guess.
        let shifted = moving.transformed(guess);

        let fixed_tree = build_kdtree(fixed);
        let moving_tree = build_kdtree(&shifted);
        let k = params.correspondence_randomness;
        let fixed_covs = surface_covariances(fixed, &fixed_tree, k);
        let moving_covs = surface_covariances(&shifted, &moving_tree, k);

        let max_dist_sq =
            params.max_correspondence_distance * params.max_correspondence_distance;
        let mut delta = Transform::identity();
        let mut converged = false;
        let mut iterations = 0;
        let mut previous_mse: Option<f64> = None;

        for _ in 0..params.maximum_iterations {
            iterations += 1;

            // Correspondence search under the current estimate.
            let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(shifted.len());
            for (i, p) in shifted.points.iter().enumerate() {
                let q = delta * p;
                let (j, dist_sq) = nearest(&fixed_tree, &q);
                if dist_sq <= max_dist_sq {
                    pairs.push((i, j));
                }
            }
            if pairs.len() < MIN_CORRESPONDENCES {
                return AlignmentResult {
                    transform: delta * guess,
                    fitness_score: f64::MAX,
                    converged: false,
                    iterations,
                };
            }

            // Inner refinement on the fixed correspondence set.
            let mut step_translation = 0.0;
            let mut step_rotation = 0.0;
            for _ in 0..params.maximum_optimizer_iterations.max(1) {
                let Some(update) =
                    gauss_newton_step(&shifted, fixed, &pairs, &moving_covs, &fixed_covs, &delta)
                else {
                    return AlignmentResult {
                        transform: delta * guess,
                        fitness_score: f64::MAX,
                        converged: false,
                        iterations,
                    };
                };

                let step = transform_from_vector6(&update);
                delta = step * delta;
                step_translation = update.fixed_rows::<3>(0).norm();
                step_rotation = update.fixed_rows::<3>(3).norm();
                if step_translation < params.transformation_epsilon
                    && step_rotation < params.rotation_epsilon
                {
                    break;
                }
            }

            if step_translation < params.transformation_epsilon
                && step_rotation < params.rotation_epsilon
            {
                converged = true;
                break;
            }

            // Second criterion: the correspondence error stopped changing.
            let mse = pairs
                .iter()
                .map(|&(i, j)| {
                    let p = delta * shifted.points[i];
                    (fixed.points[j].coords - p.coords).norm_squared()
                })
                .sum::<f64>()
                / pairs.len() as f64;
            if let Some(previous) = previous_mse {
                if (previous - mse).abs() < params.euclidean_fitness_epsilon {
                    converged = true;
                    break;
                }
            }
            previous_mse = Some(mse);
        }

        let transform = delta * *guess;
        let fitness = fitness_score(
            moving,
            &fixed_tree,
            &transform,
            params.max_correspondence_distance,
        );

        AlignmentResult {
            transform,
            fitness_score: fitness,
            // Running out of iterations with a usable correspondence set
            // still counts; the fitness gate decides acceptance.
            converged: converged || iterations == params.maximum_iterations,
            iterations,
        }
    }
}

/// One Gauss-Newton update over the given correspondences.
///
/// Returns the 6-vector increment (translation, axis-angle) to be applied
/// on the left of the current estimate, or `None` when the normal
/// equations are singular.
fn gauss_newton_step(
    moving: &PointCloud3D,
    fixed: &PointCloud3D,
    pairs: &[(usize, usize)],
    moving_covs: &[Matrix3<f64>],
    fixed_covs: &[Matrix3<f64>],
    current: &Transform,
) -> Option<Vector6<f64>> {
    let rot = current.rotation.to_rotation_matrix();
    let rot_m = *rot.matrix();

    let mut h = Matrix6::<f64>::zeros();
    let mut b = Vector6::<f64>::zeros();

    for &(i, j) in pairs {
        let p = current * moving.points[i];
        let q = fixed.points[j];
        let residual = q.coords - p.coords;

        // Combined covariance of the pair, rotated into the fixed frame.
        let combined = fixed_covs[j] + rot_m * moving_covs[i] * rot_m.transpose();
        let weight = combined.try_inverse()?;

        // r(δ) ≈ r - δt + [p]× δθ for the left-perturbation T ← exp(δ)·T
        let a = skew(&p.coords);
        let wa = weight * a;

        h.fixed_view_mut::<3, 3>(0, 0).add_assign(&weight);
        h.fixed_view_mut::<3, 3>(0, 3).sub_assign(&wa);
        h.fixed_view_mut::<3, 3>(3, 0).sub_assign(&wa.transpose());
        h.fixed_view_mut::<3, 3>(3, 3)
            .add_assign(&(a.transpose() * wa));

        let wr = weight * residual;
        b.fixed_rows_mut::<3>(0).sub_assign(&wr);
        b.fixed_rows_mut::<3>(3).add_assign(&(a.transpose() * wr));
    }

    for i in 0..6 {
        h[(i, i)] += DAMPING;
    }

    let solution = h.lu().solve(&(-b))?;
    Some(solution)
}
