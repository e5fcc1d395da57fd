//! Point cloud registration for constraint synthesis.
//!
//! # Algorithms
//!
//! - [`Gicp`]: Generalized ICP using locally estimated surface covariances
//! - [`Ndt`]: Normal Distributions Transform over a voxelized Gaussian grid
//!
//! Both implement the [`Registration`] capability with a uniform
//! `align(moving, fixed, guess, params)` contract, so additional matchers
//! can be added without modifying the constraint pipeline.

pub(crate) mod common;
mod gicp;
mod ndt;

pub use gicp::Gicp;
pub use ndt::Ndt;

use serde::{Deserialize, Serialize};

use crate::core::types::{PointCloud3D, Transform};

/// Selects the matcher used to align two clouds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationAlgorithm {
    /// Generalized Iterative Closest Point.
    Gicp,
    /// Normal Distributions Transform.
    Ndt,
}

/// Parameters for the scan-matching pipeline.
///
/// One instance configures a single alignment pass; sensors hold a
/// `coarse` and a `fine` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationParameters {
    /// Which matcher to dispatch to.
    pub algorithm: RegistrationAlgorithm,

    /// Voxel leaf size in meters used to downsample both clouds before
    /// matching; 0 disables downsampling.
    pub point_cloud_density: f64,

    /// Correspondences farther apart than this are ignored (meters).
    pub max_correspondence_distance: f64,

    /// Alignments with a mean squared correspondence error above this
    /// value are rejected.
    pub max_fitness_score: f64,

    /// Maximum outer iterations (correspondence updates).
    pub maximum_iterations: u32,

    /// Maximum inner optimizer steps per correspondence set.
    pub maximum_optimizer_iterations: u32,

    /// Translation convergence threshold in meters.
    pub transformation_epsilon: f64,

    /// Convergence threshold on the change of the mean squared error.
    pub euclidean_fitness_epsilon: f64,

    /// Rotation convergence threshold in radians.
    pub rotation_epsilon: f64,

    /// Number of neighbors used to estimate local surface covariances (GICP).
    pub correspondence_randomness: usize,

    /// Expected fraction of points without a matching distribution (NDT).
    pub outlier_ratio: f64,

    /// Maximum update step length per iteration (NDT).
    pub step_size: f64,

    /// Edge length of the Gaussian voxel grid in meters (NDT).
    pub resolution: f64,
}

impl Default for RegistrationParameters {
    fn default() -> Self {
        Self {
            algorithm: RegistrationAlgorithm::Gicp,
            point_cloud_density: 0.2,
            max_correspondence_distance: 2.5,
            max_fitness_score: 2.0,
            maximum_iterations: 50,
            maximum_optimizer_iterations: 20,
            transformation_epsilon: 1e-5,
            euclidean_fitness_epsilon: 1.0,
            rotation_epsilon: 2e-3,
            correspondence_randomness: 20,
            outlier_ratio: 0.55,
            step_size: 0.1,
            resolution: 1.0,
        }
    }
}

/// Result of an alignment pass.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Estimated transform mapping the moving cloud into the fixed frame.
    pub transform: Transform,

    /// Mean squared Euclidean error of the final correspondences.
    ///
    /// `f64::MAX` when no correspondences were found.
    pub fitness_score: f64,

    /// Whether the algorithm reached a stable estimate.
    pub converged: bool,

    /// Number of outer iterations performed.
    pub iterations: u32,
}

impl AlignmentResult {
    /// A failed alignment with identity transform.
    pub fn failed() -> Self {
        Self {
            transform: Transform::identity(),
            fitness_score: f64::MAX,
            converged: false,
            iterations: 0,
        }
    }
}

/// A point cloud registration algorithm.
pub trait Registration {
    /// Estimate the rigid transform that maps `moving` into the frame of
    /// `fixed`, starting from `guess`.
    ///
    /// Implementations that cannot seed their optimization with an initial
    /// estimate pre-shift the moving cloud by `guess` and compose the
    /// incremental result with it; either way the returned transform is
    /// the total estimate including the guess.
    fn align(
        &self,
        moving: &PointCloud3D,
        fixed: &PointCloud3D,
        guess: &Transform,
        params: &RegistrationParameters,
    ) -> AlignmentResult;
}

/// Look up the matcher instance for an algorithm selection.
pub fn registration_for(algorithm: RegistrationAlgorithm) -> &'static dyn Registration {
    match algorithm {
        RegistrationAlgorithm::Gicp => &Gicp,
        RegistrationAlgorithm::Ndt => &Ndt,
    }
}
