//! AkashaSLAM - Graph-based SLAM frontend for 3D point clouds
//!
//! A frontend for graph-based Simultaneous Localization and Mapping in
//! three-dimensional space. It maintains a pose graph whose vertices are
//! measurement poses and whose edges are 6-DoF spatial constraints, and
//! delegates global optimization to a pluggable backend implementing the
//! [`Solver`] interface.
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │      (pose graph, sensor modules, mapper, solver)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │                 (GICP, NDT matching)                │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor processing
//! │          (odometry, point cloud filters)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Getting started
//!
//! Create the mapper and register the required modules:
//!
//! ```ignore
//! use akasha_slam::{Mapper, PointCloudSensor, PointCloudSensorConfig};
//!
//! let mut mapper = Mapper::new();
//! mapper.register_sensor(Box::new(PointCloudSensor::new(
//!     "velodyne",
//!     PointCloudSensorConfig::default(),
//! )))?;
//! mapper.set_solver(Box::new(my_backend));
//!
//! // Within the sensor callback, hand new measurements to the mapper:
//! let m = PointCloudMeasurement::new(cloud, "robot", "velodyne", mount, stamp);
//! if mapper.add_reading(m.into_arc()) {
//!     // a vertex was created, possibly with new constraints
//! }
//! ```
//!
//! Measurements below the minimum pose distance are not admitted; see
//! [`Mapper::set_min_pose_distance`]. Loop closures are created by the
//! sensor modules while linking new vertices to spatial neighbors, and
//! [`Mapper::optimize`] runs the backend and applies the corrected poses.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Algorithms (depends on core)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Engine (depends on all layers)
// ============================================================================
pub mod engine;

mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use error::{Result, SlamError};

// Core types
pub use core::types::{
    rotation_angle, transform_from_vector6, transform_to_vector6, translation_norm, Covariance,
    IdType, Measurement, PointCloud3D, PointCloudMeasurement, Timestamp, Transform,
    TransformWithCovariance, Vector6,
};

// Sensors
pub use sensors::odometry::Odometry;
pub use sensors::preprocessing::{
    fit_plane_ransac, remove_outliers, voxel_downsample, Plane, RansacPlaneConfig,
};

// Algorithms - Matching
pub use algorithms::matching::{
    AlignmentResult, Gicp, Ndt, Registration, RegistrationAlgorithm, RegistrationParameters,
};

// Engine
pub use engine::graph::{EdgeObject, NeighborIndex, PoseGraph, VertexObject};
pub use engine::mapper::Mapper;
pub use engine::sensor::{PointCloudSensor, PointCloudSensorConfig, SE3Constraint, Sensor};
pub use engine::solver::Solver;
