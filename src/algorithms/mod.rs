//! Core algorithms: point cloud registration.

pub mod matching;
