//! Pose graph storage and spatial vertex lookup.
//!
//! The graph holds one [`VertexObject`] per admitted measurement and one
//! [`EdgeObject`] per 6-DoF constraint. Vertices are stored in an arena
//! with dense integer IDs that double as solver node IDs; a UUID side
//! index supports cross-robot and replay lookups, and a kd-tree over
//! corrected poses answers radius queries for loop-closure sweeps.

mod pose_graph;
mod spatial_index;

pub use pose_graph::{EdgeObject, PoseGraph, VertexObject};
pub use spatial_index::NeighborIndex;
