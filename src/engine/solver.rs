//! Boundary to the graph optimization backend.

use crate::core::types::{Covariance, IdType, Transform};

/// Abstract interface to a graph optimization backend.
///
/// The mapper feeds the backend an additive view of the graph topology
/// (nodes with initial poses, constraints with information matrices) and
/// reads back corrected poses after [`Solver::compute`]. The mapper can be
/// used without a backend, but mapping results might be inconsistent.
pub trait Solver {
    /// Add a node with its initial pose estimate.
    fn add_node(&mut self, id: IdType, pose: Transform);

    /// Add a constraint between two previously added nodes.
    ///
    /// `information` is the inverse of the edge covariance.
    fn add_constraint(
        &mut self,
        source: IdType,
        target: IdType,
        transform: &Transform,
        information: &Covariance,
    );

    /// Fix a node so it is not moved during optimization.
    ///
    /// At least one node must be fixed to pin down the map gauge; the
    /// mapper fixes the first vertex.
    fn set_fixed(&mut self, id: IdType);

    /// Run the optimization. Returns false on failure; the frontend then
    /// leaves all poses untouched.
    fn compute(&mut self) -> bool;

    /// Corrected poses keyed by node ID, valid after a successful
    /// [`Solver::compute`].
    fn corrected_poses(&self) -> Vec<(IdType, Transform)>;

    /// Remove all nodes and constraints.
    fn clear(&mut self);
}
