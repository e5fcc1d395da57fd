//! Sensor modules: constraint creation and neighbor linking.

mod point_cloud;

pub use point_cloud::{PointCloudSensor, PointCloudSensorConfig};

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::types::{Covariance, IdType, Measurement, Transform};
use crate::engine::graph::PoseGraph;
use crate::error::Result;

/// A 6-DoF spatial constraint produced by a sensor module.
#[derive(Debug, Clone)]
pub struct SE3Constraint {
    /// Name of the sensor that produced the constraint.
    pub sensor: String,

    /// Relative pose from the source to the target measurement, in the
    /// robot frame.
    pub transform: Transform,

    /// 6×6 covariance of the relative pose.
    pub covariance: Covariance,
}

/// A sensor module registered with the mapper.
///
/// Each module owns the matching machinery for its own measurement type
/// and can synthesize constraints between two of its measurements.
/// Matching is done only between measurements of the same sensor.
pub trait Sensor {
    /// Unique name; measurements reference their sensor by this name.
    fn name(&self) -> &str;

    /// Downcast support, so module-specific operations (e.g. map
    /// assembly) stay reachable after registration.
    fn as_any(&self) -> &dyn Any;

    /// Estimate the constraint between two measurements of this sensor.
    ///
    /// `odometry_guess` is the relative robot pose from source to target
    /// as currently believed by the graph. `is_loop` requests an
    /// additional coarse refinement pass before the final alignment.
    ///
    /// Fails with [`crate::SlamError::BadMeasurementType`] when a
    /// measurement is not of this sensor's type, or
    /// [`crate::SlamError::NoMatch`] when matching diverged.
    fn create_constraint(
        &self,
        source: &Arc<dyn Measurement>,
        target: &Arc<dyn Measurement>,
        odometry_guess: &Transform,
        is_loop: bool,
    ) -> Result<SE3Constraint>;

    /// Link a vertex against its spatial neighbors, best effort.
    ///
    /// Rebuilds the neighbor index for this sensor, searches around the
    /// vertex's corrected pose and creates constraint edges to up to
    /// `max_links` of the closest unlinked same-sensor vertices. Matching
    /// failures are logged and skipped; the number of created edges is
    /// returned.
    fn link_to_neighbors(
        &self,
        vertex: IdType,
        graph: &mut PoseGraph,
        radius: f64,
        max_links: usize,
    ) -> usize {
        graph.rebuild_neighbor_index(self.name());

        let (vertex_pose, vertex_measurement) = match graph.vertex(vertex) {
            Ok(v) => (v.corrected_pose, v.measurement.clone()),
            Err(e) => {
                log::error!("Cannot link vertex {}: {}", vertex, e);
                return 0;
            }
        };

        // Vertices already connected to this one by our own edges.
        let mut linked: HashSet<IdType> = HashSet::new();
        linked.insert(vertex);
        if let Ok(edges) = graph.edges_of(vertex) {
            for edge in edges {
                if edge.sensor == self.name() {
                    linked.insert(edge.source);
                    linked.insert(edge.target);
                }
            }
        }

        let neighbors = match graph.nearby(&vertex_pose, radius) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Neighbor search failed: {}", e);
                return 0;
            }
        };
        log::debug!("Neighbor search found {} vertices nearby", neighbors.len());

        let mut added = 0;
        for candidate in neighbors {
            if added >= max_links {
                break;
            }
            if linked.contains(&candidate) {
                continue;
            }

            let (candidate_pose, candidate_measurement) = match graph.vertex(candidate) {
                Ok(v) => (v.corrected_pose, v.measurement.clone()),
                Err(_) => continue,
            };

            let guess = candidate_pose.inverse() * vertex_pose;
            match self.create_constraint(
                &candidate_measurement,
                &vertex_measurement,
                &guess,
                true,
            ) {
                Ok(constraint) => {
                    if let Err(e) = graph.add_edge(
                        candidate,
                        vertex,
                        constraint.transform,
                        constraint.covariance,
                        constraint.sensor,
                        "loop",
                    ) {
                        log::error!("Failed to add constraint edge: {}", e);
                        continue;
                    }
                    added += 1;
                }
                Err(e) => {
                    log::debug!(
                        "Matching vertex {} against {} failed: {}",
                        vertex,
                        candidate,
                        e
                    );
                }
            }
        }
        added
    }
}
