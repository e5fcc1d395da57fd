//! The SLAM frontend loop.
//!
//! The mapper admits measurements into the pose graph, creates odometry
//! and scan-matching constraints, and hands the graph topology to a
//! pluggable solver for global optimization. It is extended by
//! registering [`Sensor`] modules, an [`Odometry`] source and a
//! [`Solver`] backend.
//!
//! The public surface is single-threaded: callers serialize access,
//! typically from the robot's sensor callback thread.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::math::orthonormalize;
use crate::core::types::{rotation_angle, translation_norm, IdType, Measurement, Transform};
use crate::engine::graph::{PoseGraph, VertexObject};
use crate::engine::sensor::Sensor;
use crate::engine::solver::Solver;
use crate::error::{Result, SlamError};
use crate::sensors::odometry::Odometry;

/// Graph-SLAM frontend holding measurements from different sensors.
pub struct Mapper {
    graph: PoseGraph,
    solver: Option<Box<dyn Solver>>,
    odometry: Option<Box<dyn Odometry>>,
    sensors: HashMap<String, Box<dyn Sensor>>,

    current_pose: Transform,
    last_odometric_pose: Transform,
    first_vertex: Option<IdType>,
    last_vertex: Option<IdType>,

    add_odometry_edges: bool,
    neighbor_radius: f64,
    max_neighbor_links: usize,
    min_translation: f64,
    min_rotation: f64,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    /// Create a mapper with no registered modules.
    pub fn new() -> Self {
        Self {
            graph: PoseGraph::new(),
            solver: None,
            odometry: None,
            sensors: HashMap::new(),
            current_pose: Transform::identity(),
            last_odometric_pose: Transform::identity(),
            first_vertex: None,
            last_vertex: None,
            add_odometry_edges: false,
            neighbor_radius: 5.0,
            max_neighbor_links: 5,
            min_translation: 0.5,
            min_rotation: 0.1,
        }
    }

    /// Set the solver used as SLAM backend.
    ///
    /// The mapper can be used without a backend, but mapping results
    /// might be inconsistent.
    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        self.solver = Some(solver);
    }

    /// Set an odometry module to provide relative poses.
    ///
    /// `add_edges` controls whether odometry constraints are added to the
    /// graph for consecutive readings.
    pub fn set_odometry(&mut self, odometry: Box<dyn Odometry>, add_edges: bool) {
        self.odometry = Some(odometry);
        self.add_odometry_edges = add_edges;
    }

    /// Register a sensor, so its measurements can be added to the graph.
    ///
    /// Fails with [`SlamError::DuplicateSensor`] when a sensor with the
    /// same name is already registered.
    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) -> Result<()> {
        let name = sensor.name().to_string();
        if self.sensors.contains_key(&name) {
            log::error!("Sensor with name '{}' already exists", name);
            return Err(SlamError::DuplicateSensor(name));
        }
        self.sensors.insert(name, sensor);
        Ok(())
    }

    /// Set the radius for neighbor matching and the link limit.
    ///
    /// New vertices are matched against vertices of the same sensor
    /// within the radius, but against no more than `max_links` of them.
    pub fn set_neighbor_radius(&mut self, radius: f64, max_links: usize) {
        log::info!(
            "Neighbor radius set to {} (max {} links)",
            radius,
            max_links
        );
        self.neighbor_radius = radius;
        self.max_neighbor_links = max_links;
    }

    /// Set the minimal change in pose between adjacent vertices.
    pub fn set_min_pose_distance(&mut self, translation: f64, rotation: f64) {
        log::info!(
            "Minimum pose distance set to {} m / {} rad",
            translation,
            rotation
        );
        self.min_translation = translation;
        self.min_rotation = rotation;
    }

    /// The pose graph built so far.
    pub fn graph(&self) -> &PoseGraph {
        &self.graph
    }

    /// Look up a registered sensor module by name.
    pub fn sensor(&self, name: &str) -> Result<&dyn Sensor> {
        self.sensors
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| SlamError::UnknownSensor(name.to_string()))
    }

    /// Mutable access to the pose graph, for map assembly passes that
    /// rebuild the neighbor index.
    pub fn graph_mut(&mut self) -> &mut PoseGraph {
        &mut self.graph
    }

    /// The vertex created by the first admitted measurement, fixed as the
    /// gauge during optimization.
    pub fn first_vertex(&self) -> Option<&VertexObject> {
        self.first_vertex.and_then(|id| self.graph.vertex(id).ok())
    }

    /// The most recently added local vertex.
    ///
    /// External readings from other robots do not count.
    pub fn last_vertex(&self) -> Option<&VertexObject> {
        self.last_vertex.and_then(|id| self.graph.vertex(id).ok())
    }

    /// Current robot pose in map coordinates.
    ///
    /// Updated on each admission and after successful optimization.
    pub fn current_pose(&self) -> Transform {
        self.current_pose
    }

    /// Add a new measurement to the graph.
    ///
    /// Admission is gated by the sensor registry and, when odometry is
    /// available, by the minimum pose distance since the last vertex.
    /// Readings with identical timestamps are admitted in arrival order.
    /// Returns true when a vertex was created.
    pub fn add_reading(&mut self, measurement: Arc<dyn Measurement>) -> bool {
        let sensor_name = measurement.sensor_name().to_string();
        if !self.sensors.contains_key(&sensor_name) {
            log::error!("Sensor '{}' has not been registered", sensor_name);
            return false;
        }
        if self.graph.contains_uuid(&measurement.uuid()) {
            log::debug!(
                "Measurement {} is already part of the graph",
                measurement.uuid()
            );
            return false;
        }

        // Query the odometric pose for this measurement.
        let odometry_pose = match &self.odometry {
            Some(odometry) => match odometry.pose_at(measurement.timestamp_us()) {
                Ok(twc) => Some(twc),
                Err(e) => {
                    log::error!("Could not get odometry data: {}", e);
                    return false;
                }
            },
            None => None,
        };

        // The first measurement is admitted unconditionally.
        let Some(last_id) = self.last_vertex else {
            self.current_pose = odometry_pose
                .as_ref()
                .map(|twc| twc.transform)
                .unwrap_or_else(Transform::identity);
            let id = match self.insert_vertex(measurement, self.current_pose) {
                Ok(id) => id,
                Err(e) => {
                    log::error!("Failed to add first vertex: {}", e);
                    return false;
                }
            };
            self.last_vertex = Some(id);
            self.last_odometric_pose = self.current_pose;
            log::info!("Added first node to the graph");
            return true;
        };

        // Gate on the odometric pose delta and chain the corrected pose.
        let last_corrected = match self.graph.vertex(last_id) {
            Ok(v) => v.corrected_pose,
            Err(e) => {
                log::error!("Last vertex disappeared: {}", e);
                return false;
            }
        };
        let (delta, corrected) = match &odometry_pose {
            Some(twc) => {
                let delta = orthonormalize(&(self.last_odometric_pose.inverse() * twc.transform));
                if translation_norm(&delta) < self.min_translation
                    && rotation_angle(&delta) < self.min_rotation
                {
                    log::debug!("Measurement rejected, pose change below minimum");
                    return false;
                }
                (delta, orthonormalize(&(last_corrected * delta)))
            }
            None => (Transform::identity(), last_corrected),
        };

        let new_id = match self.insert_vertex(measurement, corrected) {
            Ok(id) => id,
            Err(e) => {
                log::error!("Failed to add vertex: {}", e);
                return false;
            }
        };

        if let Some(twc) = &odometry_pose {
            if self.add_odometry_edges {
                if let Err(e) = self.graph.add_edge(
                    last_id,
                    new_id,
                    delta,
                    twc.covariance,
                    "odometry",
                    "odometry",
                ) {
                    log::error!("Failed to add odometry edge: {}", e);
                }
            }
        }

        // Create constraints to other measurements nearby.
        if let Some(sensor) = self.sensors.get(&sensor_name) {
            sensor.link_to_neighbors(
                new_id,
                &mut self.graph,
                self.neighbor_radius,
                self.max_neighbor_links,
            );
        }

        self.last_vertex = Some(new_id);
        if let Some(twc) = odometry_pose {
            self.last_odometric_pose = twc.transform;
        }
        self.current_pose = corrected;
        true
    }

    /// Add a measurement from another robot with a known map pose.
    ///
    /// The vertex is created at `pose`; no odometry edge is added and the
    /// last local vertex is left untouched. Neighbor linking is attempted
    /// when the measurement's sensor is registered. Inserting a UUID that
    /// already exists is a no-op returning the existing vertex.
    pub fn add_external_reading(
        &mut self,
        measurement: Arc<dyn Measurement>,
        pose: Transform,
    ) -> Result<IdType> {
        if let Some(existing) = self.graph.vertex_by_uuid(&measurement.uuid()) {
            log::debug!(
                "External measurement {} already known as vertex {}",
                measurement.uuid(),
                existing.id
            );
            return Ok(existing.id);
        }

        let sensor_name = measurement.sensor_name().to_string();
        log::debug!(
            "Adding external reading from {}:{}",
            measurement.robot_name(),
            sensor_name
        );
        let id = self.insert_vertex(measurement, pose)?;

        if let Some(sensor) = self.sensors.get(&sensor_name) {
            sensor.link_to_neighbors(
                id,
                &mut self.graph,
                self.neighbor_radius,
                self.max_neighbor_links,
            );
        }
        Ok(id)
    }

    /// Start the backend optimization process.
    ///
    /// Pushes the graph topology into the solver, runs it and applies the
    /// corrected poses on success. Returns false when no solver is set or
    /// the backend failed; the graph is then left untouched.
    pub fn optimize(&mut self) -> bool {
        let Some(solver) = self.solver.as_mut() else {
            log::error!("A solver must be set before optimize() is called");
            return false;
        };

        solver.clear();
        for vertex in self.graph.vertices() {
            solver.add_node(vertex.id, vertex.corrected_pose);
        }
        if let Some(first) = self.first_vertex {
            solver.set_fixed(first);
        }
        for edge in self.graph.edges() {
            let information = match edge.covariance.try_inverse() {
                Some(inv) => inv,
                None => {
                    log::warn!(
                        "Edge {} -> {} has singular covariance, using identity information",
                        edge.source,
                        edge.target
                    );
                    crate::core::types::Covariance::identity()
                }
            };
            solver.add_constraint(edge.source, edge.target, &edge.transform, &information);
        }

        if !solver.compute() {
            log::warn!("Solver failed, poses left untouched");
            return false;
        }

        let corrections = solver.corrected_poses();
        self.graph.apply_solver_result(&corrections);

        if let Some(last) = self.last_vertex {
            if let Ok(v) = self.graph.vertex(last) {
                self.current_pose = v.corrected_pose;
            }
        }
        true
    }

    /// Write the current graph to a Graphviz dot file.
    pub fn write_graph_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.graph.write_dot_file(path)
    }

    /// Insert a vertex and track the gauge vertex.
    fn insert_vertex(
        &mut self,
        measurement: Arc<dyn Measurement>,
        corrected: Transform,
    ) -> Result<IdType> {
        let id = self.graph.add_vertex(measurement, corrected)?;
        if self.first_vertex.is_none() {
            self.first_vertex = Some(id);
        }
        Ok(id)
    }
}
