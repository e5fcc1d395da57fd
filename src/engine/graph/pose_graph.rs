//! Pose graph data structure for the SLAM frontend.
//!
//! Vertices are measurement poses, edges are 6-DoF spatial constraints.
//! Storage is an arena: the dense vertex ID assigned on insertion is also
//! the arena index, which keeps solver node IDs and storage aligned.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::core::types::{Covariance, IdType, Measurement, Transform};
use crate::error::{Result, SlamError};

use super::spatial_index::NeighborIndex;

/// A vertex in the pose graph, attached to exactly one measurement.
pub struct VertexObject {
    /// Dense ID assigned on insertion; doubles as the solver node ID.
    pub id: IdType,

    /// Annotation `"<robot>:<sensor>"`, shown in the dot dump.
    pub label: String,

    /// Current best estimate of the measurement pose in the map frame.
    pub corrected_pose: Transform,

    /// The measurement this vertex was created for. Shared: external
    /// consumers holding the handle keep it alive alongside the graph.
    pub measurement: Arc<dyn Measurement>,
}

impl VertexObject {
    /// UUID of the attached measurement.
    pub fn uuid(&self) -> Uuid {
        self.measurement.uuid()
    }
}

/// A directed spatial constraint between two vertices.
///
/// Composition convention: `source.corrected_pose * transform` is the
/// predicted `target.corrected_pose`; optimization minimizes the deviation.
pub struct EdgeObject {
    /// ID of the vertex the edge starts at.
    pub source: IdType,

    /// ID of the vertex the edge points to.
    pub target: IdType,

    /// Relative pose from source to target in the robot frame.
    pub transform: Transform,

    /// 6×6 covariance of the relative pose.
    pub covariance: Covariance,

    /// Name of the sensor that produced the constraint, or `"odometry"`.
    pub sensor: String,

    /// Free-form annotation, e.g. `"odometry"` or `"loop"`.
    pub label: String,
}

/// Directed graph of vertices and constraints with ID, UUID and spatial
/// indexes.
#[derive(Default)]
pub struct PoseGraph {
    vertices: Vec<VertexObject>,
    edges: Vec<EdgeObject>,

    /// Edge indices touching each vertex (either direction).
    adjacency: Vec<Vec<usize>>,

    /// Find vertices by their measurement UUID.
    uuid_index: HashMap<Uuid, IdType>,

    /// Most recently built neighbor index, if any.
    neighbor_index: Option<NeighborIndex>,
}

impl PoseGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Check if the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Add a vertex for a measurement with the given map-frame pose.
    ///
    /// Assigns the next dense ID and records the UUID mapping. Fails with
    /// [`SlamError::DuplicateUuid`] when a vertex for the measurement's
    /// UUID already exists.
    pub fn add_vertex(
        &mut self,
        measurement: Arc<dyn Measurement>,
        corrected_pose: Transform,
    ) -> Result<IdType> {
        let uuid = measurement.uuid();
        if self.uuid_index.contains_key(&uuid) {
            return Err(SlamError::DuplicateUuid(uuid));
        }

        let id = self.vertices.len() as IdType;
        let label = format!("{}:{}", measurement.robot_name(), measurement.sensor_name());
        self.vertices.push(VertexObject {
            id,
            label,
            corrected_pose,
            measurement,
        });
        self.adjacency.push(Vec::new());
        self.uuid_index.insert(uuid, id);

        log::info!("Created vertex {} ({})", id, self.vertices[id as usize].label);
        Ok(id)
    }

    /// Add a directed edge between two existing vertices.
    ///
    /// Multiple edges between the same pair are allowed. Fails with
    /// [`SlamError::UnknownVertex`] when either endpoint is missing.
    pub fn add_edge(
        &mut self,
        source: IdType,
        target: IdType,
        transform: Transform,
        covariance: Covariance,
        sensor: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<()> {
        if source as usize >= self.vertices.len() {
            return Err(SlamError::UnknownVertex(source));
        }
        if target as usize >= self.vertices.len() {
            return Err(SlamError::UnknownVertex(target));
        }

        let sensor = sensor.into();
        let label = label.into();
        log::info!(
            "Created '{}' edge from vertex {} to vertex {} (from {})",
            label,
            source,
            target,
            sensor
        );

        let edge_idx = self.edges.len();
        self.edges.push(EdgeObject {
            source,
            target,
            transform,
            covariance,
            sensor,
            label,
        });
        self.adjacency[source as usize].push(edge_idx);
        self.adjacency[target as usize].push(edge_idx);
        Ok(())
    }

    /// Look up a vertex by its dense ID.
    pub fn vertex(&self, id: IdType) -> Result<&VertexObject> {
        self.vertices
            .get(id as usize)
            .ok_or(SlamError::UnknownVertex(id))
    }

    /// Look up a vertex by its measurement UUID.
    pub fn vertex_by_uuid(&self, uuid: &Uuid) -> Option<&VertexObject> {
        self.uuid_index
            .get(uuid)
            .map(|&id| &self.vertices[id as usize])
    }

    /// Check whether a measurement UUID is already part of the graph.
    pub fn contains_uuid(&self, uuid: &Uuid) -> bool {
        self.uuid_index.contains_key(uuid)
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> &[VertexObject] {
        &self.vertices
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[EdgeObject] {
        &self.edges
    }

    /// Vertices whose measurement originates from the given sensor.
    pub fn vertices_from_sensor(&self, sensor: &str) -> Vec<&VertexObject> {
        self.vertices
            .iter()
            .filter(|v| v.measurement.sensor_name() == sensor)
            .collect()
    }

    /// Edges created by the given sensor (or `"odometry"`).
    pub fn edges_from_sensor(&self, sensor: &str) -> Vec<&EdgeObject> {
        self.edges.iter().filter(|e| e.sensor == sensor).collect()
    }

    /// Edges touching the given vertex, in either direction.
    pub fn edges_of(&self, id: IdType) -> Result<Vec<&EdgeObject>> {
        let adjacency = self
            .adjacency
            .get(id as usize)
            .ok_or(SlamError::UnknownVertex(id))?;
        Ok(adjacency.iter().map(|&i| &self.edges[i]).collect())
    }

    /// Build the spatial neighbor index over one sensor's vertices.
    ///
    /// Indexes the translations of the current corrected poses with a
    /// dense 0..N−1 renumbering. Must be rebuilt after insertions before
    /// the next [`PoseGraph::nearby`] sweep.
    pub fn rebuild_neighbor_index(&mut self, sensor: &str) {
        let entries: Vec<_> = self
            .vertices
            .iter()
            .filter(|v| v.measurement.sensor_name() == sensor)
            .map(|v| (v.id, nalgebra::Point3::from(v.corrected_pose.translation.vector)))
            .collect();
        log::debug!(
            "Built neighbor index for sensor '{}' with {} vertices",
            sensor,
            entries.len()
        );
        self.neighbor_index = Some(NeighborIndex::build(sensor, &entries, self.vertices.len()));
    }

    /// Vertices spatially near a pose, closest first.
    ///
    /// Answers from the most recently built index. Fails with
    /// [`SlamError::IndexStale`] when no index has been built yet; when
    /// vertices were added since the last build the stale snapshot is
    /// still used, with a diagnostic.
    pub fn nearby(&self, pose: &Transform, radius: f64) -> Result<Vec<IdType>> {
        let index = self.neighbor_index.as_ref().ok_or(SlamError::IndexStale)?;
        if index.vertex_count_at_build() != self.vertices.len() {
            log::debug!(
                "Neighbor index is stale: built at {} vertices, graph has {}",
                index.vertex_count_at_build(),
                self.vertices.len()
            );
        }
        Ok(index.nearby(pose, radius))
    }

    /// Number of entries in the current neighbor index, if one was built.
    pub fn neighbor_index_len(&self) -> Option<usize> {
        self.neighbor_index.as_ref().map(|i| i.len())
    }

    /// Bulk-update corrected poses from a solver result.
    ///
    /// Unknown IDs are skipped with a warning.
    pub fn apply_solver_result(&mut self, corrections: &[(IdType, Transform)]) {
        for (id, pose) in corrections {
            match self.vertices.get_mut(*id as usize) {
                Some(v) => v.corrected_pose = *pose,
                None => log::warn!("Solver returned correction for unknown vertex {}", id),
            }
        }
    }

    /// Update a single vertex pose.
    pub fn set_corrected_pose(&mut self, id: IdType, pose: Transform) -> Result<()> {
        let v = self
            .vertices
            .get_mut(id as usize)
            .ok_or(SlamError::UnknownVertex(id))?;
        v.corrected_pose = pose;
        Ok(())
    }

    /// Serialize the graph topology as Graphviz dot.
    pub fn write_dot(&self, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "digraph pose_graph {{")?;
        for v in &self.vertices {
            writeln!(writer, "\t{} [label=\"{} ({})\"];", v.id, v.id, v.label)?;
        }
        for e in &self.edges {
            writeln!(
                writer,
                "\t{} -> {} [label=\"{}\"];",
                e.source, e.target, e.label
            )?;
        }
        writeln!(writer, "}}")?;
        Ok(())
    }

    /// Write the dot dump to a file. For larger graphs, this can take a
    /// while.
    pub fn write_dot_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write_dot(&mut file)
    }
}
