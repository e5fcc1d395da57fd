//! Nearest-neighbor index over vertex positions.

use kiddo::SquaredEuclidean;
use nalgebra::Point3;

use crate::algorithms::matching::common::KdTree;
use crate::core::types::{IdType, Transform};

/// A 3D kd-tree over the translations of one sensor's vertices.
///
/// Rows are numbered densely 0..N−1 in vertex insertion order; the row
/// payload maps back to the vertex ID. The index is a snapshot: vertices
/// added after the build are not contained until the next rebuild.
pub struct NeighborIndex {
    tree: KdTree<f64, 3>,
    ids: Vec<IdType>,
    sensor: String,
    vertex_count_at_build: usize,
}

impl NeighborIndex {
    /// Build an index from (vertex ID, position) pairs.
    ///
    /// `vertex_count` is the total graph vertex count at build time, used
    /// to detect staleness.
    pub fn build(
        sensor: impl Into<String>,
        entries: &[(IdType, Point3<f64>)],
        vertex_count: usize,
    ) -> Self {
        let mut tree: KdTree<f64, 3> = KdTree::new();
        let mut ids = Vec::with_capacity(entries.len());
        for (row, (id, p)) in entries.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], row as u64);
            ids.push(*id);
        }
        Self {
            tree,
            ids,
            sensor: sensor.into(),
            vertex_count_at_build: vertex_count,
        }
    }

    /// Name of the sensor whose vertices are indexed.
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Number of indexed vertices.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the index contains no vertices.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Graph vertex count recorded when the index was built.
    pub fn vertex_count_at_build(&self) -> usize {
        self.vertex_count_at_build
    }

    /// Vertices within `radius` meters of a pose, closest first.
    pub fn nearby(&self, pose: &Transform, radius: f64) -> Vec<IdType> {
        let t = pose.translation.vector;
        self.tree
            .within::<SquaredEuclidean>(&[t.x, t.y, t.z], radius * radius)
            .into_iter()
            .map(|nn| self.ids[nn.item as usize])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: IdType, x: f64) -> (IdType, Point3<f64>) {
        (id, Point3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_radius_search_sorted_by_distance() {
        let index = NeighborIndex::build(
            "laser",
            &[entry(0, 0.0), entry(1, 3.0), entry(2, 1.0)],
            3,
        );
        let found = index.nearby(&Transform::translation(0.2, 0.0, 0.0), 2.0);
        assert_eq!(found, vec![0, 2]);
    }

    #[test]
    fn test_empty_radius() {
        let index = NeighborIndex::build("laser", &[entry(7, 10.0)], 1);
        let found = index.nearby(&Transform::identity(), 1.0);
        assert!(found.is_empty());
    }

    #[test]
    fn test_dense_rows() {
        let entries: Vec<_> = (0..5).map(|i| entry(i * 2, i as f64)).collect();
        let index = NeighborIndex::build("laser", &entries, 10);
        assert_eq!(index.len(), 5);
        assert_eq!(index.sensor(), "laser");
    }
}
