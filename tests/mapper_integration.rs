//! End-to-end mapper scenarios with real scan matching.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::Point3;

use akasha_slam::{
    Covariance, IdType, Mapper, Measurement, Odometry, PointCloud3D, PointCloudMeasurement,
    PointCloudSensor, PointCloudSensorConfig, RegistrationParameters, Result, SlamError, Solver,
    Transform, TransformWithCovariance,
};

/// Three orthogonal walls spanning `size` meters, observed without
/// occlusion from every pose.
fn world_scene(n: usize, size: f64) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    let step = size / n as f64;
    for i in 0..n {
        for j in 0..n {
            let u = i as f64 * step;
            let v = j as f64 * step;
            cloud.push(Point3::new(u, v, 0.0));
            cloud.push(Point3::new(u, 0.0, v));
            cloud.push(Point3::new(0.0, u, v));
        }
    }
    cloud
}

fn measurement_at(
    scene: &PointCloud3D,
    robot_pose: &Transform,
    stamp: u64,
) -> Arc<dyn Measurement> {
    let cloud = scene.transformed(&robot_pose.inverse());
    PointCloudMeasurement::new(cloud, "robot", "velodyne", Transform::identity(), stamp)
        .into_arc()
}

struct ScriptedOdometry {
    poses: HashMap<u64, Transform>,
}

impl Odometry for ScriptedOdometry {
    fn pose_at(&self, timestamp_us: u64) -> Result<TransformWithCovariance> {
        self.poses
            .get(&timestamp_us)
            .map(|tf| TransformWithCovariance::new(*tf, Covariance::identity() * 0.01))
            .ok_or(SlamError::OdometryUnavailable(timestamp_us))
    }
}

/// Echoes the poses it was fed; optimization is a fixed point.
#[derive(Clone, Default)]
struct EchoSolver {
    nodes: Rc<RefCell<Vec<(IdType, Transform)>>>,
}

impl Solver for EchoSolver {
    fn add_node(&mut self, id: IdType, pose: Transform) {
        self.nodes.borrow_mut().push((id, pose));
    }
    fn add_constraint(
        &mut self,
        _source: IdType,
        _target: IdType,
        _transform: &Transform,
        _information: &Covariance,
    ) {
    }
    fn set_fixed(&mut self, _id: IdType) {}
    fn compute(&mut self) -> bool {
        true
    }
    fn corrected_poses(&self) -> Vec<(IdType, Transform)> {
        self.nodes.borrow().clone()
    }
    fn clear(&mut self) {
        self.nodes.borrow_mut().clear();
    }
}

fn matching_sensor() -> PointCloudSensor {
    // Full-resolution matching keeps the synthetic clouds above the
    // filtering gate.
    let fine = RegistrationParameters {
        point_cloud_density: 0.0,
        ..Default::default()
    };
    let coarse = RegistrationParameters {
        point_cloud_density: 0.0,
        max_correspondence_distance: 5.0,
        maximum_iterations: 20,
        ..Default::default()
    };
    PointCloudSensor::new(
        "velodyne",
        PointCloudSensorConfig {
            fine,
            coarse,
            ..Default::default()
        },
    )
}

#[test]
fn loop_closure_corrects_odometry_drift() {
    let scene = world_scene(20, 6.0);

    let mut mapper = Mapper::new();
    mapper.register_sensor(Box::new(matching_sensor())).unwrap();
    mapper.set_neighbor_radius(10.0, 5);
    mapper.set_min_pose_distance(0.5, 0.1);
    mapper.set_odometry(
        Box::new(ScriptedOdometry {
            poses: [
                (0, Transform::identity()),
                (1, Transform::translation(5.0, 0.0, 0.0)),
            ]
            .into_iter()
            .collect(),
        }),
        true,
    );

    // The robot actually moved a bit further than odometry believes.
    let true_pose_b = Transform::translation(5.05, 0.1, 0.0);
    assert!(mapper.add_reading(measurement_at(&scene, &Transform::identity(), 0)));
    assert!(mapper.add_reading(measurement_at(&scene, &true_pose_b, 1)));

    assert_eq!(mapper.graph().num_vertices(), 2);
    assert_eq!(mapper.graph().edges_from_sensor("odometry").len(), 1);

    let matched: Vec<_> = mapper.graph().edges_from_sensor("velodyne");
    assert_eq!(matched.len(), 1, "expected one loop closure edge");
    let edge = matched[0];
    assert_eq!(edge.source, 0);
    assert_eq!(edge.target, 1);
    assert_eq!(edge.label, "loop");

    // The constraint recovers the true relative pose, not the drifted
    // odometry estimate.
    assert_relative_eq!(
        (edge.transform.translation.vector - true_pose_b.translation.vector).norm(),
        0.0,
        epsilon = 0.05
    );
}

#[test]
fn optimize_is_stable_without_new_insertions() {
    let mut mapper = Mapper::new();
    mapper.register_sensor(Box::new(matching_sensor())).unwrap();
    mapper.set_min_pose_distance(0.5, 0.1);
    mapper.set_odometry(
        Box::new(ScriptedOdometry {
            poses: [
                (0, Transform::identity()),
                (1, Transform::translation(1.0, 0.0, 0.0)),
                (2, Transform::translation(2.0, 0.0, 0.0)),
            ]
            .into_iter()
            .collect(),
        }),
        true,
    );
    mapper.set_solver(Box::new(EchoSolver::default()));

    let scene = world_scene(8, 2.0);
    for stamp in 0..3 {
        let pose = Transform::translation(stamp as f64, 0.0, 0.0);
        assert!(mapper.add_reading(measurement_at(&scene, &pose, stamp)));
    }

    assert!(mapper.optimize());
    let poses_first: Vec<_> = mapper
        .graph()
        .vertices()
        .iter()
        .map(|v| v.corrected_pose)
        .collect();

    assert!(mapper.optimize());
    for (v, before) in mapper.graph().vertices().iter().zip(&poses_first) {
        assert_relative_eq!(
            (v.corrected_pose.translation.vector - before.translation.vector).norm(),
            0.0,
            epsilon = 1e-9
        );
    }
}

#[test]
fn graph_dump_is_valid_dot() {
    let mut mapper = Mapper::new();
    mapper.register_sensor(Box::new(matching_sensor())).unwrap();
    mapper.set_min_pose_distance(0.1, 0.05);
    mapper.set_odometry(
        Box::new(ScriptedOdometry {
            poses: [
                (0, Transform::identity()),
                (1, Transform::translation(1.0, 0.0, 0.0)),
            ]
            .into_iter()
            .collect(),
        }),
        true,
    );

    let scene = world_scene(8, 2.0);
    assert!(mapper.add_reading(measurement_at(&scene, &Transform::identity(), 0)));
    assert!(mapper.add_reading(measurement_at(
        &scene,
        &Transform::translation(1.0, 0.0, 0.0),
        1
    )));

    let path = std::env::temp_dir().join("akasha_slam_pose_graph.dot");
    mapper.write_graph_to_file(&path).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("0 -> 1"));
    assert!(dot.contains("robot:velodyne"));
}
