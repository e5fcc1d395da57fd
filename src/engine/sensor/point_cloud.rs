//! Sensor module for 3D point cloud measurements.
//!
//! Owns the scan-matching pipeline (downsample → GICP/NDT → convergence
//! gate → covariance) and the map assembly operations derived from the
//! optimized graph.

use std::f64::consts::TAU;
use std::sync::Arc;

use crate::algorithms::matching::{registration_for, RegistrationParameters};
use crate::core::types::{
    Covariance, Measurement, PointCloud3D, PointCloudMeasurement, Transform,
};
use crate::engine::graph::VertexObject;
use crate::error::{Result, SlamError};
use crate::sensors::preprocessing::{
    fit_plane_ransac, remove_outliers, voxel_downsample, RansacPlaneConfig,
};

use super::{SE3Constraint, Sensor};

/// Minimum cloud size after filtering for matching to be attempted.
const MIN_FILTERED_POINTS: usize = 100;

/// Configuration of a [`PointCloudSensor`].
#[derive(Debug, Clone)]
pub struct PointCloudSensorConfig {
    /// Parameter set for the final alignment of every constraint.
    pub fine: RegistrationParameters,

    /// Parameter set for the initial refinement of loop closures.
    pub coarse: RegistrationParameters,

    /// Scale of the placeholder constraint covariance `I * scale`.
    pub covariance_scale: f64,

    /// Voxel leaf size of the assembled map in meters.
    pub map_resolution: f64,

    /// Radius for outlier removal during map assembly.
    pub map_outlier_radius: f64,

    /// Minimum neighbors within the outlier radius.
    pub map_outlier_neighbors: usize,
}

impl Default for PointCloudSensorConfig {
    fn default() -> Self {
        Self {
            fine: RegistrationParameters::default(),
            coarse: RegistrationParameters {
                point_cloud_density: 0.4,
                max_correspondence_distance: 5.0,
                maximum_iterations: 20,
                ..Default::default()
            },
            covariance_scale: 1.0,
            map_resolution: 0.1,
            map_outlier_radius: 0.2,
            map_outlier_neighbors: 2,
        }
    }
}

/// Sensor module managing point cloud measurements.
pub struct PointCloudSensor {
    name: String,
    config: PointCloudSensorConfig,
}

impl PointCloudSensor {
    /// Create a sensor module with the given unique name.
    pub fn new(name: impl Into<String>, config: PointCloudSensorConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Replace the fine registration parameters.
    pub fn set_fine_parameters(&mut self, params: RegistrationParameters) {
        log::info!("Sensor '{}': new fine parameters {:?}", self.name, params);
        self.config.fine = params;
    }

    /// Replace the coarse registration parameters.
    pub fn set_coarse_parameters(&mut self, params: RegistrationParameters) {
        log::info!("Sensor '{}': new coarse parameters {:?}", self.name, params);
        self.config.coarse = params;
    }

    /// Current configuration.
    pub fn config(&self) -> &PointCloudSensorConfig {
        &self.config
    }

    fn downcast<'a>(&self, m: &'a Arc<dyn Measurement>) -> Result<&'a PointCloudMeasurement> {
        m.as_any()
            .downcast_ref::<PointCloudMeasurement>()
            .ok_or(SlamError::BadMeasurementType {
                expected: "PointCloudMeasurement",
            })
    }

    /// Align two measurements in their sensor frames.
    ///
    /// Returns the transform mapping points from the target sensor frame
    /// into the source sensor frame, refined from `guess`.
    ///
    /// Source and target roles are switched when handed to the matcher:
    /// the pose-graph edge runs source → target, but the matcher estimates
    /// the transform of its moving cloud (the target) into its fixed
    /// cloud (the source).
    fn align(
        &self,
        source: &PointCloudMeasurement,
        target: &PointCloudMeasurement,
        guess: &Transform,
        params: &RegistrationParameters,
    ) -> Result<Transform> {
        let density = params.point_cloud_density;
        let (filtered_source, filtered_target) = if density > 0.0 {
            (
                voxel_downsample(source.point_cloud(), density),
                voxel_downsample(target.point_cloud(), density),
            )
        } else {
            (source.point_cloud().clone(), target.point_cloud().clone())
        };

        if filtered_source.len() < MIN_FILTERED_POINTS
            || filtered_target.len() < MIN_FILTERED_POINTS
        {
            return Err(SlamError::NoMatch(format!(
                "too few points after filtering: {} source, {} target",
                filtered_source.len(),
                filtered_target.len()
            )));
        }

        let matcher = registration_for(params.algorithm);
        let result = matcher.align(&filtered_target, &filtered_source, guess, params);

        if !result.converged {
            return Err(SlamError::NoMatch(format!(
                "{:?} did not converge after {} iterations",
                params.algorithm, result.iterations
            )));
        }
        if result.fitness_score > params.max_fitness_score {
            return Err(SlamError::NoMatch(format!(
                "{:?} fitness score {:.4} exceeds {:.4}",
                params.algorithm, result.fitness_score, params.max_fitness_score
            )));
        }
        Ok(result.transform)
    }

    /// Accumulate the clouds of the given vertices in the map frame.
    ///
    /// Iterates in reverse insertion order so that newer frames dominate
    /// when points coincide exactly.
    pub fn accumulated_cloud(&self, vertices: &[&VertexObject]) -> Result<PointCloud3D> {
        let mut accumulated = PointCloud3D::new();
        for v in vertices.iter().rev() {
            let pcl = self.downcast(&v.measurement)?;
            let map_frame = pcl
                .point_cloud()
                .transformed(&(v.corrected_pose * pcl.sensor_pose()));
            accumulated.extend_from(&map_frame);
        }
        Ok(accumulated)
    }

    /// Create a virtual measurement by accumulating the given vertices.
    ///
    /// The accumulation is expressed in the frame of `pose` and tagged
    /// with the sensor name `"AccumulatedPointcloud"` and identity sensor
    /// pose.
    pub fn create_combined_measurement(
        &self,
        vertices: &[&VertexObject],
        pose: &Transform,
    ) -> Result<Arc<dyn Measurement>> {
        let cloud = self.accumulated_cloud(vertices)?;
        let shifted = cloud.transformed(&pose.inverse());
        log::debug!("Combined point cloud has {} points", shifted.len());

        let robot = vertices
            .last()
            .map(|v| v.measurement.robot_name().to_string())
            .unwrap_or_default();
        let stamp = vertices
            .last()
            .map(|v| v.measurement.timestamp_us())
            .unwrap_or(0);
        Ok(PointCloudMeasurement::new(
            shifted,
            robot,
            "AccumulatedPointcloud",
            Transform::identity(),
            stamp,
        )
        .into_arc())
    }

    /// Assemble the output map from the given vertices.
    ///
    /// Accumulates all clouds in the map frame, removes isolated points
    /// and resamples to the configured map resolution.
    pub fn build_map(&self, vertices: &[&VertexObject]) -> Result<PointCloud3D> {
        let accumulated = self.accumulated_cloud(vertices)?;
        let cleaned = remove_outliers(
            &accumulated,
            self.config.map_outlier_radius,
            self.config.map_outlier_neighbors,
        );
        let map = voxel_downsample(&cleaned, self.config.map_resolution);
        log::info!(
            "Built map with {} points from {} vertices ({} accumulated)",
            map.len(),
            vertices.len(),
            accumulated.len()
        );
        Ok(map)
    }

    /// Synthesize a disc of ground points and append it to the cloud.
    ///
    /// Fits the dominant plane with RANSAC (1 cm threshold) and samples a
    /// disc of the given radius around the projected cloud centroid, with
    /// radial steps of the map resolution. Used to hallucinate a closed
    /// floor for downstream occupancy maps.
    pub fn fill_ground_plane(&self, cloud: &mut PointCloud3D, radius: f64) {
        let resolution = self.config.map_resolution;
        if radius <= 0.0 || resolution <= 0.0 {
            log::warn!("Cannot fill ground plane with radius {}", radius);
            return;
        }

        let ransac = RansacPlaneConfig {
            distance_threshold: 0.01,
            ..Default::default()
        };
        let Some(plane) = fit_plane_ransac(cloud, &ransac) else {
            log::warn!("Ground plane estimation failed, cloud left unchanged");
            return;
        };

        let center = plane.project(&cloud.centroid());
        let (u, v) = plane.basis();
        let angular_step = resolution / radius;

        cloud.push(center);
        let mut r = resolution;
        while r <= radius {
            let mut angle = 0.0;
            while angle < TAU {
                let offset = r * angle.cos() * u + r * angle.sin() * v;
                cloud.push(center + offset);
                angle += angular_step;
            }
            r += resolution;
        }
    }
}

impl Sensor for PointCloudSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn create_constraint(
        &self,
        source: &Arc<dyn Measurement>,
        target: &Arc<dyn Measurement>,
        odometry_guess: &Transform,
        is_loop: bool,
    ) -> Result<SE3Constraint> {
        let source_pcl = self.downcast(source)?;
        let target_pcl = self.downcast(target)?;

        // Guess in the sensor frames of the two measurements.
        let mut guess = source.inverse_sensor_pose() * odometry_guess * target.sensor_pose();

        if is_loop {
            guess = self.align(source_pcl, target_pcl, &guess, &self.config.coarse)?;
        }
        let icp_result = self.align(source_pcl, target_pcl, &guess, &self.config.fine)?;

        // Back to the robot frame.
        let transform = source.sensor_pose() * icp_result * target.inverse_sensor_pose();
        let covariance = Covariance::identity() * self.config.covariance_scale;

        Ok(SE3Constraint {
            sensor: self.name.clone(),
            transform,
            covariance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    /// Three orthogonal walls in the map frame.
    fn world_scene() -> PointCloud3D {
        let n = 16;
        let size = 3.0;
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

    fn exact_parameters() -> RegistrationParameters {
        RegistrationParameters {
            point_cloud_density: 0.0,
            ..Default::default()
        }
    }

    fn sensor_with_exact_parameters() -> PointCloudSensor {
        PointCloudSensor::new(
            "velodyne",
            PointCloudSensorConfig {
                fine: exact_parameters(),
                coarse: exact_parameters(),
                ..Default::default()
            },
        )
    }

    fn measurement_at(robot_pose: &Transform, stamp: u64) -> Arc<dyn Measurement> {
        // The sensor sees the world from the robot pose (identity mount).
        let cloud = world_scene().transformed(&robot_pose.inverse());
        PointCloudMeasurement::new(cloud, "robot", "velodyne", Transform::identity(), stamp)
            .into_arc()
    }

    #[test]
    fn test_constraint_recovers_relative_pose() {
        let sensor = sensor_with_exact_parameters();
        let pose_a = Transform::translation(0.2, 0.1, 0.0);
        let pose_b = Transform::translation(0.5, 0.0, 0.1);
        let source = measurement_at(&pose_a, 0);
        let target = measurement_at(&pose_b, 1);

        let true_relative = pose_a.inverse() * pose_b;
        let constraint = sensor
            .create_constraint(&source, &target, &true_relative, false)
            .unwrap();

        assert_eq!(constraint.sensor, "velodyne");
        assert_relative_eq!(
            (constraint.transform.translation.vector - true_relative.translation.vector).norm(),
            0.0,
            epsilon = 0.05
        );
    }

    #[test]
    fn test_constraint_corrects_drifted_guess() {
        let sensor = sensor_with_exact_parameters();
        let pose_a = Transform::identity();
        let pose_b = Transform::translation(0.4, 0.2, 0.0);
        let source = measurement_at(&pose_a, 0);
        let target = measurement_at(&pose_b, 1);

        // Odometry believes a slightly different relative pose.
        let drifted = Transform::translation(0.47, 0.15, 0.02);
        let constraint = sensor
            .create_constraint(&source, &target, &drifted, false)
            .unwrap();

        let true_relative = pose_a.inverse() * pose_b;
        assert_relative_eq!(
            (constraint.transform.translation.vector - true_relative.translation.vector).norm(),
            0.0,
            epsilon = 0.05
        );
    }

    #[test]
    fn test_loop_constraint_uses_coarse_refinement() {
        let sensor = sensor_with_exact_parameters();
        let pose_a = Transform::identity();
        let pose_b = Transform::translation(0.3, -0.2, 0.0);
        let source = measurement_at(&pose_a, 0);
        let target = measurement_at(&pose_b, 1);

        let true_relative = pose_a.inverse() * pose_b;
        let constraint = sensor
            .create_constraint(&source, &target, &true_relative, true)
            .unwrap();
        assert_relative_eq!(
            (constraint.transform.translation.vector - true_relative.translation.vector).norm(),
            0.0,
            epsilon = 0.05
        );
    }

    #[test]
    fn test_too_few_points_is_no_match() {
        let sensor = PointCloudSensor::new("velodyne", PointCloudSensorConfig::default());
        let tiny = PointCloud3D::from_points(vec![Point3::new(0.0, 0.0, 0.0); 20]);
        let a = PointCloudMeasurement::new(
            tiny.clone(),
            "robot",
            "velodyne",
            Transform::identity(),
            0,
        )
        .into_arc();
        let b =
            PointCloudMeasurement::new(tiny, "robot", "velodyne", Transform::identity(), 1)
                .into_arc();

        let result = sensor.create_constraint(&a, &b, &Transform::identity(), false);
        assert!(matches!(result, Err(SlamError::NoMatch(_))));
    }

    #[test]
    fn test_wrong_measurement_type() {
        struct DummyMeasurement {
            pose: Transform,
        }
        impl Measurement for DummyMeasurement {
            fn uuid(&self) -> uuid::Uuid {
                uuid::Uuid::nil()
            }
            fn timestamp_us(&self) -> u64 {
                0
            }
            fn robot_name(&self) -> &str {
                "robot"
            }
            fn sensor_name(&self) -> &str {
                "velodyne"
            }
            fn sensor_pose(&self) -> &Transform {
                &self.pose
            }
            fn inverse_sensor_pose(&self) -> &Transform {
                &self.pose
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let sensor = PointCloudSensor::new("velodyne", PointCloudSensorConfig::default());
        let dummy: Arc<dyn Measurement> = Arc::new(DummyMeasurement {
            pose: Transform::identity(),
        });
        let cloud = measurement_at(&Transform::identity(), 0);
        let result = sensor.create_constraint(&dummy, &cloud, &Transform::identity(), false);
        assert!(matches!(
            result,
            Err(SlamError::BadMeasurementType { .. })
        ));
    }

    fn vertex(id: u32, pose: Transform, stamp: u64) -> VertexObject {
        let cloud = PointCloud3D::from_points(vec![Point3::new(1.0, 0.0, 0.0)]);
        VertexObject {
            id,
            label: "robot:velodyne".into(),
            corrected_pose: pose,
            measurement: PointCloudMeasurement::new(
                cloud,
                "robot",
                "velodyne",
                Transform::identity(),
                stamp,
            )
            .into_arc(),
        }
    }

    #[test]
    fn test_accumulated_cloud_is_in_map_frame() {
        let sensor = PointCloudSensor::new("velodyne", PointCloudSensorConfig::default());
        let v0 = vertex(0, Transform::identity(), 0);
        let v1 = vertex(1, Transform::translation(0.0, 1.0, 0.0), 1);

        let accumulated = sensor.accumulated_cloud(&[&v0, &v1]).unwrap();
        assert_eq!(accumulated.len(), 2);
        // Reverse insertion order: the newer vertex comes first.
        assert_relative_eq!(accumulated.points[0].y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(accumulated.points[1].y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_combined_measurement_in_requested_frame() {
        let sensor = PointCloudSensor::new("velodyne", PointCloudSensorConfig::default());
        let v0 = vertex(0, Transform::translation(2.0, 0.0, 0.0), 5);

        let pose = Transform::translation(2.0, 0.0, 0.0);
        let combined = sensor.create_combined_measurement(&[&v0], &pose).unwrap();
        assert_eq!(combined.sensor_name(), "AccumulatedPointcloud");
        assert_eq!(combined.timestamp_us(), 5);

        let pcl = combined
            .as_any()
            .downcast_ref::<PointCloudMeasurement>()
            .unwrap();
        // Point was at (1,0,0) in the vertex sensor frame, vertex at x=2,
        // so the map frame position (3,0,0) lands back at (1,0,0) in the
        // requested frame.
        assert_relative_eq!(pcl.point_cloud().points[0].x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_build_map_resamples() {
        let sensor = PointCloudSensor::new(
            "velodyne",
            PointCloudSensorConfig {
                map_resolution: 0.5,
                map_outlier_radius: 0.5,
                map_outlier_neighbors: 1,
                ..Default::default()
            },
        );
        let cloud = world_scene();
        let v = VertexObject {
            id: 0,
            label: "robot:velodyne".into(),
            corrected_pose: Transform::identity(),
            measurement: PointCloudMeasurement::new(
                cloud.clone(),
                "robot",
                "velodyne",
                Transform::identity(),
                0,
            )
            .into_arc(),
        };

        let map = sensor.build_map(&[&v]).unwrap();
        assert!(!map.is_empty());
        assert!(map.len() < cloud.len());
    }

    #[test]
    fn test_fill_ground_plane_appends_disc() {
        let sensor = PointCloudSensor::new(
            "velodyne",
            PointCloudSensorConfig {
                map_resolution: 0.1,
                ..Default::default()
            },
        );

        // A flat floor at z = 0.2.
        let mut cloud = PointCloud3D::new();
        for i in 0..15 {
            for j in 0..15 {
                cloud.push(Point3::new(i as f64 * 0.1, j as f64 * 0.1, 0.2));
            }
        }
        let before = cloud.len();

        sensor.fill_ground_plane(&mut cloud, 1.0);
        assert!(cloud.len() > before);
        // All synthesized points lie on the fitted plane.
        for p in &cloud.points[before..] {
            assert_relative_eq!(p.z, 0.2, epsilon = 1e-6);
        }
    }
}
