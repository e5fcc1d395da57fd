//! Sensor measurements attached to graph vertices.

use std::any::Any;
use std::sync::Arc;

use uuid::Uuid;

use super::point_cloud::PointCloud3D;
use super::transform::Transform;
use super::Timestamp;

/// A single reading from a sensor.
///
/// This can be a point cloud, a range scan, an image or anything else a
/// sensor module knows how to match. Measurements are immutable once
/// constructed and shared between the graph and external consumers as
/// `Arc<dyn Measurement>`.
pub trait Measurement: Send + Sync {
    /// Globally unique identifier of this measurement.
    ///
    /// Unique across the process lifetime and across robots, so external
    /// readings can be cross-referenced by their original UUID.
    fn uuid(&self) -> Uuid;

    /// Capture time in microseconds.
    fn timestamp_us(&self) -> Timestamp;

    /// Name of the robot that acquired this measurement.
    fn robot_name(&self) -> &str;

    /// Name of the sensor managing this measurement.
    ///
    /// Must match a sensor registered with the mapper.
    fn sensor_name(&self) -> &str;

    /// Transform from robot origin to sensor origin at capture time.
    fn sensor_pose(&self) -> &Transform;

    /// Inverse of the sensor mount pose.
    fn inverse_sensor_pose(&self) -> &Transform;

    /// Downcast support for sensor modules.
    fn as_any(&self) -> &dyn Any;
}

/// Measurement variant owning a 3D point cloud.
pub struct PointCloudMeasurement {
    uuid: Uuid,
    timestamp_us: Timestamp,
    robot_name: String,
    sensor_name: String,
    sensor_pose: Transform,
    inverse_sensor_pose: Transform,
    cloud: PointCloud3D,
}

impl PointCloudMeasurement {
    /// Create a new measurement with a freshly generated UUID.
    pub fn new(
        cloud: PointCloud3D,
        robot_name: impl Into<String>,
        sensor_name: impl Into<String>,
        sensor_pose: Transform,
        timestamp_us: Timestamp,
    ) -> Self {
        Self::with_uuid(
            cloud,
            robot_name,
            sensor_name,
            sensor_pose,
            timestamp_us,
            Uuid::new_v4(),
        )
    }

    /// Create a measurement with a caller-supplied UUID.
    ///
    /// Used when ingesting readings from another robot, which keep the
    /// identifier assigned at their origin.
    pub fn with_uuid(
        cloud: PointCloud3D,
        robot_name: impl Into<String>,
        sensor_name: impl Into<String>,
        sensor_pose: Transform,
        timestamp_us: Timestamp,
        uuid: Uuid,
    ) -> Self {
        Self {
            uuid,
            timestamp_us,
            robot_name: robot_name.into(),
            sensor_name: sensor_name.into(),
            sensor_pose,
            inverse_sensor_pose: sensor_pose.inverse(),
            cloud,
        }
    }

    /// The point cloud contained within this measurement.
    pub fn point_cloud(&self) -> &PointCloud3D {
        &self.cloud
    }

    /// Wrap into the shared handle the graph expects.
    pub fn into_arc(self) -> Arc<dyn Measurement> {
        Arc::new(self)
    }
}

impl Measurement for PointCloudMeasurement {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn timestamp_us(&self) -> Timestamp {
        self.timestamp_us
    }

    fn robot_name(&self) -> &str {
        &self.robot_name
    }

    fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    fn sensor_pose(&self) -> &Transform {
        &self.sensor_pose
    }

    fn inverse_sensor_pose(&self) -> &Transform {
        &self.inverse_sensor_pose
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
