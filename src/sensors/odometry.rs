//! Odometry source interface.

use crate::core::types::{Timestamp, TransformWithCovariance};
use crate::error::Result;

/// A source of dead-reckoning poses.
///
/// The mapper queries the odometry at measurement timestamps to gate
/// admission and to create sequential edges between vertices. Mapping can
/// work without an odometry module when the sensor's own matching is good
/// enough (e.g. a 360° laser scanner).
pub trait Odometry {
    /// The robot's dead-reckoning pose at the given point in time.
    ///
    /// Fails with [`crate::SlamError::OdometryUnavailable`] when no pose
    /// can be produced for the requested timestamp.
    fn pose_at(&self, timestamp_us: Timestamp) -> Result<TransformWithCovariance>;

    /// Relative pose and uncertainty between two points in time.
    ///
    /// The default composes the two absolute poses and adds their
    /// covariances; sources with a better interval model should override.
    fn relative(&self, from_us: Timestamp, to_us: Timestamp) -> Result<TransformWithCovariance> {
        let from = self.pose_at(from_us)?;
        let to = self.pose_at(to_us)?;
        Ok(TransformWithCovariance::new(
            from.transform.inverse() * to.transform,
            from.covariance + to.covariance,
        ))
    }
}
