//! Error types for AkashaSLAM

use thiserror::Error;

use crate::core::types::IdType;

/// AkashaSLAM error type
#[derive(Error, Debug)]
pub enum SlamError {
    #[error("Sensor '{0}' has not been registered")]
    UnknownSensor(String),

    #[error("Sensor with name '{0}' already exists")]
    DuplicateSensor(String),

    #[error("Measurement with UUID {0} is already part of the graph")]
    DuplicateUuid(uuid::Uuid),

    #[error("Vertex with ID {0} does not exist")]
    UnknownVertex(IdType),

    #[error("Neighbor index has not been built")]
    IndexStale,

    #[error("Measurement is not a {expected}")]
    BadMeasurementType { expected: &'static str },

    #[error("Matching failed: {0}")]
    NoMatch(String),

    #[error("Odometry at timestamp {0} is not available")]
    OdometryUnavailable(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlamError>;
