use thiserror::Error;

/// Failures reported by location and motion sources.
///
/// None of these stop a ride; the feed controller turns them into an error message on the
/// ride state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("User denied Geolocation")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Timeout expired")]
    Timeout,

    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

/// Ride meter error types
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Meter is no longer running")]
    ChannelClosed,

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

pub type MeterResult<T> = Result<T, MeterError>;
