//! Error type shared by all device interfaces.

use thiserror::Error;

/// Failures reported by focuser and camera devices.
///
/// These are never retried by the focus engine: any device error ends the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Actuation failed on {device}: {message}")]
    Actuation { device: String, message: String },

    #[error("Position {requested} outside travel range [{min}, {max}] on {device}")]
    OutOfRange {
        device: String,
        requested: i64,
        min: i64,
        max: i64,
    },

    #[error("Exposure failed: {0}")]
    Exposure(String),

    #[error("Dead-time callback was not invoked during the exposure")]
    DeadTimeMissed,
}

impl DeviceError {
    /// True for errors raised by the focus actuator rather than the camera.
    pub fn is_actuation(&self) -> bool {
        matches!(
            self,
            DeviceError::Actuation { .. } | DeviceError::OutOfRange { .. }
        )
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
