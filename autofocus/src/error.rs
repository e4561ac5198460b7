use hardware::DeviceError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::fit::FitError;

/// Reasons an autofocus run ends without committing a position
#[derive(Error, Debug)]
pub enum FocusError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    #[error("Resolved focus position {0} is not a representable focuser position")]
    UnrepresentablePosition(f64),
}

impl FocusError {
    /// True if the run failed because of the focuser or camera
    pub fn is_device(&self) -> bool {
        matches!(self, FocusError::Device(_))
    }
}
