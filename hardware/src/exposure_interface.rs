//! Exposure interface trait for focus workflows.

use std::time::Duration;

use crate::DeviceResult;

/// Shutter state during an exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutterMode {
    /// Shutter open, sky light reaches the sensor
    #[default]
    Light,
    /// Shutter closed
    Dark,
}

/// Interface for taking single exposures
///
/// Abstracts the camera for testability in focus workflows.
pub trait ExposureInterface {
    /// Image type produced by one exposure
    type Frame;

    /// Take one exposure and block until readout completes.
    ///
    /// `on_dead_time` must be invoked exactly once, after integration ends and
    /// before readout completes. An error from the callback aborts the exposure
    /// and is returned unchanged.
    ///
    /// # Arguments
    /// * `duration` - Integration time
    /// * `shutter` - Shutter state during integration
    /// * `on_dead_time` - Hook for issuing other device commands during readout
    fn take_exposure(
        &mut self,
        duration: Duration,
        shutter: ShutterMode,
        on_dead_time: &mut dyn FnMut() -> DeviceResult<()>,
    ) -> DeviceResult<Self::Frame>;
}
