//! Focuser interface trait for focus workflows.

use crate::DeviceResult;

/// Interface for focuser control
///
/// Positions are in focuser ticks. The focuser holds an absolute baseline
/// position plus a temporary offset applied on top of it.
pub trait FocuserInterface {
    /// Identifier of the focuser (e.g. "F0")
    fn id(&self) -> &str;

    /// Command a temporary offset relative to the baseline
    fn set_offset(&mut self, ticks: i64) -> DeviceResult<()>;

    /// Move the baseline to an absolute position
    fn set_absolute(&mut self, ticks: i64) -> DeviceResult<()>;

    /// Actual position reported by the mechanism
    ///
    /// May differ from the commanded baseline + offset (backlash, actuation error).
    fn position(&mut self) -> DeviceResult<i64>;
}
