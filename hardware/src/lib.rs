//! Device interfaces for focus control.
//!
//! This crate defines the capability traits the autofocus engine drives and a
//! simulated focus rig that implements them.
//!
//! - [`FocuserInterface`] - relative and absolute focuser positioning
//! - [`ExposureInterface`] - single exposures with a dead-time callback
//! - [`sim`] - software focuser and camera sharing one optical model

mod error;
mod exposure_interface;
mod focuser_interface;
pub mod sim;

pub use error::{DeviceError, DeviceResult};
pub use exposure_interface::{ExposureInterface, ShutterMode};
pub use focuser_interface::FocuserInterface;
