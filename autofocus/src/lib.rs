//! Telescope autofocus.
//!
//! A run scans the focuser across a range of offsets, measures stellar FWHM at
//! each one, fits a focus curve and commands the focuser to its optimum:
//!
//! - [`OffsetScanner`] exposes at every offset, moving the focuser during each
//!   exposure's dead time
//! - [`CurveFitter`] fits linear, quadratic or quartic FWHM curves
//! - [`ValidityGate`] replaces implausible optima with a linear estimate
//! - [`FocusController`] sequences the passes and commits the result
//!
//! # Example
//!
//! ```
//! use autofocus::{FocusController, ScanConfig, SimFrameMeasurement};
//! use hardware::sim::{sim_rig, SimOptics, SimRigOptions};
//!
//! let optics = SimOptics {
//!     best_focus: 30,
//!     ..Default::default()
//! };
//! let (mut focuser, mut camera) = sim_rig(optics, SimRigOptions::default());
//! let config = ScanConfig {
//!     step_size: 20,
//!     attempt_count: 9,
//!     ..Default::default()
//! };
//!
//! let report = FocusController::new(&config, &mut focuser, &mut camera, &SimFrameMeasurement)
//!     .run()
//!     .unwrap();
//! assert!((report.committed_position - 30).abs() <= 5);
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod fit;
pub mod gate;
pub mod measurement;
pub mod report;
pub mod sample;
pub mod scanner;

pub use config::{ConfigError, ScanConfig};
pub use controller::{FocusController, FocusState};
pub use error::FocusError;
pub use fit::{CurveFitter, FitError, FitModel, FitOptions, FitResult, ModelKind, OffsetScale};
pub use gate::{Resolution, Validity, ValidityGate};
pub use measurement::{FwhmMeasurement, MeasurementError, SimFrameMeasurement, StarMeasurement};
pub use report::{FocusRunReport, PassReport, ReportError};
pub use sample::{load_samples_csv, FocusSample, FocusSeries};
pub use scanner::{scan_bounds, scan_offsets, OffsetScanner};
