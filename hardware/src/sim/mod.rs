//! Simulated focus rig.
//!
//! A [`SimFocuser`] and a [`SimCamera`] share one mechanism state, so frames
//! reflect wherever the focuser actually sat during integration. Image quality
//! follows a hyperbolic defocus curve:
//!
//! ```text
//! fwhm(p) = sqrt(min_fwhm² + (defocus_rate * (p - best_focus))²)
//! ```
//!
//! The detected star count falls off as `max_stars * min_fwhm / fwhm(p)`.
//!
//! # Example
//!
//! ```
//! use hardware::sim::{sim_rig, SimOptics, SimRigOptions};
//! use hardware::{ExposureInterface, FocuserInterface, ShutterMode};
//! use std::time::Duration;
//!
//! let (mut focuser, mut camera) = sim_rig(SimOptics::default(), SimRigOptions::default());
//! focuser.set_absolute(120)?;
//! let frame = camera.take_exposure(Duration::from_secs(1), ShutterMode::Light, &mut || Ok(()))?;
//! assert_eq!(frame.position, 120);
//! # Ok::<(), hardware::DeviceError>(())
//! ```

mod camera;
mod focuser;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{DeviceError, DeviceResult};

pub use camera::{SimCamera, SimFrame};
pub use focuser::SimFocuser;

/// Optical model of the simulated telescope
#[derive(Debug, Clone)]
pub struct SimOptics {
    /// Absolute focuser position of best focus (ticks)
    pub best_focus: i64,
    /// FWHM at best focus (pixels)
    pub min_fwhm: f64,
    /// FWHM growth per tick of defocus far from focus (pixels/tick)
    pub defocus_rate: f64,
    /// Stars detected at best focus
    pub max_stars: u32,
    /// Standard deviation of additive FWHM noise (pixels)
    pub fwhm_noise: f64,
}

impl Default for SimOptics {
    fn default() -> Self {
        Self {
            best_focus: 0,
            min_fwhm: 2.0,
            defocus_rate: 0.02,
            max_stars: 60,
            fwhm_noise: 0.0,
        }
    }
}

impl SimOptics {
    /// Noise-free FWHM at an absolute focuser position
    pub fn fwhm_at(&self, position: i64) -> f64 {
        let defocus = self.defocus_rate * (position - self.best_focus) as f64;
        self.min_fwhm.hypot(defocus)
    }

    /// Number of stars detectable at a given FWHM
    pub fn star_count_for(&self, fwhm: f64) -> u32 {
        if fwhm <= 0.0 {
            return 0;
        }
        (self.max_stars as f64 * (self.min_fwhm / fwhm).min(1.0)).round() as u32
    }
}

/// Mechanical parameters of the simulated rig
#[derive(Debug, Clone)]
pub struct SimRigOptions {
    pub focuser_id: String,
    /// Lost motion after a reversal to negative travel (ticks)
    pub backlash: i64,
    /// Inclusive travel limits (ticks)
    pub travel: (i64, i64),
    /// Seed for the camera noise generator
    pub seed: u64,
    /// Exposure indices (0-based) that see no stars, e.g. passing cloud
    pub obscured_exposures: Vec<usize>,
}

impl Default for SimRigOptions {
    fn default() -> Self {
        Self {
            focuser_id: "F0".to_string(),
            backlash: 0,
            travel: (-50_000, 50_000),
            seed: 0,
            obscured_exposures: Vec::new(),
        }
    }
}

/// Mechanism state shared by the focuser and the camera
#[derive(Debug, Default)]
struct Mechanism {
    baseline: i64,
    offset: i64,
    /// Actual position including backlash
    position: i64,
    /// Sign of the last non-zero move
    direction: i64,
}

type SharedMechanism = Arc<Mutex<Mechanism>>;

fn lock(mechanism: &SharedMechanism) -> DeviceResult<MutexGuard<'_, Mechanism>> {
    mechanism
        .lock()
        .map_err(|_| DeviceError::Exposure("simulated mechanism state poisoned".to_string()))
}

/// Build a focuser and camera that share one mechanism.
pub fn sim_rig(optics: SimOptics, options: SimRigOptions) -> (SimFocuser, SimCamera) {
    let mechanism: SharedMechanism = Arc::new(Mutex::new(Mechanism::default()));
    let focuser = SimFocuser::new(
        options.focuser_id,
        mechanism.clone(),
        options.backlash,
        options.travel,
    );
    let camera = SimCamera::new(
        mechanism,
        optics,
        options.seed,
        options.obscured_exposures,
    );
    (focuser, camera)
}
