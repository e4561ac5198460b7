use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use tracing::debug;

use super::{lock, SharedMechanism, SimOptics};
use crate::{DeviceError, DeviceResult, ExposureInterface, ShutterMode};

/// Smallest FWHM the simulated detector can report (pixels)
const MIN_REPORTED_FWHM: f64 = 0.1;

/// One simulated exposure.
///
/// Carries the quantities a star detector would extract from real pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct SimFrame {
    /// 0-based index of the exposure since the camera was created
    pub index: usize,
    /// Actual focuser position during integration
    pub position: i64,
    pub duration: Duration,
    pub shutter: ShutterMode,
    /// Measured FWHM including noise (pixels)
    pub fwhm: f64,
    pub star_count: u32,
}

/// Simulated camera reading the shared mechanism position at integration time
pub struct SimCamera {
    mechanism: SharedMechanism,
    optics: SimOptics,
    rng: ChaCha8Rng,
    obscured: Vec<usize>,
    exposures: usize,
}

impl SimCamera {
    pub(super) fn new(
        mechanism: SharedMechanism,
        optics: SimOptics,
        seed: u64,
        obscured: Vec<usize>,
    ) -> Self {
        Self {
            mechanism,
            optics,
            rng: ChaCha8Rng::seed_from_u64(seed),
            obscured,
            exposures: 0,
        }
    }

    /// Number of exposures taken so far
    pub fn exposures_taken(&self) -> usize {
        self.exposures
    }

    pub fn optics(&self) -> &SimOptics {
        &self.optics
    }

    fn sample_fwhm(&mut self, position: i64) -> DeviceResult<f64> {
        let truth = self.optics.fwhm_at(position);
        if self.optics.fwhm_noise <= 0.0 {
            return Ok(truth);
        }
        let noise = Normal::new(0.0, self.optics.fwhm_noise)
            .map_err(|e| DeviceError::Exposure(format!("invalid noise model: {e}")))?;
        Ok((truth + self.rng.sample(noise)).max(MIN_REPORTED_FWHM))
    }
}

impl ExposureInterface for SimCamera {
    type Frame = SimFrame;

    fn take_exposure(
        &mut self,
        duration: Duration,
        shutter: ShutterMode,
        on_dead_time: &mut dyn FnMut() -> DeviceResult<()>,
    ) -> DeviceResult<SimFrame> {
        let index = self.exposures;
        self.exposures += 1;

        // Integration: the frame sees wherever the mechanism sits right now
        let position = lock(&self.mechanism)?.position;
        let fwhm = self.sample_fwhm(position)?;
        let star_count = if shutter == ShutterMode::Dark || self.obscured.contains(&index) {
            0
        } else {
            self.optics.star_count_for(fwhm)
        };

        on_dead_time()?;

        debug!(
            "exposure {}: position {}, fwhm {:.3}, {} stars",
            index, position, fwhm, star_count
        );

        Ok(SimFrame {
            index,
            position,
            duration,
            shutter,
            fwhm,
            star_count,
        })
    }
}
