//! Star measurement interface.
//!
//! Star detection itself lives outside this crate; the focus engine only needs
//! an FWHM estimate and the number of stars it came from.

use hardware::sim::SimFrame;
use thiserror::Error;

/// FWHM estimate for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarMeasurement {
    pub fwhm: f64,
    pub star_count: u32,
}

/// Reasons a single frame cannot be used
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Detected {found} stars, need at least {required}")]
    TooFewStars { found: u32, required: u32 },

    #[error("Star detection failed: {0}")]
    DetectionFailed(String),
}

/// Measures stellar FWHM in frames of type `F`
pub trait FwhmMeasurement<F> {
    /// Estimate FWHM, failing if fewer than `min_stars` stars are detected
    fn measure(&self, frame: &F, min_stars: u32) -> Result<StarMeasurement, MeasurementError>;
}

impl<F, T> FwhmMeasurement<F> for T
where
    T: Fn(&F, u32) -> Result<StarMeasurement, MeasurementError>,
{
    fn measure(&self, frame: &F, min_stars: u32) -> Result<StarMeasurement, MeasurementError> {
        self(frame, min_stars)
    }
}

/// Reads the detector quantities carried by simulated frames
#[derive(Debug, Clone, Copy, Default)]
pub struct SimFrameMeasurement;

impl FwhmMeasurement<SimFrame> for SimFrameMeasurement {
    fn measure(
        &self,
        frame: &SimFrame,
        min_stars: u32,
    ) -> Result<StarMeasurement, MeasurementError> {
        if frame.star_count < min_stars {
            return Err(MeasurementError::TooFewStars {
                found: frame.star_count,
                required: min_stars,
            });
        }
        Ok(StarMeasurement {
            fwhm: frame.fwhm,
            star_count: frame.star_count,
        })
    }
}
