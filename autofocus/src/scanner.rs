//! Offset scans with pipelined focuser moves.
//!
//! Each exposure's dead time (after integration, before readout completes) is
//! used to read back where the focuser actually sat and to command the next
//! offset, so focuser settling overlaps sensor readout:
//!
//! ```text
//! set_offset(o0)
//! expose #0 ──integrate──┤ dead time: position() → p0, set_offset(o1) ├─readout─
//! expose #1 ──integrate──┤ dead time: position() → p1, set_offset(o2) ├─readout─
//! ...
//! expose #n ──integrate──┤ dead time: position() → pn, set_offset(0)  ├─readout─
//! ```
//!
//! Frames are measured once every exposure has completed. Samples are recorded
//! at the reported positions `p_i`, not the commanded offsets.

use hardware::{DeviceError, DeviceResult, ExposureInterface, FocuserInterface, ShutterMode};
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::measurement::FwhmMeasurement;
use crate::sample::{FocusSample, FocusSeries};

/// Offsets visited by one scan.
///
/// `attempts` offsets spaced by `step`, starting at
/// `center - step * (attempts / 2)` (integer division). Offsets beyond the
/// `i64` range saturate; [`scan_bounds`] reports whether a scan fits.
pub fn scan_offsets(center: i64, step: i64, attempts: u32) -> Vec<i64> {
    let attempts = attempts as i64;
    let start = center.saturating_sub(step.saturating_mul(attempts / 2));
    (0..attempts)
        .map(|k| start.saturating_add(k.saturating_mul(step)))
        .collect()
}

/// First and last offset of a scan, or `None` if either overflows `i64`
pub fn scan_bounds(center: i64, step: i64, attempts: u32) -> Option<(i64, i64)> {
    let attempts = attempts as i64;
    let start = center.checked_sub(step.checked_mul(attempts / 2)?)?;
    let end = start.checked_add(step.checked_mul(attempts.checked_sub(1)?)?)?;
    Some((start, end))
}

/// State carried from one exposure to the next.
#[derive(Debug)]
struct ScanPipeline {
    offsets: Vec<i64>,
    /// Index of the exposure in flight
    current: usize,
    /// Offset to command at the next dead-time boundary
    pending: i64,
    /// Position reported at the last dead-time boundary, not yet consumed
    reported: Option<i64>,
}

impl ScanPipeline {
    fn new(offsets: Vec<i64>) -> Self {
        let pending = Self::successor(&offsets, 0);
        Self {
            offsets,
            current: 0,
            pending,
            reported: None,
        }
    }

    /// Offset to command once exposure `index` integrates; zero after the last
    fn successor(offsets: &[i64], index: usize) -> i64 {
        offsets.get(index + 1).copied().unwrap_or(0)
    }

    /// Commanded offset of the exposure about to start
    fn current_offset(&self) -> Option<i64> {
        self.offsets.get(self.current).copied()
    }

    /// Dead-time hook: record the actual position, then command the next offset
    fn on_dead_time<F: FocuserInterface>(&mut self, focuser: &mut F) -> DeviceResult<()> {
        self.reported = Some(focuser.position()?);
        focuser.set_offset(self.pending)
    }

    /// Close out the exposure in flight and return its reported position
    fn complete(&mut self) -> DeviceResult<i64> {
        let position = self.reported.take().ok_or(DeviceError::DeadTimeMissed)?;
        self.current += 1;
        self.pending = Self::successor(&self.offsets, self.current);
        Ok(position)
    }
}

/// Drives one scan across the configured offsets
pub struct OffsetScanner<'a> {
    config: &'a ScanConfig,
    center: i64,
}

impl<'a> OffsetScanner<'a> {
    /// Scanner centered on the configured `center_offset`
    pub fn new(config: &'a ScanConfig) -> Self {
        Self {
            config,
            center: config.center_offset,
        }
    }

    /// Center the scan on `center` ticks from the baseline instead
    pub fn centered_at(mut self, center: i64) -> Self {
        self.center = center;
        self
    }

    /// Expose at every scan offset and measure the frames.
    ///
    /// Offsets are relative to the focuser's current baseline. Frames whose
    /// measurement fails are logged and left out; the returned series may be
    /// empty.
    ///
    /// # Errors
    /// Any [`DeviceError`] from the focuser or camera ends the scan immediately.
    pub fn scan<Fo, C, M>(
        &self,
        focuser: &mut Fo,
        camera: &mut C,
        measurement: &M,
    ) -> Result<FocusSeries, DeviceError>
    where
        Fo: FocuserInterface,
        C: ExposureInterface,
        M: FwhmMeasurement<C::Frame>,
    {
        let config = self.config;
        let offsets = scan_offsets(self.center, config.step_size, config.attempt_count);
        let duration = config.exposure_time();

        let mut pipeline = ScanPipeline::new(offsets);
        let mut frames = Vec::with_capacity(pipeline.offsets.len());

        if let Some(first) = pipeline.current_offset() {
            focuser.set_offset(first)?;
        }

        while let Some(commanded) = pipeline.current_offset() {
            info!(
                "starting {:.1}s exposure on offset {}",
                duration.as_secs_f64(),
                commanded
            );
            let frame = camera.take_exposure(duration, ShutterMode::Light, &mut || {
                pipeline.on_dead_time(focuser)
            })?;
            let position = pipeline.complete()?;
            frames.push((position, frame));
        }

        info!("all focusing exposures finished, processing data");

        let mut series = FocusSeries::new();
        for (position, frame) in &frames {
            let measured = match measurement.measure(frame, config.min_stars) {
                Ok(m) => m,
                Err(e) => {
                    warn!("offset {}: {}", position, e);
                    continue;
                }
            };

            let sample = FocusSample::new(*position, measured.fwhm, measured.star_count);
            if !sample.is_usable(config.min_stars) {
                warn!(
                    "offset {}: unusable measurement (fwhm {}, {} stars)",
                    position, measured.fwhm, measured.star_count
                );
                continue;
            }

            info!(
                "offset {} fwhm {:.3} with {} stars",
                position, sample.fwhm, sample.star_count
            );
            if let Some(previous) = series.push(sample) {
                warn!(
                    "offset {} reported twice, replacing fwhm {:.3}",
                    position, previous.fwhm
                );
            }
        }

        Ok(series)
    }
}
