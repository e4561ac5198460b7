//! Autofocus run state machine.
//!
//! Idle -> Scanning -> Fitting -> Accepted -> Committing -> Done
//!
//! When the first pass resolves through the linear fallback the focuser is
//! moved to the linear estimate and scanned once more:
//!
//! Fitting -> FallbackTriggered -> Correcting -> Scanning -> Fitting -> Accepted
//!
//! A second pass that falls back as well commits its linear estimate without
//! scanning again (Fitting -> FallbackTriggered -> Committing). Any error ends
//! the run in Failed with the focuser returned to where the run found it.

use hardware::{ExposureInterface, FocuserInterface};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::error::FocusError;
use crate::fit::CurveFitter;
use crate::gate::ValidityGate;
use crate::measurement::FwhmMeasurement;
use crate::report::{FocusRunReport, PassReport};
use crate::scanner::OffsetScanner;

/// Phases of an autofocus run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FocusState {
    Idle,
    /// Exposing across the scan offsets
    Scanning { pass: u32 },
    /// Fitting and gating the series from `pass`
    Fitting { pass: u32 },
    /// The pass produced a fit the gate trusts
    Accepted,
    /// The pass resolved through the linear fallback
    FallbackTriggered,
    /// Moving the focuser to the linear estimate before rescanning
    Correcting { target: i64 },
    /// Moving the focuser to best focus
    Committing { position: i64 },
    Done,
    Failed,
}

/// Runs one autofocus sequence on exclusively borrowed devices
pub struct FocusController<'a, Fo, C, M> {
    config: &'a ScanConfig,
    focuser: &'a mut Fo,
    camera: &'a mut C,
    measurement: &'a M,
    fitter: CurveFitter,
    gate: ValidityGate,
    state: FocusState,
    history: Vec<FocusState>,
}

impl<'a, Fo, C, M> FocusController<'a, Fo, C, M>
where
    Fo: FocuserInterface,
    C: ExposureInterface,
    M: FwhmMeasurement<C::Frame>,
{
    pub fn new(
        config: &'a ScanConfig,
        focuser: &'a mut Fo,
        camera: &'a mut C,
        measurement: &'a M,
    ) -> Self {
        Self {
            config,
            focuser,
            camera,
            measurement,
            fitter: CurveFitter::new(config.target_fwhm),
            gate: ValidityGate::from_config(config),
            state: FocusState::Idle,
            history: vec![FocusState::Idle],
        }
    }

    /// Replace the default fitter, e.g. to tune solver budgets
    pub fn with_fitter(mut self, fitter: CurveFitter) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[FocusState] {
        &self.history
    }

    fn transition(&mut self, next: FocusState) {
        debug!("focus state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Scan, fit, and move the focuser to best focus.
    ///
    /// Runs at most two scans. The focuser is left at the committed position
    /// on success. If the run fails after it has moved the baseline, the
    /// focuser is commanded back to the position it reported at the start.
    ///
    /// # Errors
    /// * `FocusError::Config` - The config fails validation
    /// * `FocusError::Device` - Any focuser or camera failure
    /// * `FocusError::Fit` - Neither the primary nor the linear fit succeeded
    /// * `FocusError::UnrepresentablePosition` - A resolved optimum does not
    ///   fit in focuser ticks
    pub fn run(&mut self) -> Result<FocusRunReport, FocusError> {
        match self.execute() {
            Ok(report) => {
                self.transition(FocusState::Done);
                info!(
                    "autofocus on {} committed position {}",
                    report.focuser_id, report.committed_position
                );
                Ok(report)
            }
            Err(e) => {
                self.transition(FocusState::Failed);
                error!("autofocus on {} failed: {}", self.config.focuser_id, e);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<FocusRunReport, FocusError> {
        self.config.validate()?;

        // Offset is zero between runs, so this is the baseline to return to
        let starting_position = self.focuser.position()?;
        let first = self.pass(1, None)?;

        let result = self.correct_and_commit(first, starting_position);
        if result.is_err() {
            self.restore(starting_position);
        }
        result
    }

    /// Everything after the first pass; the baseline may move from here on
    fn correct_and_commit(
        &mut self,
        first: PassReport,
        starting_position: i64,
    ) -> Result<FocusRunReport, FocusError> {
        let (passes, resolved_optimum) = if first.fallback {
            self.transition(FocusState::FallbackTriggered);
            let target = to_ticks(first.fit.optimum)?;

            self.transition(FocusState::Correcting { target });
            self.focuser.set_absolute(target)?;

            let second = self.pass(2, Some(target))?;
            if second.fallback {
                self.transition(FocusState::FallbackTriggered);
            } else {
                self.transition(FocusState::Accepted);
            }
            let optimum = second.fit.optimum;
            (vec![first, second], optimum)
        } else {
            self.transition(FocusState::Accepted);
            let optimum = first.fit.optimum;
            (vec![first], optimum)
        };
        let position = to_ticks(resolved_optimum)?;

        self.transition(FocusState::Committing { position });
        self.focuser.set_absolute(position)?;

        Ok(FocusRunReport {
            focuser_id: self.config.focuser_id.clone(),
            default_model: self.config.default_model,
            starting_position,
            passes,
            resolved_optimum,
            committed_position: position,
        })
    }

    /// Best-effort return to the starting baseline after a failed run
    fn restore(&mut self, starting_position: i64) {
        warn!(
            "returning focuser {} to {}",
            self.config.focuser_id, starting_position
        );
        if let Err(e) = self.focuser.set_absolute(starting_position) {
            error!(
                "failed to return focuser {} to {}: {}",
                self.config.focuser_id, starting_position, e
            );
        }
    }

    fn pass(&mut self, pass: u32, baseline: Option<i64>) -> Result<PassReport, FocusError> {
        self.transition(FocusState::Scanning { pass });
        let scanner = match baseline {
            Some(_) => OffsetScanner::new(self.config).centered_at(0),
            None => OffsetScanner::new(self.config),
        };
        let samples = scanner.scan(&mut *self.focuser, &mut *self.camera, self.measurement)?;

        self.transition(FocusState::Fitting { pass });
        let primary = self.fitter.fit(&samples, self.config.default_model);
        let resolution = self.gate.resolve(&self.fitter, &samples, primary)?;

        let report = PassReport {
            pass,
            baseline,
            samples,
            fit: resolution.fit,
            fallback: resolution.fallback,
            rejected: resolution.rejected,
        };
        report.log_fwhm_table();
        Ok(report)
    }
}

/// Round a fitted position to the nearest focuser tick
fn to_ticks(position: f64) -> Result<i64, FocusError> {
    let rounded = position.round();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Ok(rounded as i64)
    } else {
        Err(FocusError::UnrepresentablePosition(position))
    }
}
