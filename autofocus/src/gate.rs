//! Plausibility check on fitted optima.
//!
//! A curve whose optimum lands far outside the scanned range was fitted to
//! one arm of the focus curve (or to noise). The gate swaps such results for a
//! linear fit solved against the target FWHM, which at least points towards
//! focus.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::fit::{CurveFitter, FitError, FitResult, ModelKind};
use crate::sample::FocusSeries;

/// Verdict on a single fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Validity {
    Accepted,
    FallbackRequired { distance: f64, threshold: f64 },
}

impl Validity {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validity::Accepted)
    }
}

/// Outcome of gating one pass
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Result to act on
    pub fit: FitResult,
    /// True when `fit` is the linear fallback
    pub fallback: bool,
    /// Primary fit the gate distrusted, if it produced one
    pub rejected: Option<FitResult>,
}

/// Accepts fits whose optimum lies near the sampled offsets
#[derive(Debug, Clone, Copy)]
pub struct ValidityGate {
    threshold: f64,
}

impl ValidityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.fallback_threshold())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Judge `fit` against the mean offset of the series it came from.
    ///
    /// An empty series has no mean, so nothing fitted to it is trusted.
    pub fn validate(&self, fit: &FitResult, series: &FocusSeries) -> Validity {
        let Some(mean) = series.mean_offset() else {
            return Validity::FallbackRequired {
                distance: f64::INFINITY,
                threshold: self.threshold,
            };
        };
        let distance = (fit.optimum - mean).abs();
        if distance >= self.threshold {
            Validity::FallbackRequired {
                distance,
                threshold: self.threshold,
            }
        } else {
            Validity::Accepted
        }
    }

    /// Turn a primary fit attempt into the result to act on.
    ///
    /// Trusted fits pass through. Distrusted fits and fit failures are
    /// replaced by a linear fit of the same series.
    ///
    /// # Errors
    /// Returns the linear fit's [`FitError`] when the fallback fails too.
    pub fn resolve(
        &self,
        fitter: &CurveFitter,
        series: &FocusSeries,
        primary: Result<FitResult, FitError>,
    ) -> Result<Resolution, FitError> {
        let rejected = match primary {
            Ok(fit) => match self.validate(&fit, series) {
                Validity::Accepted => {
                    info!("{} optimum {:.2} accepted", fit.kind(), fit.optimum);
                    return Ok(Resolution {
                        fit,
                        fallback: false,
                        rejected: None,
                    });
                }
                Validity::FallbackRequired {
                    distance,
                    threshold,
                } => {
                    warn!(
                        "{} optimum {:.2} is {:.2} from the scan mean (threshold {:.2}), \
                         falling back to linear fit",
                        fit.kind(),
                        fit.optimum,
                        distance,
                        threshold
                    );
                    Some(fit)
                }
            },
            Err(e) => {
                warn!("{}, falling back to linear fit", e);
                None
            }
        };

        let fit = fitter.fit(series, ModelKind::Linear)?;
        info!(
            "linear fallback reaches fwhm {:.2} at offset {:.2}",
            fitter.target_fwhm(),
            fit.optimum
        );
        Ok(Resolution {
            fit,
            fallback: true,
            rejected,
        })
    }
}
