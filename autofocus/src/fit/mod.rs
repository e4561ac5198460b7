//! Fitting FWHM-vs-offset curves and locating best focus.
//!
//! Every model is fitted in the normalized coordinate of [`OffsetScale`] so the
//! quartic's design matrix stays well conditioned for offsets in the
//! thousands of ticks. [`FitResult`] converts back to offsets.

mod model;

pub use model::{FitModel, ModelKind, OffsetScale};

use meter_math::{
    fit_polynomial, levenberg_marquardt, LeastSquaresError, LmOptions, MinimizeError,
    NelderMeadOptions,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::sample::FocusSeries;
use model::PolynomialResidual;

/// Reasons a series cannot be fitted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("{model} fit needs at least {required} samples, got {got}")]
    InsufficientSamples {
        model: ModelKind,
        required: usize,
        got: usize,
    },

    #[error("{model} fit is degenerate: {reason}")]
    Degenerate { model: ModelKind, reason: String },

    #[error("{model} least-squares fit failed: {source}")]
    LeastSquares {
        model: ModelKind,
        #[source]
        source: LeastSquaresError,
    },

    #[error("{model} optimum search failed: {source}")]
    Minimize {
        model: ModelKind,
        #[source]
        source: MinimizeError,
    },

    #[error("{model} optimum is not finite")]
    NonFiniteOptimum { model: ModelKind },
}

impl FitError {
    pub fn model(&self) -> ModelKind {
        match self {
            FitError::InsufficientSamples { model, .. }
            | FitError::Degenerate { model, .. }
            | FitError::LeastSquares { model, .. }
            | FitError::Minimize { model, .. }
            | FitError::NonFiniteOptimum { model } => *model,
        }
    }

    /// True when the series was too short, rather than the numerics failing
    pub fn is_insufficient(&self) -> bool {
        matches!(self, FitError::InsufficientSamples { .. })
    }
}

/// A fitted focus curve and its best-focus offset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: FitModel,
    /// Map from offsets to the coordinate `model` was fitted in
    pub scale: OffsetScale,
    /// Best-focus offset (ticks, not rounded)
    pub optimum: f64,
    pub sample_count: usize,
    /// Root-mean-square FWHM residual (pixels)
    pub rms_residual: f64,
}

impl FitResult {
    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Fitted FWHM at a focuser offset
    pub fn evaluate(&self, offset: f64) -> f64 {
        self.model.evaluate(self.scale.to_normalized(offset))
    }

    /// Coefficients in the normalized coordinate, lowest order first
    pub fn parameters(&self) -> Vec<f64> {
        self.model.parameters()
    }
}

/// Solver tuning shared by every fit
#[derive(Debug, Clone, Default)]
pub struct FitOptions {
    pub lm: LmOptions,
    pub nelder_mead: NelderMeadOptions,
}

/// Fits focus series against a fixed target FWHM
#[derive(Debug, Clone)]
pub struct CurveFitter {
    target_fwhm: f64,
    options: FitOptions,
}

impl CurveFitter {
    pub fn new(target_fwhm: f64) -> Self {
        Self::with_options(target_fwhm, FitOptions::default())
    }

    pub fn with_options(target_fwhm: f64, options: FitOptions) -> Self {
        Self {
            target_fwhm,
            options,
        }
    }

    pub fn target_fwhm(&self) -> f64 {
        self.target_fwhm
    }

    /// Fit `series` with `kind` and locate its optimum.
    ///
    /// The linear model is solved directly and its optimum is the offset where
    /// it crosses the target FWHM. Quadratic and quartic models are fitted
    /// with Levenberg–Marquardt from all-ones parameters and minimized
    /// starting at the sample with the lowest FWHM.
    ///
    /// # Errors
    /// * `FitError::InsufficientSamples` - Fewer than `kind.min_samples()` samples
    /// * `FitError::LeastSquares` - The solver failed or did not converge
    /// * `FitError::Degenerate` - Zero linear slope or non-finite parameters
    /// * `FitError::NonFiniteOptimum` - The optimum search diverged to infinity
    pub fn fit(&self, series: &FocusSeries, kind: ModelKind) -> Result<FitResult, FitError> {
        let required = kind.min_samples();
        if series.len() < required {
            return Err(FitError::InsufficientSamples {
                model: kind,
                required,
                got: series.len(),
            });
        }

        let offsets = series.offsets();
        let fwhms = series.fwhms();
        let scale = OffsetScale::from_offsets(&offsets);
        let us: Vec<f64> = offsets.iter().map(|&x| scale.to_normalized(x)).collect();

        let least_squares = |source| FitError::LeastSquares {
            model: kind,
            source,
        };
        let params = match kind {
            ModelKind::Linear => {
                fit_polynomial(&us, &fwhms, kind.parameter_count()).map_err(least_squares)?
            }
            ModelKind::Quadratic | ModelKind::Quartic => {
                let fit = levenberg_marquardt(
                    &PolynomialResidual::new(kind),
                    &us,
                    &fwhms,
                    &kind.initial_guess(),
                    &self.options.lm,
                )
                .map_err(least_squares)?;
                fit.params
            }
        };
        let model = FitModel::from_parameters(kind, &params)?;

        let seed = series
            .best_sample()
            .map(|s| scale.to_normalized(s.offset as f64))
            .unwrap_or(0.0);
        let u = model.locate_optimum(seed, self.target_fwhm, &self.options.nelder_mead)?;
        let optimum = scale.to_offset(u);
        if !optimum.is_finite() {
            return Err(FitError::NonFiniteOptimum { model: kind });
        }

        let rms_residual = (us
            .iter()
            .zip(&fwhms)
            .map(|(&u, &y)| (model.evaluate(u) - y).powi(2))
            .sum::<f64>()
            / us.len() as f64)
            .sqrt();

        info!(
            "{} fit over {} samples: optimum {:.2}, rms residual {:.4}",
            kind,
            series.len(),
            optimum,
            rms_residual
        );

        Ok(FitResult {
            model,
            scale,
            optimum,
            sample_count: series.len(),
            rms_residual,
        })
    }
}
