//! Focus-curve models and the normalized coordinate they are fitted in.

use std::fmt;

use meter_math::{nelder_mead_1d, polynomial, NelderMeadOptions, ResidualModel};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::FitError;

/// Linear slopes (FWHM per half scan span) this small relative to the
/// intercept are treated as flat.
const FLAT_SLOPE_TOLERANCE: f64 = 1e-12;

/// Shape of the FWHM-vs-offset curve to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// `a + b·u`, solved for a target FWHM
    Linear,
    /// `a + b·u + c·u²`
    #[default]
    Quadratic,
    /// `a + b·u + c·u² + d·u³ + e·u⁴`
    Quartic,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Linear, ModelKind::Quadratic, ModelKind::Quartic];

    pub fn parameter_count(self) -> usize {
        match self {
            ModelKind::Linear => 2,
            ModelKind::Quadratic => 3,
            ModelKind::Quartic => 5,
        }
    }

    /// Fewest samples a fit of this kind accepts
    pub fn min_samples(self) -> usize {
        self.parameter_count() + 1
    }

    /// Starting parameters for the nonlinear solver
    pub fn initial_guess(self) -> Vec<f64> {
        vec![1.0; self.parameter_count()]
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Quadratic => "quadratic",
            ModelKind::Quartic => "quartic",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Affine map between focuser offsets and the fitting coordinate `u`.
///
/// `u = (offset - center) / scale`, with `center` the mean sampled offset and
/// `scale` half the sampled span (1 when every sample sits at one offset).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetScale {
    pub center: f64,
    pub scale: f64,
}

impl OffsetScale {
    pub const IDENTITY: OffsetScale = OffsetScale {
        center: 0.0,
        scale: 1.0,
    };

    pub fn from_offsets(offsets: &[f64]) -> Self {
        if offsets.is_empty() {
            return Self::IDENTITY;
        }
        let center = offsets.iter().sum::<f64>() / offsets.len() as f64;
        let (min, max) = offsets
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let half_span = (max - min) / 2.0;
        let scale = if half_span > 0.0 { half_span } else { 1.0 };
        Self { center, scale }
    }

    pub fn to_normalized(&self, offset: f64) -> f64 {
        (offset - self.center) / self.scale
    }

    pub fn to_offset(&self, u: f64) -> f64 {
        self.center + u * self.scale
    }
}

/// Polynomial in `u` for the nonlinear solver
#[derive(Debug, Clone, Copy)]
pub(crate) struct PolynomialResidual {
    terms: usize,
}

impl PolynomialResidual {
    pub(crate) fn new(kind: ModelKind) -> Self {
        Self {
            terms: kind.parameter_count(),
        }
    }
}

impl ResidualModel for PolynomialResidual {
    fn parameter_count(&self) -> usize {
        self.terms
    }

    fn value(&self, params: &[f64], x: f64) -> f64 {
        polynomial::evaluate(params, x)
    }

    fn gradient(&self, _params: &[f64], x: f64, out: &mut [f64]) {
        polynomial::basis_terms(x, out);
    }
}

/// A fitted curve in the normalized coordinate.
///
/// Coefficients are lowest order first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FitModel {
    Linear { intercept: f64, slope: f64 },
    Quadratic { coefficients: [f64; 3] },
    Quartic { coefficients: [f64; 5] },
}

impl FitModel {
    /// Build a model of `kind` from a solver's parameter vector
    pub fn from_parameters(kind: ModelKind, params: &[f64]) -> Result<Self, FitError> {
        let mismatch = || FitError::Degenerate {
            model: kind,
            reason: format!(
                "expected {} parameters, solver returned {}",
                kind.parameter_count(),
                params.len()
            ),
        };
        let model = match kind {
            ModelKind::Linear => match params {
                &[intercept, slope] => FitModel::Linear { intercept, slope },
                _ => return Err(mismatch()),
            },
            ModelKind::Quadratic => FitModel::Quadratic {
                coefficients: params.try_into().map_err(|_| mismatch())?,
            },
            ModelKind::Quartic => FitModel::Quartic {
                coefficients: params.try_into().map_err(|_| mismatch())?,
            },
        };
        if model.parameters().iter().any(|p| !p.is_finite()) {
            return Err(FitError::Degenerate {
                model: kind,
                reason: "solver returned non-finite parameters".to_string(),
            });
        }
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            FitModel::Linear { .. } => ModelKind::Linear,
            FitModel::Quadratic { .. } => ModelKind::Quadratic,
            FitModel::Quartic { .. } => ModelKind::Quartic,
        }
    }

    pub fn parameters(&self) -> Vec<f64> {
        match self {
            FitModel::Linear { intercept, slope } => vec![*intercept, *slope],
            FitModel::Quadratic { coefficients } => coefficients.to_vec(),
            FitModel::Quartic { coefficients } => coefficients.to_vec(),
        }
    }

    /// Model FWHM at normalized coordinate `u`
    pub fn evaluate(&self, u: f64) -> f64 {
        match self {
            FitModel::Linear { intercept, slope } => intercept + slope * u,
            FitModel::Quadratic { coefficients } => polynomial::evaluate(coefficients, u),
            FitModel::Quartic { coefficients } => polynomial::evaluate(coefficients, u),
        }
    }

    /// Best-focus coordinate in `u`.
    ///
    /// Linear models solve `evaluate(u) == target`. Polynomial models are
    /// minimized starting from `seed`. A minimizer that runs out of iterations
    /// still yields its best point.
    pub fn locate_optimum(
        &self,
        seed: f64,
        target: f64,
        options: &NelderMeadOptions,
    ) -> Result<f64, FitError> {
        let kind = self.kind();
        let u = match *self {
            FitModel::Linear { intercept, slope } => {
                if slope.abs() <= FLAT_SLOPE_TOLERANCE * (intercept.abs() + 1.0) {
                    return Err(FitError::Degenerate {
                        model: kind,
                        reason: format!("slope {slope:e} is zero"),
                    });
                }
                (target - intercept) / slope
            }
            FitModel::Quadratic { .. } | FitModel::Quartic { .. } => {
                let minimum = nelder_mead_1d(|u| self.evaluate(u), seed, options)
                    .map_err(|source| FitError::Minimize {
                        model: kind,
                        source,
                    })?;
                if !minimum.converged {
                    warn!(
                        "{} minimization stopped after {} iterations at u = {:e}",
                        kind, minimum.iterations, minimum.x
                    );
                }
                minimum.x
            }
        };

        if !u.is_finite() {
            return Err(FitError::NonFiniteOptimum { model: kind });
        }
        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_counts() {
        assert_eq!(ModelKind::Linear.min_samples(), 3);
        assert_eq!(ModelKind::Quadratic.min_samples(), 4);
        assert_eq!(ModelKind::Quartic.min_samples(), 6);
        assert_eq!(ModelKind::Quartic.initial_guess(), vec![1.0; 5]);
    }

    #[test]
    fn test_model_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ModelKind::Quartic).unwrap(),
            "\"quartic\""
        );
        let kind: ModelKind = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(kind, ModelKind::Linear);
    }

    #[test]
    fn test_offset_scale() {
        let scale = OffsetScale::from_offsets(&[-40.0, -20.0, 0.0, 20.0, 40.0]);
        assert_relative_eq!(scale.center, 0.0);
        assert_relative_eq!(scale.scale, 40.0);
        assert_relative_eq!(scale.to_normalized(20.0), 0.5);
        assert_relative_eq!(scale.to_offset(scale.to_normalized(-13.0)), -13.0);

        let flat = OffsetScale::from_offsets(&[7.0, 7.0]);
        assert_relative_eq!(flat.center, 7.0);
        assert_relative_eq!(flat.scale, 1.0);
    }

    #[test]
    fn test_quartic_uses_all_coefficients() {
        let model = FitModel::Quartic {
            coefficients: [1.0, 0.0, 0.0, 0.0, 2.0],
        };
        assert_relative_eq!(model.evaluate(2.0), 33.0);
    }

    #[test]
    fn test_from_parameters_length_mismatch() {
        let err = FitModel::from_parameters(ModelKind::Quadratic, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, FitError::Degenerate { .. }));
    }

    #[test]
    fn test_linear_root() {
        let model = FitModel::Linear {
            intercept: 1.0,
            slope: 2.0,
        };
        let u = model
            .locate_optimum(0.0, 5.0, &NelderMeadOptions::default())
            .unwrap();
        assert_relative_eq!(u, 2.0);
    }

    #[test]
    fn test_flat_linear_is_degenerate() {
        let model = FitModel::Linear {
            intercept: 3.0,
            slope: 0.0,
        };
        assert!(matches!(
            model.locate_optimum(0.0, 3.5, &NelderMeadOptions::default()),
            Err(FitError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_quadratic_minimum() {
        // 2 + (u - 0.3)^2
        let model = FitModel::Quadratic {
            coefficients: [2.09, -0.6, 1.0],
        };
        let u = model
            .locate_optimum(-0.5, 0.0, &NelderMeadOptions::default())
            .unwrap();
        assert_relative_eq!(u, 0.3, epsilon = 1e-6);
    }
}
