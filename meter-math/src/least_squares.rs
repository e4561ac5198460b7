//! Least-squares solvers.
//!
//! [`solve_linear`] handles models that are linear in their parameters with a
//! single SVD solve. [`levenberg_marquardt`] iterates damped Gauss-Newton steps
//! for any [`ResidualModel`], starting from a caller-supplied guess.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::polynomial;

/// Singular values below this are treated as zero by the SVD solve.
const SVD_EPSILON: f64 = 1e-10;

/// Damping above this means no downhill step exists at the current parameters.
const MAX_LAMBDA: f64 = 1e16;

const MIN_LAMBDA: f64 = 1e-15;

/// Errors that can occur while solving a least-squares problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeastSquaresError {
    #[error("Invalid argument: {0}")]
    ArgumentError(String),

    #[error("Underdetermined system: {observations} observations for {parameters} parameters")]
    Underdetermined {
        observations: usize,
        parameters: usize,
    },

    #[error("SVD solve failed: {0}")]
    SvdFailed(String),

    #[error("Did not converge within {iterations} iterations (cost {cost:e})")]
    NotConverged { iterations: usize, cost: f64 },

    #[error("Non-finite value encountered during the solve")]
    NonFinite,
}

/// Solve `design * params ≈ observations` in the least-squares sense using SVD.
///
/// # Arguments
/// * `design` - Design matrix with one row per observation
/// * `observations` - Observed values, one per design row
///
/// # Errors
/// * `LeastSquaresError::ArgumentError` - If row counts differ
/// * `LeastSquaresError::Underdetermined` - If there are fewer rows than columns
/// * `LeastSquaresError::SvdFailed` - If the SVD solve fails
/// * `LeastSquaresError::NonFinite` - If the solution contains NaN or infinity
pub fn solve_linear(
    design: &DMatrix<f64>,
    observations: &DVector<f64>,
) -> Result<DVector<f64>, LeastSquaresError> {
    if design.nrows() != observations.len() {
        return Err(LeastSquaresError::ArgumentError(format!(
            "design has {} rows but {} observations were given",
            design.nrows(),
            observations.len()
        )));
    }
    if design.nrows() < design.ncols() {
        return Err(LeastSquaresError::Underdetermined {
            observations: design.nrows(),
            parameters: design.ncols(),
        });
    }

    let svd = design.clone().svd(true, true);
    let params = svd
        .solve(observations, SVD_EPSILON)
        .map_err(|e| LeastSquaresError::SvdFailed(e.to_string()))?;

    if params.iter().any(|p| !p.is_finite()) {
        return Err(LeastSquaresError::NonFinite);
    }
    Ok(params)
}

/// Fit a power-basis polynomial with `terms` coefficients (lowest order first).
pub fn fit_polynomial(
    xs: &[f64],
    ys: &[f64],
    terms: usize,
) -> Result<Vec<f64>, LeastSquaresError> {
    let design = polynomial::vandermonde(xs, terms);
    let params = solve_linear(&design, &DVector::from_column_slice(ys))?;
    Ok(params.as_slice().to_vec())
}

/// A scalar model `y = f(params, x)` with an analytic gradient.
pub trait ResidualModel {
    /// Number of free parameters
    fn parameter_count(&self) -> usize;

    /// Model value at `x`
    fn value(&self, params: &[f64], x: f64) -> f64;

    /// Partial derivatives of [`value`](Self::value) with respect to each parameter
    fn gradient(&self, params: &[f64], x: f64, out: &mut [f64]);
}

/// Tuning for [`levenberg_marquardt`]
#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative cost reduction below which the fit is considered converged
    pub cost_tolerance: f64,
    /// Relative step size below which the fit is considered converged
    pub step_tolerance: f64,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

/// Result of a Levenberg–Marquardt fit
#[derive(Debug, Clone)]
pub struct LmFit {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`
    pub cost: f64,
    pub iterations: usize,
}

fn sum_squared_residuals<M: ResidualModel>(
    model: &M,
    params: &[f64],
    xs: &[f64],
    ys: &[f64],
) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = model.value(params, x) - y;
            r * r
        })
        .sum()
}

/// Fit `model` to `(xs, ys)` by Levenberg–Marquardt, starting at `initial`.
///
/// Each iteration solves `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` and accepts the step
/// only if it lowers the sum of squared residuals. Damping shrinks after an
/// accepted step and grows after a rejected one.
///
/// Convergence is declared when an accepted step reduces the cost by less than
/// `cost_tolerance` relative to the previous cost, when the step is smaller than
/// `step_tolerance` relative to the parameter norm, or when the damping grows so
/// large that no downhill step exists.
///
/// # Errors
/// * `LeastSquaresError::ArgumentError` - If lengths disagree with each other or the model
/// * `LeastSquaresError::Underdetermined` - If there are fewer points than parameters
/// * `LeastSquaresError::NonFinite` - If the cost at `initial` is not finite
/// * `LeastSquaresError::NotConverged` - If `max_iterations` is exhausted
pub fn levenberg_marquardt<M: ResidualModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    initial: &[f64],
    options: &LmOptions,
) -> Result<LmFit, LeastSquaresError> {
    let n = model.parameter_count();
    let m = xs.len();

    if ys.len() != m {
        return Err(LeastSquaresError::ArgumentError(format!(
            "{m} abscissae but {} ordinates",
            ys.len()
        )));
    }
    if initial.len() != n {
        return Err(LeastSquaresError::ArgumentError(format!(
            "model has {n} parameters but initial guess has {}",
            initial.len()
        )));
    }
    if m < n {
        return Err(LeastSquaresError::Underdetermined {
            observations: m,
            parameters: n,
        });
    }

    let mut params = DVector::from_column_slice(initial);
    let mut cost = sum_squared_residuals(model, params.as_slice(), xs, ys);
    if !cost.is_finite() {
        return Err(LeastSquaresError::NonFinite);
    }

    let mut lambda = options.initial_lambda;
    let mut jacobian = DMatrix::<f64>::zeros(m, n);
    let mut residuals = DVector::<f64>::zeros(m);
    let mut grad_row = vec![0.0; n];

    for iteration in 1..=options.max_iterations {
        if cost == 0.0 {
            return Ok(LmFit {
                params: params.as_slice().to_vec(),
                cost,
                iterations: iteration - 1,
            });
        }

        for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
            residuals[i] = model.value(params.as_slice(), x) - y;
            model.gradient(params.as_slice(), x, &mut grad_row);
            for (j, &g) in grad_row.iter().enumerate() {
                jacobian[(i, j)] = g;
            }
        }

        let jtj = jacobian.tr_mul(&jacobian);
        let neg_gradient = -jacobian.tr_mul(&residuals);

        loop {
            let mut damped = jtj.clone();
            for j in 0..n {
                damped[(j, j)] += lambda * jtj[(j, j)].max(f64::EPSILON);
            }

            let step = damped.cholesky().map(|c| c.solve(&neg_gradient));

            let candidate = step.as_ref().map(|delta| &params + delta);
            let candidate_cost = candidate
                .as_ref()
                .map(|p| sum_squared_residuals(model, p.as_slice(), xs, ys));

            match (step, candidate, candidate_cost) {
                (Some(delta), Some(p), Some(c)) if c.is_finite() && c < cost => {
                    let previous = cost;
                    params = p;
                    cost = c;
                    lambda = (lambda / 10.0).max(MIN_LAMBDA);

                    let small_reduction = previous - cost <= options.cost_tolerance * previous;
                    let small_step = delta.norm()
                        <= options.step_tolerance * (params.norm() + options.step_tolerance);
                    if small_reduction || small_step {
                        return Ok(LmFit {
                            params: params.as_slice().to_vec(),
                            cost,
                            iterations: iteration,
                        });
                    }
                    break;
                }
                _ => {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        return Ok(LmFit {
                            params: params.as_slice().to_vec(),
                            cost,
                            iterations: iteration,
                        });
                    }
                }
            }
        }
    }

    Err(LeastSquaresError::NotConverged {
        iterations: options.max_iterations,
        cost,
    })
}
