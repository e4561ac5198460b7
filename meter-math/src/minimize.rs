//! Derivative-free minimization of scalar functions of one variable.

use thiserror::Error;

/// Errors that can occur when starting a minimization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MinimizeError {
    #[error("Objective is not finite at the starting point {0}")]
    NonFiniteStart(f64),

    #[error("Initial simplex step must be positive and finite, got {0}")]
    InvalidStep(f64),
}

/// Tuning for [`nelder_mead_1d`]
#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    /// Distance from the start point to the second simplex vertex
    pub initial_step: f64,
    /// Converged once the simplex is narrower than this...
    pub x_tolerance: f64,
    /// ...and its vertex values differ by less than this
    pub f_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            initial_step: 0.05,
            x_tolerance: 1e-9,
            f_tolerance: 1e-12,
            max_iterations: 200,
        }
    }
}

/// Outcome of a minimization.
///
/// `converged` is false when the iteration budget ran out; `x` is then the
/// best vertex seen, which may be far from any true minimum if the objective
/// is unbounded below.
#[derive(Debug, Clone, Copy)]
pub struct Minimum {
    pub x: f64,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Clone, Copy)]
struct Vertex {
    x: f64,
    f: f64,
}

fn probe<F: Fn(f64) -> f64>(f: &F, x: f64) -> Vertex {
    let value = f(x);
    // NaN would poison every comparison below
    let f = if value.is_nan() { f64::INFINITY } else { value };
    Vertex { x, f }
}

/// Minimize `f` starting from `x0` with a two-vertex Nelder–Mead simplex.
///
/// Uses the standard coefficients (reflection 1, expansion 2, contraction ½,
/// shrink ½). The simplex keeps expanding along a descending direction, so an
/// objective with no minimum drifts outward until the budget is exhausted.
///
/// # Errors
/// * `MinimizeError::InvalidStep` - If `initial_step` is not positive and finite
/// * `MinimizeError::NonFiniteStart` - If `f(x0)` is not finite
pub fn nelder_mead_1d<F: Fn(f64) -> f64>(
    f: F,
    x0: f64,
    options: &NelderMeadOptions,
) -> Result<Minimum, MinimizeError> {
    if !(options.initial_step > 0.0 && options.initial_step.is_finite()) {
        return Err(MinimizeError::InvalidStep(options.initial_step));
    }

    let start = probe(&f, x0);
    if !start.f.is_finite() {
        return Err(MinimizeError::NonFiniteStart(x0));
    }

    let mut best = start;
    let mut worst = probe(&f, x0 + options.initial_step);

    for iteration in 0..options.max_iterations {
        if worst.f < best.f {
            std::mem::swap(&mut best, &mut worst);
        }

        if (worst.x - best.x).abs() <= options.x_tolerance
            && (worst.f - best.f).abs() <= options.f_tolerance
        {
            return Ok(Minimum {
                x: best.x,
                value: best.f,
                iterations: iteration,
                converged: true,
            });
        }

        // With two vertices the centroid of all but the worst is the best vertex
        let centroid = best.x;
        let reflected = probe(&f, centroid + (centroid - worst.x));

        if reflected.f < best.f {
            let expanded = probe(&f, centroid + 2.0 * (centroid - worst.x));
            worst = if expanded.f < reflected.f {
                expanded
            } else {
                reflected
            };
            continue;
        }

        let (contracted, accept) = if reflected.f < worst.f {
            let outside = probe(&f, centroid + 0.5 * (reflected.x - centroid));
            (outside, outside.f <= reflected.f)
        } else {
            let inside = probe(&f, centroid + 0.5 * (worst.x - centroid));
            (inside, inside.f < worst.f)
        };

        worst = if accept {
            contracted
        } else {
            probe(&f, best.x + 0.5 * (worst.x - best.x))
        };
    }

    if worst.f < best.f {
        best = worst;
    }
    Ok(Minimum {
        x: best.x,
        value: best.f,
        iterations: options.max_iterations,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parabola_minimum() {
        let min = nelder_mead_1d(
            |x| (x - 1.3) * (x - 1.3) + 2.0,
            0.0,
            &NelderMeadOptions::default(),
        )
        .unwrap();

        assert!(min.converged);
        assert_relative_eq!(min.x, 1.3, epsilon = 1e-6);
        assert_relative_eq!(min.value, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_start_at_minimum() {
        let min = nelder_mead_1d(|x| x * x, 0.0, &NelderMeadOptions::default()).unwrap();
        assert!(min.converged);
        assert!(min.x.abs() < 1e-6);
    }

    #[test]
    fn test_seed_selects_local_minimum() {
        // Double well with minima near ±1; start close to each
        let f = |x: f64| (x * x - 1.0).powi(2) + 0.1 * x;
        let left = nelder_mead_1d(f, -0.9, &NelderMeadOptions::default()).unwrap();
        let right = nelder_mead_1d(f, 0.9, &NelderMeadOptions::default()).unwrap();

        assert!(left.x < -0.9 && left.x > -1.1, "left well: {}", left.x);
        assert!(right.x > 0.9 && right.x < 1.1, "right well: {}", right.x);
    }

    #[test]
    fn test_unbounded_objective_drifts() {
        let min = nelder_mead_1d(|x| 5.0 - 2.0 * x, 2.0, &NelderMeadOptions::default()).unwrap();
        assert!(!min.converged);
        assert!(min.x > 1e6, "expected drift toward +inf, got {}", min.x);
        assert!(min.x.is_finite());
    }

    #[test]
    fn test_non_finite_start() {
        let result = nelder_mead_1d(|x| 1.0 / x, 0.0, &NelderMeadOptions::default());
        assert!(matches!(result, Err(MinimizeError::NonFiniteStart(_))));
    }

    #[test]
    fn test_invalid_step() {
        let options = NelderMeadOptions {
            initial_step: 0.0,
            ..Default::default()
        };
        let result = nelder_mead_1d(|x| x * x, 1.0, &options);
        assert!(matches!(result, Err(MinimizeError::InvalidStep(_))));
    }
}
