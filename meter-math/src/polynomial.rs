//! Power-basis polynomials.
//!
//! Coefficients are stored lowest order first, so `[c0, c1, c2]` is
//! `c0 + c1 * x + c2 * x²`.

use nalgebra::DMatrix;

/// Evaluate a power-basis polynomial at `x` using Horner's scheme.
///
/// An empty coefficient slice evaluates to zero.
pub fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Fill `out` with the basis terms `[1, x, x², ...]`.
///
/// These are also the partial derivatives of the polynomial value with
/// respect to each coefficient.
pub fn basis_terms(x: f64, out: &mut [f64]) {
    let mut term = 1.0;
    for slot in out.iter_mut() {
        *slot = term;
        term *= x;
    }
}

/// Build the Vandermonde design matrix with `terms` columns for the given abscissae.
pub fn vandermonde(xs: &[f64], terms: usize) -> DMatrix<f64> {
    let mut row = vec![0.0; terms];
    let mut data = Vec::with_capacity(xs.len() * terms);
    for &x in xs {
        basis_terms(x, &mut row);
        data.extend_from_slice(&row);
    }
    DMatrix::from_row_slice(xs.len(), terms, &data)
}
