//! Numerical kernels used by the focus workspace.
//!
//! - [`polynomial`]: power-basis evaluation and design matrices
//! - [`least_squares`]: SVD linear least squares and Levenberg–Marquardt
//! - [`minimize`]: derivative-free 1-D minimization

pub mod least_squares;
pub mod minimize;
pub mod polynomial;

pub use least_squares::{
    fit_polynomial, levenberg_marquardt, solve_linear, LeastSquaresError, LmFit, LmOptions,
    ResidualModel,
};
pub use minimize::{nelder_mead_1d, MinimizeError, Minimum, NelderMeadOptions};
