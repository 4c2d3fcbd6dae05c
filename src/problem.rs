//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem to be solved with the Levenberg-Marquardt algorithm.

use crate::error::Result;
use ndarray::{Array1, Array2};

/// A trait representing a nonlinear least squares problem.
///
/// The optimizer minimizes `Σ rᵢ(p)²` over the parameter vector `p`.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// `residuals` are the residuals already computed at `params`; `step` is
    /// the relative finite-difference step. The default implementation uses
    /// forward differences and costs one residual evaluation per parameter.
    fn jacobian(
        &self,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
        step: Option<f64>,
    ) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, Some(residuals), step)
    }

    /// Whether `jacobian` is analytic rather than built from residual calls.
    ///
    /// The optimizer uses this to count function evaluations.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}
