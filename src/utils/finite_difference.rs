//! Finite difference methods for numerical differentiation.
//!
//! The Jacobian uses forward differences, as MINPACK's `fdjac2` does, so each
//! column costs exactly one residual evaluation. The scalar gradient uses
//! central differences; it only runs once per fit, during error propagation.

use crate::error::{MultiExpError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default relative step size for finite differences.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Step for parameter `value`: relative to its magnitude, absolute near zero.
fn step_for(value: f64, eps: f64) -> f64 {
    if value.abs() > eps {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// `J[i, j] = ∂residual[i]/∂param[j]`. When the residuals at `params` are
/// already known they can be passed in as `base` to save one evaluation.
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    base: Option<&Array1<f64>>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let owned;
    let residuals = match base {
        Some(r) => r,
        None => {
            owned = problem.eval(params)?;
            &owned
        }
    };

    if residuals.len() != n_residuals {
        return Err(MultiExpError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));
    let mut perturbed = params.clone();

    for j in 0..n_params {
        let h = step_for(params[j], eps);
        perturbed[j] = params[j] + h;

        let shifted = problem.eval(&perturbed)?;
        if shifted.len() != n_residuals {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                shifted.len()
            )));
        }

        let mut column = jac.column_mut(j);
        for i in 0..n_residuals {
            column[i] = (shifted[i] - residuals[i]) / h;
        }

        perturbed[j] = params[j];
    }

    Ok(jac)
}

/// Compute the gradient of a scalar function using central finite differences.
pub fn gradient<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let mut grad = Array1::zeros(params.len());
    let mut shifted = params.clone();

    for j in 0..params.len() {
        let h = step_for(params[j], eps);

        shifted[j] = params[j] + h;
        let forward = f(&shifted)?;
        shifted[j] = params[j] - h;
        let backward = f(&shifted)?;
        shifted[j] = params[j];

        grad[j] = (forward - backward) / (2.0 * h);
    }

    Ok(grad)
}
