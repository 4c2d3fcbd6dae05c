//! # Covariance Matrix Calculations
//!
//! Covariance and correlation matrices from the Jacobian at the solution,
//! as in lmfit: `covar = redchi · (JᵀJ)⁻¹`.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::error::{MultiExpError, Result};

/// Calculate covariance matrix from Jacobian matrix.
///
/// Fails with `LinearAlgebraError` when `JᵀJ` is singular, which happens when
/// a parameter has no influence on the residuals.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let n = jtj.nrows();

    let matrix = DMatrix::from_fn(n, n, |i, j| jtj[[i, j]]);
    let inverse = match matrix.clone().cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => matrix.try_inverse().ok_or_else(|| {
            MultiExpError::LinearAlgebraError("JᵀJ is singular; covariance unavailable".to_string())
        })?,
    };

    let covar = Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)] * redchi);
    if covar.iter().any(|v| !v.is_finite()) {
        return Err(MultiExpError::LinearAlgebraError(
            "Covariance matrix has non-finite entries".to_string(),
        ));
    }

    Ok(covar)
}

/// Map a covariance matrix from internal (bounds-transformed) coordinates to
/// external ones. `scale[i]` is `d external_i / d internal_i` at the solution.
pub fn to_external_covariance(covar: &Array2<f64>, scale: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn(covar.dim(), |(i, j)| covar[[i, j]] * scale[i] * scale[j])
}

/// Calculate correlation matrix from covariance matrix.
///
/// `correl[i, j] = covar[i, j] / sqrt(covar[i, i] · covar[j, j])`, with zero
/// where a variance vanishes.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    Array2::from_shape_fn(covar.dim(), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Extract standard errors from the covariance matrix.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

/// First-order error propagation: `sqrt(gᵀ C g)` for a derived quantity with
/// gradient `g` with respect to the fitted parameters.
pub fn propagate_error(gradient: &Array1<f64>, covar: &Array2<f64>) -> f64 {
    gradient.dot(&covar.dot(gradient)).max(0.0).sqrt()
}
