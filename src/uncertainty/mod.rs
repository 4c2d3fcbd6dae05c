//! # Uncertainty Calculation
//!
//! Fit statistics and parameter uncertainties from the Jacobian at the
//! solution, following lmfit:
//!
//! - reduced chi-square, Akaike and Bayesian information criteria
//! - covariance and correlation matrices in external parameter space
//! - standard errors for varying parameters
//! - first-order propagated errors for expression parameters

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, propagate_error, standard_errors_from_covariance,
    to_external_covariance,
};

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::parameters::Parameters;
use crate::utils::finite_difference;

/// Structure to hold uncertainty calculation results.
#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    /// Names of the varying parameters, in matrix order
    pub var_names: Vec<String>,
    /// Covariance matrix for the varying parameters (external space)
    pub covariance: Array2<f64>,
    /// Correlation matrix derived from covariance
    pub correlation: Array2<f64>,
    /// Standard errors of the varying parameters
    pub standard_errors: Array1<f64>,
}

/// Calculator for fit statistics and parameter uncertainties.
#[derive(Debug, Clone)]
pub struct UncertaintyCalculator {
    /// Number of residuals
    pub ndata: usize,
    /// Number of varying parameters
    pub nvarys: usize,
    /// Degrees of freedom (ndata - nvarys, at least 1)
    pub nfree: usize,
    /// Chi-square value at minimum
    pub chisqr: f64,
    /// Reduced chi-square (chisqr / nfree)
    pub redchi: f64,
}

impl UncertaintyCalculator {
    pub fn new(ndata: usize, nvarys: usize, chisqr: f64) -> Self {
        let nfree = ndata.saturating_sub(nvarys).max(1);
        Self {
            ndata,
            nvarys,
            nfree,
            chisqr,
            redchi: chisqr / nfree as f64,
        }
    }

    /// `-2 ln L` up to a constant, floored so a perfect fit stays finite
    fn neg2_log_likelihood(&self) -> f64 {
        let n = self.ndata as f64;
        n * (self.chisqr.max(1e-250) / n).ln()
    }

    /// Akaike information criterion
    pub fn aic(&self) -> f64 {
        self.neg2_log_likelihood() + 2.0 * self.nvarys as f64
    }

    /// Bayesian information criterion
    pub fn bic(&self) -> f64 {
        self.neg2_log_likelihood() + (self.ndata as f64).ln() * self.nvarys as f64
    }

    /// Covariance in internal coordinates from the internal-space Jacobian,
    /// mapped to external coordinates through the bounds transforms.
    pub fn analyze(&self, jacobian: &Array2<f64>, params: &Parameters) -> Result<UncertaintyResult> {
        let varying = params.varying();
        let internal = calculate_covariance(jacobian, self.redchi)?;

        let scale = varying
            .iter()
            .map(|p| p.scale_gradient(1.0))
            .collect::<std::result::Result<Vec<f64>, _>>()?;
        let covariance = to_external_covariance(&internal, &Array1::from_vec(scale));

        Ok(UncertaintyResult {
            var_names: varying.iter().map(|p| p.name().to_string()).collect(),
            correlation: calculate_correlation(&covariance),
            standard_errors: standard_errors_from_covariance(&covariance),
            covariance,
        })
    }
}

/// Store standard errors on the parameters: taken from the covariance
/// diagonal for varying parameters, propagated through the expression for
/// expression parameters.
pub fn apply_standard_errors(params: &mut Parameters, result: &UncertaintyResult) -> Result<()> {
    for (name, &stderr) in result.var_names.iter().zip(result.standard_errors.iter()) {
        if let Some(param) = params.get_mut(name) {
            param.set_stderr(Some(stderr));
        }
    }

    let expr_names: Vec<String> = params
        .iter()
        .filter(|(_, p)| p.expr().is_some())
        .map(|(name, _)| name.clone())
        .collect();

    let values = Array1::from_iter(
        result
            .var_names
            .iter()
            .map(|name| params.stored_value(name))
            .collect::<std::result::Result<Vec<f64>, _>>()?,
    );

    for name in expr_names {
        let gradient = finite_difference::gradient(
            |shifted: &Array1<f64>| {
                let mut trial = params.clone();
                for (var, &value) in result.var_names.iter().zip(shifted.iter()) {
                    if let Some(param) = trial.get_mut(var) {
                        param.set_value_clamped(value);
                    }
                }
                Ok(trial.value(&name)?)
            },
            &values,
            None,
        )?;

        let stderr = propagate_error(&gradient, &result.covariance);
        if let Some(param) = params.get_mut(&name) {
            param.set_stderr(Some(stderr));
        }
    }

    Ok(())
}
