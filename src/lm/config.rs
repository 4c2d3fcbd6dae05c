//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! Tolerances follow MINPACK/lmfit naming. The struct is serde-enabled so it
//! can be embedded in experiment configuration files, which is why
//! [`LmConfig::validate`] runs before every minimization.

use serde::{Deserialize, Serialize};

use crate::error::{MultiExpError, Result};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of accepted steps. Default: 200
    pub max_iterations: usize,

    /// Maximum number of residual evaluations, Jacobian columns included.
    /// Default: `2000 * (n_params + 1)`, see [`LmConfig::evaluation_limit`]
    pub max_nfev: Option<usize>,

    /// Tolerance for relative change in the sum of squares. Default: 1e-8
    pub ftol: f64,

    /// Tolerance for relative change in parameter values. Default: 1e-8
    pub xtol: f64,

    /// Tolerance for the gradient norm. Default: 1e-10
    pub gtol: f64,

    /// Assumed relative error of the residual function. The forward
    /// difference step is `sqrt(max(epsfcn, f64::EPSILON))` relative to
    /// each parameter. Default: `f64::EPSILON`
    pub epsfcn: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e12
    pub max_lambda: f64,

    /// Whether to calculate and return the Jacobian at the solution. Default: true
    pub calc_jacobian: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            max_nfev: None,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-10,
            epsfcn: f64::EPSILON,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            calc_jacobian: true,
        }
    }
}

impl LmConfig {
    /// Residual evaluation budget for a problem with `n_params` varying
    /// parameters. Without an explicit `max_nfev` this is lmfit's
    /// `2000 * (n_params + 1)`.
    pub fn evaluation_limit(&self, n_params: usize) -> usize {
        self.max_nfev
            .unwrap_or_else(|| n_params.saturating_add(1).saturating_mul(2000))
    }

    /// Check that the damping schedule can terminate and the tolerances make
    /// sense.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::lm::LmConfig;
    ///
    /// assert!(LmConfig::default().validate().is_ok());
    /// assert!(LmConfig::default().with_lambda_factors(1.0, 0.1).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(MultiExpError::InvalidInput(message));

        for (name, value) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(value >= 0.0) {
                return invalid(format!("{} must be non-negative, got {}", name, value));
            }
        }
        if !(self.epsfcn >= 0.0 && self.epsfcn.is_finite()) {
            return invalid(format!(
                "epsfcn must be finite and non-negative, got {}",
                self.epsfcn
            ));
        }
        if !(self.lambda_up_factor > 1.0 && self.lambda_up_factor.is_finite()) {
            return invalid(format!(
                "lambda_up_factor must be finite and greater than 1, got {}",
                self.lambda_up_factor
            ));
        }
        if !(self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0) {
            return invalid(format!(
                "lambda_down_factor must lie in (0, 1), got {}",
                self.lambda_down_factor
            ));
        }
        if !(self.min_lambda > 0.0
            && self.min_lambda <= self.initial_lambda
            && self.initial_lambda <= self.max_lambda
            && self.max_lambda.is_finite())
        {
            return invalid(format!(
                "lambda limits must satisfy 0 < min_lambda ({}) <= initial_lambda ({}) <= max_lambda ({}) < inf",
                self.min_lambda, self.initial_lambda, self.max_lambda
            ));
        }
        Ok(())
    }

    /// Relative forward-difference step derived from `epsfcn`
    pub fn diff_step(&self) -> f64 {
        self.epsfcn.max(f64::EPSILON).sqrt()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_nfev(mut self, max_nfev: Option<usize>) -> Self {
        self.max_nfev = max_nfev;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn with_epsfcn(mut self, epsfcn: f64) -> Self {
        self.epsfcn = epsfcn;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    pub fn with_lambda_factors(mut self, up: f64, down: f64) -> Self {
        self.lambda_up_factor = up;
        self.lambda_down_factor = down;
        self
    }

    pub fn with_lambda_limits(mut self, min_lambda: f64, max_lambda: f64) -> Self {
        self.min_lambda = min_lambda;
        self.max_lambda = max_lambda;
        self
    }

    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.calc_jacobian = calc_jacobian;
        self
    }
}
