//! Convergence criteria for the Levenberg-Marquardt iteration.
//!
//! [`ConvergenceCriteria`] turns the tolerances of an [`LmConfig`] into a
//! [`ConvergenceStatus`] after each gradient evaluation and accepted step.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::config::LmConfig;

/// Why the minimizer stopped, or that it has not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// No stopping test has fired yet.
    Running,

    /// Relative parameter change below `xtol`.
    ParameterConvergence,

    /// Relative change of the sum of squares below `ftol`.
    FunctionValueConvergence,

    /// Gradient norm below `gtol`.
    GradientConvergence,

    /// `max_iterations` accepted steps were taken.
    MaxIterationsReached,

    /// The residual budget `max_nfev` is used up.
    MaxFunctionEvaluations,

    /// No acceptable step could be found before the damping hit its ceiling.
    LambdaSaturated,

    /// The gradient is not finite.
    NumericalError,
}

impl ConvergenceStatus {
    /// Any status other than `Running`
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// One of the three tolerance tests fired
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Human-readable message, used as `FitResult::message`
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::Running => "Optimization is still running",
            ConvergenceStatus::ParameterConvergence => "Converged: small parameter change",
            ConvergenceStatus::FunctionValueConvergence => {
                "Converged: small change in the sum of squares"
            }
            ConvergenceStatus::GradientConvergence => "Converged: small gradient",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
            ConvergenceStatus::MaxFunctionEvaluations => {
                "Terminated: maximum function evaluations reached"
            }
            ConvergenceStatus::LambdaSaturated => {
                "Terminated: no downhill step found at maximum damping"
            }
            ConvergenceStatus::NumericalError => "Terminated: numerical error",
        }
        .to_string()
    }
}

/// Stopping tests of the minimizer.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Relative parameter change
    pub xtol: f64,

    /// Relative change of the sum of squares
    pub ftol: f64,

    /// Norm of `Jᵀr`
    pub gtol: f64,

    /// Accepted steps
    pub max_iterations: usize,

    /// Residual evaluations, Jacobian columns included
    pub max_nfev: Option<usize>,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self::from_config(&LmConfig::default())
    }
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
            max_nfev: None,
        }
    }

    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            xtol: config.xtol,
            ftol: config.ftol,
            gtol: config.gtol,
            max_iterations: config.max_iterations,
            max_nfev: config.max_nfev,
        }
    }

    /// Gradient test, made before a step is attempted.
    pub fn check_gradient(&self, gradient_norm: f64) -> ConvergenceStatus {
        if !gradient_norm.is_finite() {
            ConvergenceStatus::NumericalError
        } else if gradient_norm < self.gtol {
            ConvergenceStatus::GradientConvergence
        } else {
            ConvergenceStatus::Running
        }
    }

    /// Budget test on the number of residual evaluations.
    pub fn check_evaluations(&self, func_evals: usize) -> ConvergenceStatus {
        match self.max_nfev {
            Some(limit) if func_evals >= limit => ConvergenceStatus::MaxFunctionEvaluations,
            _ => ConvergenceStatus::Running,
        }
    }

    /// Checks an accepted step from `params` (cost `cost`) to `new_params`
    /// (cost `new_cost`). `iterations` counts accepted steps including this one.
    pub fn check_step(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        let param_change = new_params
            .iter()
            .zip(params.iter())
            .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
            .fold(0.0, f64::max);
        if param_change < self.xtol {
            return ConvergenceStatus::ParameterConvergence;
        }

        let cost_change = (cost - new_cost).abs() / cost.max(1e-300);
        if cost_change < self.ftol {
            return ConvergenceStatus::FunctionValueConvergence;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        ConvergenceStatus::Running
    }
}
