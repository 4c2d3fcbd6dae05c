//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! with a Cholesky factorization, falling back to LU when the damped matrix
//! is not numerically positive definite. Steps are accepted by gain ratio.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{MultiExpError, Result};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::trust_region::TrustRegion;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of residual evaluations, finite-difference columns included
    pub func_evals: usize,

    /// Whether the optimization converged
    pub success: bool,

    /// Why the iteration stopped
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,

    /// The Jacobian matrix at the solution (if requested)
    pub jacobian: Option<Array2<f64>>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in the sum of squares.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set whether to calculate and return the Jacobian at the solution.
    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.config.calc_jacobian = calc_jacobian;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// An invalid [`LmConfig`] is rejected before the first evaluation.
    /// Residual evaluation errors abort the minimization and are returned
    /// as-is. Running out of iterations or evaluations is not an error: the
    /// result carries `success == false` and the matching status.
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        let n_residuals = problem.residual_count();
        if initial_params.len() != n_params {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }
        if n_params == 0 {
            return Err(MultiExpError::InvalidInput(
                "No varying parameters to optimize".to_string(),
            ));
        }
        if n_residuals < n_params {
            return Err(MultiExpError::InvalidInput(format!(
                "Need at least as many residuals ({}) as parameters ({})",
                n_residuals, n_params
            )));
        }

        self.config.validate()?;

        let mut criteria = ConvergenceCriteria::from_config(&self.config);
        // Rejected steps are not iterations, so the evaluation budget is what
        // bounds the loop.
        criteria.max_nfev = Some(self.config.evaluation_limit(n_params));
        let mut region = TrustRegion::from_config(&self.config);
        let step = self.config.diff_step();
        let jacobian_cost = if problem.has_custom_jacobian() { 0 } else { n_params };

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        if residuals.len() != n_residuals {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                residuals.len()
            )));
        }
        let mut cost = sum_of_squares(&residuals);

        let mut jacobian = problem.jacobian(&params, &residuals, Some(step))?;
        func_evals += jacobian_cost;
        let mut jacobian_current = true;
        let mut iterations = 0;

        let status = loop {
            if !jacobian_current {
                jacobian = problem.jacobian(&params, &residuals, Some(step))?;
                func_evals += jacobian_cost;
                jacobian_current = true;
            }

            let jtj = jacobian.t().dot(&jacobian);
            let gradient = jacobian.t().dot(&residuals);

            let status = criteria.check_gradient(gradient.dot(&gradient).sqrt());
            if status.is_terminated() {
                break status;
            }
            let status = criteria.check_evaluations(func_evals);
            if status.is_terminated() {
                break status;
            }

            let delta = match solve_damped(&jtj, &gradient, region.lambda) {
                Some(delta) => delta,
                None => {
                    log::debug!("damped system singular at lambda = {:.3e}", region.lambda);
                    region.reject();
                    if region.is_saturated() {
                        break ConvergenceStatus::LambdaSaturated;
                    }
                    continue;
                }
            };

            let new_params = &params + &delta;
            let new_residuals = problem.eval(&new_params)?;
            func_evals += 1;
            let new_cost = sum_of_squares(&new_residuals);

            let predicted = -(2.0 * delta.dot(&gradient) + delta.dot(&jtj.dot(&delta)));
            let rho = TrustRegion::gain_ratio(cost, new_cost, predicted);
            let accepted = new_cost.is_finite() && region.update_lambda(rho);

            log::debug!(
                "iter {:>3}: cost {:.6e} -> {:.6e}, rho {:.3}, lambda {:.3e}, {}",
                iterations,
                cost,
                new_cost,
                rho,
                region.lambda,
                if accepted { "accepted" } else { "rejected" }
            );

            if accepted {
                iterations += 1;
                let status = criteria.check_step(&params, &new_params, cost, new_cost, iterations);
                params = new_params;
                residuals = new_residuals;
                cost = new_cost;
                jacobian_current = false;
                if status.is_terminated() {
                    break status;
                }
            } else {
                if !new_cost.is_finite() {
                    region.reject();
                }
                if region.is_saturated() {
                    break ConvergenceStatus::LambdaSaturated;
                }
                let status = criteria.check_evaluations(func_evals);
                if status.is_terminated() {
                    break status;
                }
            }
        };

        let jacobian = if self.config.calc_jacobian {
            if jacobian_current {
                Some(jacobian)
            } else {
                Some(problem.jacobian(&params, &residuals, Some(step))?)
            }
        } else {
            None
        };

        log::debug!(
            "{} after {} iterations and {} evaluations",
            status.description(),
            iterations,
            func_evals
        );

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success: status.is_converged(),
            status,
            message: status.description(),
            jacobian,
        })
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = -g`. Returns `None` when the system is
/// singular or the solution is not finite.
fn solve_damped(jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = gradient.len();
    let damped = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            jtj[[i, i]] + lambda * jtj[[i, i]].max(1e-12)
        } else {
            jtj[[i, j]]
        }
    });
    let rhs = DVector::from_iterator(n, gradient.iter().map(|g| -g));

    let solution = match damped.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&rhs),
        None => damped.lu().solve(&rhs)?,
    };

    if solution.iter().all(|v| v.is_finite()) {
        Some(Array1::from_iter(solution.iter().copied()))
    } else {
        None
    }
}
