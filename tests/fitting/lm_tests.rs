//! Levenberg-Marquardt tests on a plain `Problem`

use approx::assert_relative_eq;
use multiexp_rs::lm::{ConvergenceStatus, LevenbergMarquardt, LmConfig};
use multiexp_rs::problem::Problem;
use multiexp_rs::{MultiExpError, Result};
use ndarray::{array, Array1, Array2};
use std::cell::Cell;

/// y = a·exp(-x / tau) + b·exp(-x / (10·tau)) sampled without noise
struct TwoDecays {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl TwoDecays {
    fn new(a: f64, b: f64, tau: f64) -> Self {
        let x = Array1::linspace(0.0, 40.0, 81);
        let y = x.mapv(|t| a * (-t / tau).exp() + b * (-t / (10.0 * tau)).exp());
        Self { x, y }
    }
}

impl Problem for TwoDecays {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, b, tau) = (params[0], params[1], params[2]);
        Ok(self
            .x
            .iter()
            .zip(self.y.iter())
            .map(|(&t, &y)| a * (-t / tau).exp() + b * (-t / (10.0 * tau)).exp() - y)
            .collect())
    }

    fn parameter_count(&self) -> usize {
        3
    }

    fn residual_count(&self) -> usize {
        self.x.len()
    }
}

#[test]
fn test_recovers_noiseless_parameters() {
    let problem = TwoDecays::new(0.7, 0.3, 2.0);
    let result = LevenbergMarquardt::new()
        .minimize(&problem, array![0.5, 0.5, 1.0])
        .unwrap();

    assert!(result.success, "{}", result.message);
    assert!(result.status.is_converged());
    assert_relative_eq!(result.params[0], 0.7, epsilon = 1e-6);
    assert_relative_eq!(result.params[1], 0.3, epsilon = 1e-6);
    assert_relative_eq!(result.params[2], 2.0, epsilon = 1e-6);
    assert!(result.cost < 1e-12);
    assert!(result.func_evals > result.iterations);

    let jacobian = result.jacobian.unwrap();
    assert_eq!(jacobian.dim(), (81, 3));
}

#[test]
fn test_iteration_limit_is_not_an_error() {
    let problem = TwoDecays::new(0.7, 0.3, 2.0);
    let config = LmConfig::default().with_max_iterations(1);
    let result = LevenbergMarquardt::with_config(config)
        .minimize(&problem, array![3.0, 2.0, 0.5])
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
    assert_eq!(result.iterations, 1);
}

#[test]
fn test_evaluation_budget() {
    let problem = TwoDecays::new(0.7, 0.3, 2.0);
    let config = LmConfig::default().with_max_nfev(Some(10));
    let result = LevenbergMarquardt::with_config(config)
        .minimize(&problem, array![3.0, 2.0, 0.5])
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status, ConvergenceStatus::MaxFunctionEvaluations);
}

#[test]
fn test_no_jacobian_when_disabled() {
    let problem = TwoDecays::new(0.7, 0.3, 2.0);
    let result = LevenbergMarquardt::new()
        .with_calc_jacobian(false)
        .minimize(&problem, array![0.5, 0.5, 1.0])
        .unwrap();
    assert!(result.jacobian.is_none());
}

#[test]
fn test_rejects_bad_starting_point() {
    let problem = TwoDecays::new(0.7, 0.3, 2.0);
    let err = LevenbergMarquardt::new()
        .minimize(&problem, array![0.5, 0.5])
        .unwrap_err();
    assert!(matches!(err, MultiExpError::DimensionMismatch(_)));
}

/// r(p) = atan(p): every undamped Gauss-Newton step from p = 2 overshoots
struct Arctangent;

impl Problem for Arctangent {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(array![params[0].atan()])
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn residual_count(&self) -> usize {
        1
    }
}

#[test]
fn test_rejects_damping_that_never_grows() {
    let config: LmConfig = serde_json::from_str(r#"{"lambda_up_factor": 1.0}"#).unwrap();
    let err = LevenbergMarquardt::with_config(config)
        .minimize(&Arctangent, array![2.0])
        .unwrap_err();
    assert!(matches!(err, MultiExpError::InvalidInput(_)));

    let config = LmConfig::default().with_lambda_limits(1e3, 1e-3);
    assert!(LevenbergMarquardt::with_config(config)
        .minimize(&Arctangent, array![2.0])
        .is_err());

    // The default schedule handles the overshoot
    let result = LevenbergMarquardt::new()
        .minimize(&Arctangent, array![2.0])
        .unwrap();
    assert!(result.params[0].abs() < 1e-6);
}

/// Residual shrinks by 0.1% per call whatever the parameter, so every step
/// is accepted and no tolerance test can fire.
struct ShrinkingResidual {
    calls: Cell<usize>,
}

impl Problem for ShrinkingResidual {
    fn eval(&self, _params: &Array1<f64>) -> Result<Array1<f64>> {
        let k = self.calls.get();
        self.calls.set(k + 1);
        Ok(array![0.999f64.powi(k as i32)])
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn residual_count(&self) -> usize {
        1
    }

    fn jacobian(
        &self,
        _params: &Array1<f64>,
        _residuals: &Array1<f64>,
        _step: Option<f64>,
    ) -> Result<Array2<f64>> {
        Ok(array![[1.0]])
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

#[test]
fn test_default_evaluation_budget_ends_the_loop() {
    let problem = ShrinkingResidual {
        calls: Cell::new(0),
    };
    let config = LmConfig::default()
        .with_max_iterations(usize::MAX)
        .with_ftol(0.0)
        .with_xtol(0.0)
        .with_gtol(0.0)
        .with_calc_jacobian(false);
    assert!(config.max_nfev.is_none());

    let result = LevenbergMarquardt::with_config(config)
        .minimize(&problem, array![0.0])
        .unwrap();

    assert_eq!(result.status, ConvergenceStatus::MaxFunctionEvaluations);
    assert_eq!(result.func_evals, 2000 * (1 + 1));
    assert_eq!(problem.calls.get(), result.func_evals);
}
