//! Fit driver tests: statistics, uncertainties and propagated errors

use approx::assert_relative_eq;
use multiexp_rs::model::{Model, ModelProblem};
use multiexp_rs::models::{amp_name, AmplitudePolicy, MultiExpModel};
use multiexp_rs::profile::{self, Profiler};
use multiexp_rs::LmConfig;
use ndarray::Array2;

use crate::test_helpers::{log_grid, model};

const TRUE_AMPLITUDES: [f64; 3] = [0.2, 0.5, 0.3];
const TRUE_DECAYS: [f64; 3] = [0.5, 5.0, 50.0];
const NOISE: f64 = 0.002;

/// One group of three decays with a deterministic ±NOISE perturbation
fn problem(policy: AmplitudePolicy) -> ModelProblem<MultiExpModel> {
    let x = log_grid(-1.5, 2.5, 60);
    let truth = model(AmplitudePolicy::HardCoded, 1, TRUE_AMPLITUDES, TRUE_DECAYS);
    let mut data: Array2<f64> = truth.eval_current(&x).unwrap();
    for (k, v) in data.iter_mut().enumerate() {
        *v += if k % 2 == 0 { NOISE } else { -NOISE };
    }
    let model = MultiExpModel::new(policy, 1).unwrap();
    ModelProblem::new(model, x, data, NOISE).unwrap()
}

#[test]
fn test_expression_fit_recovers_truth() {
    let mut problem = problem(AmplitudePolicy::Expression);
    let result = problem.fit(&LmConfig::default(), None).unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(result.ndata, 61);
    assert_eq!(result.nvarys, 5);
    assert_eq!(result.nfree, 56);
    assert_relative_eq!(result.redchi, result.chisqr / 56.0);

    for k in 0..3 {
        assert_relative_eq!(
            result.value(&amp_name(0, k)).unwrap(),
            TRUE_AMPLITUDES[k],
            epsilon = 0.05
        );
    }
    let sum: f64 = (0..3).map(|k| result.value(&amp_name(0, k)).unwrap()).sum();
    assert_relative_eq!(sum, 1.0, epsilon = 1e-12);

    // The fitted parameters are left on the problem
    assert_relative_eq!(
        problem.model().parameters().value("g0_tau1").unwrap(),
        result.value("g0_tau1").unwrap()
    );
    let best_fit = result.best_fit.as_ref().unwrap();
    assert_eq!(best_fit.dim(), (1, 61));
}

#[test]
fn test_expression_stderr_is_propagated() {
    let mut problem = problem(AmplitudePolicy::Expression);
    let result = problem.fit(&LmConfig::default(), None).unwrap();

    let covar = result.covar.as_ref().unwrap();
    let i = result.var_names.iter().position(|n| n == "g0_amp0").unwrap();
    let j = result.var_names.iter().position(|n| n == "g0_amp1").unwrap();

    // d(1 - a0 - a1) = (-1, -1)
    let expected = (covar[[i, i]] + covar[[j, j]] + 2.0 * covar[[i, j]]).sqrt();
    let stderr = result.stderr("g0_amp2").unwrap();
    assert_relative_eq!(stderr, expected, max_relative = 1e-4);

    assert_relative_eq!(
        result.stderr("g0_amp0").unwrap(),
        covar[[i, i]].sqrt(),
        max_relative = 1e-12
    );
    let correl = result.correlation("g0_amp0", "g0_amp1").unwrap();
    assert!(correl.abs() <= 1.0);
    assert_relative_eq!(result.correlation("g0_amp0", "g0_amp0").unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_constrained_policies_agree() {
    let mut expression = problem(AmplitudePolicy::Expression);
    let mut hard_coded = problem(AmplitudePolicy::HardCoded);
    let a = expression.fit(&LmConfig::default(), None).unwrap();
    let b = hard_coded.fit(&LmConfig::default(), None).unwrap();

    // Same objective, same varying parameters, same path
    assert_eq!(a.var_names, b.var_names);
    assert_eq!(a.nfev, b.nfev);
    assert_relative_eq!(a.chisqr, b.chisqr, max_relative = 1e-10);
    for name in &a.var_names {
        assert_relative_eq!(
            a.value(name).unwrap(),
            b.value(name).unwrap(),
            max_relative = 1e-10
        );
    }
    // The hard-coded model has no third amplitude parameter
    assert!(b.params.get("g0_amp2").is_none());
    assert!(a.stderr("g0_amp2").is_some());
}

#[test]
fn test_free_policy_fits_six_parameters() {
    let mut problem = problem(AmplitudePolicy::Free);
    let result = problem.fit(&LmConfig::default(), None).unwrap();

    assert_eq!(result.nvarys, 6);
    assert!(result.var_names.contains(&"g0_amp2".to_string()));
    assert!(result.params.get("g0_amp2").unwrap().expr().is_none());
}

#[test]
fn test_profiled_fit_records_sections() {
    let mut problem = problem(AmplitudePolicy::Expression);
    let profiler = Profiler::new();
    let result = problem.fit(&LmConfig::default(), Some(&profiler)).unwrap();

    let minimize = profiler.section(profile::MINIMIZE).unwrap();
    assert_eq!(minimize.calls, 1);

    let residuals = profiler.section(profile::EVALUATE_RESIDUALS).unwrap();
    let updates = profiler.section(profile::UPDATE_PARAMETERS).unwrap();
    // The final Jacobian may cost evaluations beyond nfev
    assert!(residuals.calls >= result.nfev);
    assert_eq!(updates.calls, residuals.calls);
    assert!(residuals.total <= minimize.total);

    let jacobian = profiler.section(profile::JACOBIAN).unwrap();
    assert!(jacobian.calls >= 1);
}

#[test]
fn test_iteration_limit_still_reports() {
    let mut problem = problem(AmplitudePolicy::Expression);
    let config = LmConfig::default().with_max_iterations(1);
    let result = problem.fit(&config, None).unwrap();

    assert!(!result.success);
    assert!(result.chisqr.is_finite());
    assert_eq!(result.init_values.len(), 6);
}
