//! Residual properties shared by the amplitude policies

use approx::assert_relative_eq;
use multiexp_rs::model::{Model, ModelProblem};
use multiexp_rs::models::{amp_name, AmplitudePolicy, MultiExpModel};
use multiexp_rs::problem_params::ParameterProblem;
use ndarray::{array, Array2};

use crate::test_helpers::{log_grid, model};

#[test]
fn test_residual_at_zero_is_one() {
    let x = array![0.0, 1.0, 10.0, 100.0];
    for policy in AmplitudePolicy::ALL {
        let model = model(policy, 1, [0.3, 0.3, 0.4], [1.0, 10.0, 100.0]);
        let problem = ModelProblem::new(model, x.clone(), Array2::zeros((1, 4)), 1.0).unwrap();
        let residuals = problem.eval_with_parameters().unwrap();

        assert_eq!(residuals.len(), 4);
        assert_relative_eq!(residuals[0], 1.0, epsilon = 1e-15);
        let expected = 0.3 * (-1.0f64).exp() + 0.3 * (-0.1f64).exp() + 0.4 * (-0.01f64).exp();
        assert_relative_eq!(residuals[1], expected, epsilon = 1e-15);
    }
}

#[test]
fn test_constrained_policies_give_identical_residuals() {
    let x = log_grid(-1.0, 3.0, 50);
    let data = Array2::from_shape_fn((3, x.len()), |(g, i)| 0.01 * (g + 1) as f64 * (i % 7) as f64);

    let expression = ModelProblem::new(
        model(AmplitudePolicy::Expression, 3, [0.15, 0.6, 0.25], [0.7, 7.0, 70.0]),
        x.clone(),
        data.clone(),
        0.05,
    )
    .unwrap();
    let hard_coded = ModelProblem::new(
        model(AmplitudePolicy::HardCoded, 3, [0.15, 0.6, 0.25], [0.7, 7.0, 70.0]),
        x,
        data,
        0.05,
    )
    .unwrap();

    let a = expression.eval_with_parameters().unwrap();
    let b = hard_coded.eval_with_parameters().unwrap();
    assert_eq!(a, b);

    // Same vector in optimizer coordinates too
    let internal = expression.parameters_to_internal().unwrap();
    assert_eq!(internal, hard_coded.parameters_to_internal().unwrap());
}

#[test]
fn test_single_term_decay() {
    let x = array![0.0, 4.0];
    let model = MultiExpModel::new(AmplitudePolicy::Free, 1)
        .unwrap()
        .with_amplitude_bounds(0.0, 10.0)
        .unwrap()
        .with_guess([0.0, 0.0, 2.5], [1.0, 1.0, 4.0])
        .unwrap();
    let curves = model.eval_current(&x).unwrap();
    assert_relative_eq!(curves[[0, 0]], 2.5);
    assert_relative_eq!(curves[[0, 1]], 2.5 / std::f64::consts::E, epsilon = 1e-15);
}

#[test]
fn test_amplitudes_sum_to_one_after_updates() {
    for policy in [AmplitudePolicy::Expression, AmplitudePolicy::HardCoded] {
        let mut model = MultiExpModel::new(policy, 2).unwrap();
        for (a0, a1) in [(0.1, 0.2), (0.45, 0.45), (0.0, 1.0)] {
            model.parameters_mut().set_value(&amp_name(1, 0), a0).unwrap();
            model.parameters_mut().set_value(&amp_name(1, 1), a1).unwrap();
            let amps = model.amplitudes(model.parameters(), 1).unwrap();
            assert_relative_eq!(amps.iter().sum::<f64>(), 1.0, epsilon = 1e-15);
            // The untouched group keeps its defaults
            let amps = model.amplitudes(model.parameters(), 0).unwrap();
            assert_eq!(amps, [0.3, 0.3, 1.0 - 0.3 - 0.3]);
        }
    }
}

#[test]
fn test_residual_layout_is_group_major() {
    let x = log_grid(-1.0, 2.0, 9);
    let n = x.len();
    let mut data = Array2::zeros((4, n));
    // Offset only group 2
    data.row_mut(2).fill(1.0);

    let problem = ModelProblem::new(
        MultiExpModel::new(AmplitudePolicy::Expression, 4).unwrap(),
        x,
        data,
        1.0,
    )
    .unwrap();
    let residuals = problem.eval_with_parameters().unwrap();
    assert_eq!(residuals.len(), 4 * n);

    // Every group shares the same guess, so only group 2 differs
    for i in 0..n {
        assert_eq!(residuals[i], residuals[n + i]);
        assert_eq!(residuals[i], residuals[3 * n + i]);
        assert_relative_eq!(residuals[2 * n + i], residuals[i] - 1.0, epsilon = 1e-15);
    }
}

#[test]
fn test_per_sample_uncertainty_weights_residuals() {
    let x = array![0.0, 1.0, 10.0, 100.0];
    let sigma = array![0.5, 1.0, 2.0, 4.0];
    let weighted = ModelProblem::new(
        MultiExpModel::new(AmplitudePolicy::HardCoded, 1).unwrap(),
        x.clone(),
        Array2::zeros((1, 4)),
        sigma.clone(),
    )
    .unwrap();
    let plain = ModelProblem::new(
        MultiExpModel::new(AmplitudePolicy::HardCoded, 1).unwrap(),
        x,
        Array2::zeros((1, 4)),
        1.0,
    )
    .unwrap();

    let w = weighted.eval_with_parameters().unwrap();
    let p = plain.eval_with_parameters().unwrap();
    for i in 0..4 {
        assert_relative_eq!(w[i], p[i] / sigma[i], epsilon = 1e-15);
    }
}
