//! Tests for the Parameters collection and the value accessor

use multiexp_rs::parameters::{ParameterError, Parameters};

fn two_groups() -> Parameters {
    let mut params = Parameters::new();
    for g in 0..2 {
        params
            .add_param_with_bounds(&format!("g{g}_amp0"), 0.3, 0.0, 1.0)
            .unwrap();
        params
            .add_param_with_bounds(&format!("g{g}_amp1"), 0.3, 0.0, 1.0)
            .unwrap();
        params
            .add_param_with_expr(
                &format!("g{g}_amp2"),
                0.4,
                &format!("1 - g{g}_amp0 - g{g}_amp1"),
            )
            .unwrap();
    }
    params
}

#[test]
fn test_plain_and_expression_paths() {
    let mut params = two_groups();

    // Plain parameters: value and stored value agree
    assert_eq!(params.value("g0_amp0").unwrap(), 0.3);
    assert_eq!(params.stored_value("g0_amp0").unwrap(), 0.3);

    // Expression parameters are evaluated on every lookup
    params.set_value("g0_amp0", 0.5).unwrap();
    assert_eq!(params.value("g0_amp2").unwrap(), 1.0 - 0.5 - 0.3);
    // The stored value only changes on refresh
    assert_eq!(params.stored_value("g0_amp2").unwrap(), 0.4);
    params.update_expressions().unwrap();
    assert_eq!(params.stored_value("g0_amp2").unwrap(), 1.0 - 0.5 - 0.3);

    // The other group is independent
    assert_eq!(params.value("g1_amp2").unwrap(), 1.0 - 0.3 - 0.3);
}

#[test]
fn test_amplitudes_sum_to_one() {
    let mut params = two_groups();
    for (a0, a1) in [(0.0, 0.0), (0.25, 0.5), (0.9, 0.1), (0.123, 0.456)] {
        params.set_value("g1_amp0", a0).unwrap();
        params.set_value("g1_amp1", a1).unwrap();
        let sum: f64 = ["g1_amp0", "g1_amp1", "g1_amp2"]
            .iter()
            .map(|n| params.value(n).unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-15, "sum = {}", sum);
    }
}

#[test]
fn test_varying_parameters_exclude_expressions() {
    let params = two_groups();
    assert_eq!(
        params.varying_names(),
        vec!["g0_amp0", "g0_amp1", "g1_amp0", "g1_amp1"]
    );
    assert_eq!(params.fixed().len(), 2);
    assert_eq!(params.dependencies("g0_amp2").unwrap(), vec!["g0_amp0", "g0_amp1"]);
    assert_eq!(params.dependents("g1_amp0"), vec!["g1_amp2"]);
}

#[test]
fn test_unknown_names_and_cycles() {
    let mut params = two_groups();
    assert!(matches!(
        params.value("g9_amp0"),
        Err(ParameterError::ParameterNotFound { .. })
    ));

    // g0_amp2 depends on g0_amp0, so the reverse dependency is a cycle
    let err = params.set_expr("g0_amp0", Some("1 - g0_amp2")).unwrap_err();
    assert!(matches!(err, ParameterError::CircularDependency { .. }));
    assert!(params.get("g0_amp0").unwrap().expr().is_none());
    assert_eq!(params.value("g0_amp2").unwrap(), 1.0 - 0.3 - 0.3);

    // Forward references are accepted but fail until the name exists
    params.add_param_with_expr("late", 0.0, "later + 1").unwrap();
    assert!(matches!(
        params.value("late"),
        Err(ParameterError::ExpressionEvaluation { .. })
    ));
    params.add_param("later", 2.0).unwrap();
    assert_eq!(params.value("late").unwrap(), 3.0);
}

#[test]
fn test_internal_round_trip() {
    let mut params = two_groups();
    let internal: Vec<f64> = params
        .varying_internal_values()
        .unwrap()
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(internal.len(), 4);

    params.set_value("g0_amp0", 0.9).unwrap();
    params.update_from_internal(&internal).unwrap();
    assert!((params.value("g0_amp0").unwrap() - 0.3).abs() < 1e-12);
    assert!((params.stored_value("g0_amp2").unwrap() - 0.4).abs() < 1e-12);

    assert!(params.update_from_internal(&internal[..3]).is_err());
}

#[test]
fn test_json_round_trip_keeps_expressions() {
    let params = two_groups();
    let json = params.to_json().unwrap();
    let loaded = Parameters::from_json(&json).unwrap();

    assert_eq!(loaded.names(), params.names());
    assert_eq!(
        loaded.get("g1_amp2").unwrap().expr(),
        Some("1 - g1_amp0 - g1_amp1")
    );
    assert_eq!(loaded.value("g1_amp2").unwrap(), params.value("g1_amp2").unwrap());
    assert_eq!(loaded.get("g0_amp1").unwrap().max(), 1.0);
}
