//! End-to-end comparison of the amplitude policies

use approx::assert_relative_eq;
use multiexp_rs::experiment::{run_comparison, ExperimentConfig};
use multiexp_rs::models::AmplitudePolicy;
use multiexp_rs::profile;
use multiexp_rs::report;
use multiexp_rs::timing::Timer;

fn quick_timer() -> Timer {
    Timer::new().with_repeat(2).with_number(10)
}

fn small_config() -> ExperimentConfig {
    ExperimentConfig::new()
        .with_groups(2)
        .with_grid(-1.0, 2.5, 50)
        .with_noise(0.005)
        .with_seed(11)
}

#[test]
fn test_comparison_covers_every_policy() {
    let comparison = run_comparison(&small_config(), &quick_timer()).unwrap();

    assert_eq!(comparison.runs.len(), 3);
    assert_eq!(comparison.residual_timings.len(), 3);
    assert_eq!(comparison.access.len(), 3);
    assert_eq!(comparison.data.data.dim(), (2, 51));

    let expression = comparison.run(AmplitudePolicy::Expression).unwrap();
    let hard_coded = comparison.run(AmplitudePolicy::HardCoded).unwrap();
    let free = comparison.run(AmplitudePolicy::Free).unwrap();

    assert_eq!(expression.fit.nvarys, 10);
    assert_eq!(hard_coded.fit.nvarys, 10);
    assert_eq!(free.fit.nvarys, 12);

    // Both constrained policies minimize the same objective
    assert_relative_eq!(
        expression.fit.chisqr,
        hard_coded.fit.chisqr,
        max_relative = 1e-10
    );

    for run in &comparison.runs {
        let sections: Vec<&str> = run.profile.iter().map(|s| s.name.as_str()).collect();
        assert!(sections.contains(&profile::UPDATE_PARAMETERS));
        assert!(sections.contains(&profile::EVALUATE_RESIDUALS));
        assert!(sections.contains(&profile::MINIMIZE));
        assert!(run.wall_time > std::time::Duration::ZERO);
    }

    for (_, stats) in &comparison.residual_timings {
        assert_eq!(stats.loops, 10);
        assert_eq!(stats.runs, 2);
    }
}

#[test]
fn test_single_policy_comparison_and_report() {
    let config = small_config().with_policies(vec![AmplitudePolicy::Expression]);
    let comparison = run_comparison(&config, &quick_timer()).unwrap();
    assert_eq!(comparison.runs.len(), 1);
    assert!(comparison.run(AmplitudePolicy::HardCoded).is_none());

    let run = &comparison.runs[0];
    let text = report::fit_report(&run.fit);
    assert!(text.contains("g1_amp2:"));
    assert!(text.contains("== '1 - g1_amp0 - g1_amp1'"));

    let table = report::comparison_table(&comparison.runs).to_string();
    assert!(table.contains("expression"));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = small_config().with_noise(-1.0);
    assert!(run_comparison(&config, &quick_timer()).is_err());
}

#[test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!("multiexp-config-{}.json", std::process::id()));
    let config = small_config().with_policies(vec![AmplitudePolicy::Free]);
    config.save_json(&path).unwrap();
    let loaded = ExperimentConfig::load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
}
