//! Constraint-strategy comparison experiment.
//!
//! An [`ExperimentConfig`] describes synthetic multi-exponential data and the
//! fit settings. [`run_comparison`] generates the data once, fits it under
//! every requested [`AmplitudePolicy`] with profiling enabled, and times the
//! parameter access paths and the residual evaluation of each policy.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::{Duration, Instant};

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{MultiExpError, Result};
use crate::lm::LmConfig;
use crate::model::{FitResult, ModelProblem};
use crate::models::{exp_decay, AmplitudePolicy, MultiExpModel, COMPONENTS};
use crate::parameters::Bounds;
use crate::problem_params::ParameterProblem;
use crate::profile::{Profiler, SectionStats};
use crate::timing::{compare_access_paths, AccessTiming, Timer, TimingStats};

/// Settings for one comparison run.
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
///
/// # Examples
///
/// ```
/// use multiexp_rs::experiment::ExperimentConfig;
///
/// let config = ExperimentConfig::from_json(r#"{"n_groups": 2, "seed": 7}"#).unwrap();
/// assert_eq!(config.n_groups, 2);
/// assert_eq!(config.n_points, ExperimentConfig::default().n_points);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Number of independent decay groups
    pub n_groups: usize,
    /// First decade of the log-spaced time axis (`10^log_start`)
    pub log_start: f64,
    /// Last decade of the log-spaced time axis (`10^log_stop`)
    pub log_stop: f64,
    /// Number of log-spaced points
    pub n_points: usize,
    /// Prepend `x = 0` to the time axis
    pub include_zero: bool,
    pub true_amplitudes: [f64; COMPONENTS],
    pub true_decays: [f64; COMPONENTS],
    /// Standard deviation of the Gaussian noise, also used as sigma
    pub noise: f64,
    pub seed: u64,
    pub initial_amplitudes: [f64; COMPONENTS],
    pub initial_decays: [f64; COMPONENTS],
    pub amplitude_bounds: Bounds,
    pub decay_bounds: Bounds,
    /// Policies to fit, in order
    pub policies: Vec<AmplitudePolicy>,
    pub lm: LmConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            n_groups: 4,
            log_start: -1.0,
            log_stop: 3.0,
            n_points: 200,
            include_zero: true,
            true_amplitudes: [0.2, 0.5, 0.3],
            true_decays: [0.5, 5.0, 50.0],
            noise: 0.01,
            seed: 42,
            initial_amplitudes: MultiExpModel::DEFAULT_AMPLITUDES,
            initial_decays: MultiExpModel::DEFAULT_DECAYS,
            amplitude_bounds: Bounds {
                min: 0.0,
                max: 1.0,
            },
            decay_bounds: Bounds::min_only(MultiExpModel::MIN_DECAY),
            policies: AmplitudePolicy::ALL.to_vec(),
            lm: LmConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(mut self, n_groups: usize) -> Self {
        self.n_groups = n_groups;
        self
    }

    /// Log-spaced grid from `10^log_start` to `10^log_stop` with `n_points` points
    pub fn with_grid(mut self, log_start: f64, log_stop: f64, n_points: usize) -> Self {
        self.log_start = log_start;
        self.log_stop = log_stop;
        self.n_points = n_points;
        self
    }

    pub fn with_zero_point(mut self, include_zero: bool) -> Self {
        self.include_zero = include_zero;
        self
    }

    pub fn with_truth(
        mut self,
        amplitudes: [f64; COMPONENTS],
        decays: [f64; COMPONENTS],
    ) -> Self {
        self.true_amplitudes = amplitudes;
        self.true_decays = decays;
        self
    }

    pub fn with_guess(
        mut self,
        amplitudes: [f64; COMPONENTS],
        decays: [f64; COMPONENTS],
    ) -> Self {
        self.initial_amplitudes = amplitudes;
        self.initial_decays = decays;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_policies(mut self, policies: Vec<AmplitudePolicy>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_lm_config(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_groups == 0 {
            return Err(MultiExpError::InvalidInput(
                "n_groups must be at least 1".to_string(),
            ));
        }
        if self.n_points == 0 {
            return Err(MultiExpError::InvalidInput(
                "n_points must be at least 1".to_string(),
            ));
        }
        if !(self.log_start < self.log_stop) {
            return Err(MultiExpError::InvalidInput(format!(
                "log_start ({}) must be below log_stop ({})",
                self.log_start, self.log_stop
            )));
        }
        if !(self.noise.is_finite() && self.noise > 0.0) {
            return Err(MultiExpError::InvalidInput(format!(
                "noise must be finite and positive, got {}",
                self.noise
            )));
        }
        if self.true_decays.iter().any(|&t| !(t > 0.0)) {
            return Err(MultiExpError::InvalidInput(
                "true decay constants must be positive".to_string(),
            ));
        }
        if self.policies.is_empty() {
            return Err(MultiExpError::InvalidInput(
                "at least one amplitude policy is required".to_string(),
            ));
        }
        for (name, bounds) in [
            ("amplitude_bounds", &self.amplitude_bounds),
            ("decay_bounds", &self.decay_bounds),
        ] {
            if !(bounds.min < bounds.max) {
                return Err(MultiExpError::InvalidInput(format!(
                    "{} must have min < max, got [{}, {}]",
                    name, bounds.min, bounds.max
                )));
            }
        }
        self.lm.validate()
    }

    /// Model for `policy` with this configuration's guesses and bounds.
    pub fn build_model(&self, policy: AmplitudePolicy) -> Result<MultiExpModel> {
        MultiExpModel::new(policy, self.n_groups)?
            .with_amplitude_bounds(self.amplitude_bounds.min, self.amplitude_bounds.max)?
            .with_decay_bounds(self.decay_bounds.min, self.decay_bounds.max)?
            .with_guess(self.initial_amplitudes, self.initial_decays)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Read and validate a configuration file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

/// Noisy synthetic decays on a log-spaced grid.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub x: Array1<f64>,
    /// Observed values, shape `(n_groups, x.len())`
    pub data: Array2<f64>,
    /// Noise-free curves
    pub truth: Array2<f64>,
    pub sigma: f64,
}

impl SyntheticData {
    /// Generate data from the configuration's true parameters. The same seed
    /// always gives the same data.
    pub fn generate(config: &ExperimentConfig) -> Result<Self> {
        config.validate()?;

        let amp_sum: f64 = config.true_amplitudes.iter().sum();
        if (amp_sum - 1.0).abs() > 1e-9 {
            log::warn!(
                "true amplitudes sum to {} rather than 1; constrained fits cannot match the truth",
                amp_sum
            );
        }

        let grid = Array1::logspace(10.0, config.log_start, config.log_stop, config.n_points);
        let x: Array1<f64> = if config.include_zero {
            std::iter::once(0.0).chain(grid.iter().copied()).collect()
        } else {
            grid
        };

        let curve = config
            .true_amplitudes
            .iter()
            .zip(config.true_decays.iter())
            .fold(Array1::zeros(x.len()), |acc: Array1<f64>, (&a, &t)| {
                acc + exp_decay(&x, a, t)
            });
        let mut truth = Array2::zeros((config.n_groups, x.len()));
        for mut row in truth.outer_iter_mut() {
            row.assign(&curve);
        }

        let normal =
            Normal::new(0.0, config.noise).map_err(|e| MultiExpError::InvalidInput(e.to_string()))?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let data = truth.mapv(|v| v + normal.sample(&mut rng));

        Ok(Self {
            x,
            data,
            truth,
            sigma: config.noise,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.x.len()
    }

    /// Bind a model to this data
    pub fn problem(&self, model: MultiExpModel) -> Result<ModelProblem<MultiExpModel>> {
        ModelProblem::new(model, self.x.clone(), self.data.clone(), self.sigma)
    }
}

/// Outcome of fitting one policy.
#[derive(Debug, Clone)]
pub struct PolicyRun {
    pub policy: AmplitudePolicy,
    pub fit: FitResult,
    /// Profiler sections recorded during the fit
    pub profile: Vec<SectionStats>,
    pub wall_time: Duration,
}

impl PolicyRun {
    /// Mean wall time of one residual evaluation during the fit
    pub fn time_per_evaluation(&self) -> Option<Duration> {
        self.profile
            .iter()
            .find(|s| s.name == crate::profile::EVALUATE_RESIDUALS)
            .map(|s| s.per_call())
    }
}

/// Fit `data` under one amplitude policy with profiling enabled.
pub fn run_policy(
    config: &ExperimentConfig,
    data: &SyntheticData,
    policy: AmplitudePolicy,
) -> Result<PolicyRun> {
    let mut problem = data.problem(config.build_model(policy)?)?;
    let profiler = Profiler::new();

    let start = Instant::now();
    let fit = problem.fit(&config.lm, Some(&profiler))?;
    let wall_time = start.elapsed();

    log::info!(
        "{} policy: {} after {} evaluations in {:.3?}",
        policy,
        fit.message,
        fit.nfev,
        wall_time
    );

    Ok(PolicyRun {
        policy,
        fit,
        profile: profiler.snapshot(),
        wall_time,
    })
}

/// Everything one comparison produces.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub data: SyntheticData,
    pub runs: Vec<PolicyRun>,
    /// Micro-benchmark of [`Parameters::value`](crate::parameters::Parameters::value) paths
    pub access: Vec<AccessTiming>,
    /// One residual evaluation at the initial guess, per policy
    pub residual_timings: Vec<(AmplitudePolicy, TimingStats)>,
}

impl Comparison {
    pub fn run(&self, policy: AmplitudePolicy) -> Option<&PolicyRun> {
        self.runs.iter().find(|r| r.policy == policy)
    }
}

/// Time one residual evaluation at the initial guess for every policy.
pub fn time_residuals(
    config: &ExperimentConfig,
    data: &SyntheticData,
    timer: &Timer,
) -> Result<Vec<(AmplitudePolicy, TimingStats)>> {
    config
        .policies
        .iter()
        .map(|&policy| {
            let problem = data.problem(config.build_model(policy)?)?;
            problem.eval_with_parameters()?;
            let stats = timer.run(|| problem.eval_with_parameters());
            log::debug!("{} residuals: {}", policy, stats);
            Ok((policy, stats))
        })
        .collect()
}

/// Generate data, fit every configured policy and run the timing comparisons.
pub fn run_comparison(config: &ExperimentConfig, timer: &Timer) -> Result<Comparison> {
    let data = SyntheticData::generate(config)?;
    log::info!(
        "synthetic data: {} groups x {} samples, noise {}",
        config.n_groups,
        data.n_samples(),
        config.noise
    );

    let runs = config
        .policies
        .iter()
        .map(|&policy| run_policy(config, &data, policy))
        .collect::<Result<Vec<_>>>()?;

    let access = compare_access_paths(timer)?;
    let residual_timings = time_residuals(config, &data, timer)?;

    Ok(Comparison {
        data,
        runs,
        access,
        residual_timings,
    })
}
