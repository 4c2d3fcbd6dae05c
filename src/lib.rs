//! # multiexp-rs
//!
//! `multiexp-rs` profiles a weighted least-squares fit of a multi-exponential
//! decay model under different amplitude-constraint strategies.
//!
//! The library provides:
//! - A parameter system with bounds and algebraic expressions, in the style of
//!   `lmfit-py`
//! - A Levenberg-Marquardt minimizer with finite-difference Jacobians
//! - Fit statistics and uncertainties (covariance, correlation, standard
//!   errors, propagated errors of expression parameters)
//! - A multi-exponential model whose last amplitude per group is either an
//!   expression parameter, hard-coded arithmetic, or free
//! - A section profiler, a `timeit`-style timer and text/table reports
//!
//! ## Basic Usage
//!
//! ```
//! use multiexp_rs::model::ModelProblem;
//! use multiexp_rs::models::{AmplitudePolicy, MultiExpModel};
//! use multiexp_rs::problem_params::ParameterProblem;
//! use ndarray::{array, Array2};
//!
//! let model = MultiExpModel::new(AmplitudePolicy::Expression, 1)?
//!     .with_guess([0.3, 0.3, 0.4], [1.0, 10.0, 100.0])?;
//! let x = array![0.0, 1.0, 10.0, 100.0];
//! let problem = ModelProblem::new(model, x, Array2::zeros((1, 4)), 1.0)?;
//!
//! // The amplitudes sum to one, so the residual at x = 0 is one
//! let residuals = problem.eval_with_parameters()?;
//! assert!((residuals[0] - 1.0).abs() < 1e-12);
//! # Ok::<(), multiexp_rs::MultiExpError>(())
//! ```

pub mod error;
pub mod experiment;
pub mod lm;
pub mod model;
pub mod models;
pub mod parameters;
pub mod problem;
pub mod problem_params;
pub mod profile;
pub mod report;
pub mod timing;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use error::{MultiExpError, Result};
pub use experiment::{run_comparison, ExperimentConfig, SyntheticData};
pub use lm::{LevenbergMarquardt, LmConfig};
pub use model::{fit, FitResult, Model, ModelProblem, Uncertainty};
pub use models::{AmplitudePolicy, MultiExpModel};
pub use parameters::{Parameter, Parameters};
pub use problem::Problem;
pub use profile::Profiler;
pub use timing::Timer;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
