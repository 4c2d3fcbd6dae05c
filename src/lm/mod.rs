//! Levenberg-Marquardt algorithm implementation.
//!
//! A damped Gauss-Newton minimizer for nonlinear least-squares problems
//! expressed through the [`Problem`](crate::problem::Problem) trait.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod trust_region;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use trust_region::TrustRegion;
