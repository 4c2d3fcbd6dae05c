//! Numerical helpers shared by the optimizer and the uncertainty estimates.

pub mod finite_difference;

pub use finite_difference::{gradient, jacobian};
