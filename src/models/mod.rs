//! Built-in model implementations.
//!
//! [`MultiExpModel`] is a sum of exponential decays per group whose
//! amplitude constraint can be expressed in three ways, see
//! [`AmplitudePolicy`].

mod multiexp;

pub use multiexp::{
    amp_name, exp_decay, sum_constraint, tau_name, AmplitudePolicy, MultiExpModel, COMPONENTS,
};
