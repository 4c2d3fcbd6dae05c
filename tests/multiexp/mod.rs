//! Multi-exponential model and comparison tests

mod experiment_tests;
mod residual_properties;
