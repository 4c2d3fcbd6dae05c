//! Optimizer and fit driver tests

mod fit_tests;
mod lm_tests;
