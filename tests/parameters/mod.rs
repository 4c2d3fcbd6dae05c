//! Integration tests for the parameter system

// Tests for the Expression parsing and evaluation
mod expression_tests;

// Tests for the Parameters collection and the value accessor
mod parameters_tests;
