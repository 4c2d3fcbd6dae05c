//! Integration of Problem trait with Parameters system
//!
//! This module provides an adapter that lets problems defined over named
//! [`Parameters`] be solved by the Levenberg-Marquardt optimizer, which works
//! on plain vectors. The optimizer sees only the varying parameters, in
//! internal (bounds-transformed) coordinates; fixed and expression
//! parameters are carried along in a working copy of the parameter set.

use std::cell::RefCell;

use ndarray::{Array1, Array2};

use crate::error::{MultiExpError, Result};
use crate::parameters::Parameters;
use crate::problem::Problem;
use crate::profile::{self, Profiler};
use crate::utils::finite_difference;

/// A trait for problems that use the Parameters system
///
/// Implementors compute residuals for an arbitrary parameter set, so the
/// optimizer can evaluate trial points without touching the problem's own
/// parameters.
pub trait ParameterProblem {
    /// Get a reference to the parameters
    fn parameters(&self) -> &Parameters;

    /// Get a mutable reference to the parameters
    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Evaluate the residuals for the given parameter values
    fn residuals(&self, params: &Parameters) -> Result<Array1<f64>>;

    /// Get the number of residuals in the problem
    fn residual_count(&self) -> usize;

    /// Evaluate the residuals with the problem's current parameter values
    fn eval_with_parameters(&self) -> Result<Array1<f64>> {
        self.residuals(self.parameters())
    }

    /// Internal optimizer coordinates of the varying parameters
    fn parameters_to_internal(&self) -> Result<Array1<f64>> {
        let values = self.parameters().varying_internal_values()?;
        Ok(values.into_iter().map(|(_, v)| v).collect())
    }

    /// Update the varying parameters from internal optimizer coordinates
    /// and refresh the expression parameters.
    fn update_parameters_from_internal(&mut self, values: &Array1<f64>) -> Result<()> {
        let expected = self.parameters().varying().len();
        if values.len() != expected {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} values for varying parameters, got {}",
                expected,
                values.len()
            )));
        }

        self.parameters_mut().update_from_internal(&values.to_vec())?;
        Ok(())
    }
}

/// An adapter that implements Problem for ParameterProblem implementations
///
/// Every evaluation writes the optimizer's vector into a working copy of the
/// parameter set and hands that copy to [`ParameterProblem::residuals`].
/// With a [`Profiler`] attached, the parameter update, the residual
/// evaluation and the finite-difference Jacobian are timed separately.
pub struct ParameterProblemAdapter<'a, P: ParameterProblem + ?Sized> {
    problem: &'a P,
    working: RefCell<Parameters>,
    n_varying: usize,
    profiler: Option<&'a Profiler>,
}

impl<'a, P: ParameterProblem + ?Sized> ParameterProblemAdapter<'a, P> {
    /// Create a new adapter for a ParameterProblem implementation
    pub fn new(problem: &'a P) -> Self {
        let working = problem.parameters().clone();
        let n_varying = working.varying().len();
        Self {
            problem,
            working: RefCell::new(working),
            n_varying,
            profiler: None,
        }
    }

    /// Record timings into `profiler`
    pub fn with_profiler(mut self, profiler: &'a Profiler) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Names of the varying parameters, in optimizer order
    pub fn varying_names(&self) -> Vec<String> {
        self.working.borrow().varying_names()
    }

    fn timed<T>(&self, section: &str, f: impl FnOnce() -> T) -> T {
        match self.profiler {
            Some(profiler) => profiler.time(section, f),
            None => f(),
        }
    }
}

impl<'a, P: ParameterProblem + ?Sized> Problem for ParameterProblemAdapter<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != self.n_varying {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} varying parameters, got {}",
                self.n_varying,
                params.len()
            )));
        }

        let mut working = self.working.borrow_mut();
        self.timed(profile::UPDATE_PARAMETERS, || {
            working.update_from_internal(&params.to_vec())
        })?;

        let residuals = self.timed(profile::EVALUATE_RESIDUALS, || {
            self.problem.residuals(&working)
        })?;

        if residuals.len() != self.problem.residual_count() {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                self.problem.residual_count(),
                residuals.len()
            )));
        }
        if let Some(i) = residuals.iter().position(|r| !r.is_finite()) {
            return Err(MultiExpError::FunctionEvaluation(format!(
                "Residual {} is not finite ({})",
                i, residuals[i]
            )));
        }

        Ok(residuals)
    }

    fn parameter_count(&self) -> usize {
        self.n_varying
    }

    fn residual_count(&self) -> usize {
        self.problem.residual_count()
    }

    fn jacobian(
        &self,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
        step: Option<f64>,
    ) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        self.timed(profile::JACOBIAN, || {
            finite_difference::jacobian(self, params, Some(residuals), step)
        })
    }
}
