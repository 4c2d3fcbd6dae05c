//! A single named fit parameter
//!
//! A [`Parameter`] carries a value, optional bounds, a `vary` flag and an
//! optional constraint expression. Expressions are compiled once when they are
//! set and kept next to their source text, so evaluation never re-parses.

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};
use crate::parameters::expression::{Expression, ExpressionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}' cannot have both an expression and be varied")]
    ExpressionAndVary { name: String },

    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),

    #[error("Invalid expression for parameter '{name}': {source}")]
    InvalidExpression {
        name: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Cannot evaluate expression for parameter '{name}': {message}")]
    ExpressionEvaluation { name: String, message: String },

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Parameter '{name}' already exists")]
    DuplicateParameter { name: String },

    #[error("Circular dependency in expression for parameter '{name}'")]
    CircularDependency { name: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// A parameter for optimization problems, modelled on lmfit's `Parameter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    name: String,

    /// Current stored value
    value: f64,

    /// Value at construction, used by `reset`
    init_value: f64,

    /// Whether this parameter can be varied during optimization
    vary: bool,

    /// Minimum and maximum bounds for the parameter value
    #[serde(default)]
    bounds: Bounds,

    /// Source text of the constraint expression
    #[serde(default)]
    expr: Option<String>,

    #[serde(skip)]
    compiled: Option<Expression>,

    /// Standard error of the parameter (set after fitting)
    #[serde(default)]
    stderr: Option<f64>,
}

impl Parameter {
    /// Create a varying, unbounded parameter
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameter;
    ///
    /// let param = Parameter::new("g0_tau0", 1.0);
    /// assert_eq!(param.name(), "g0_tau0");
    /// assert_eq!(param.value(), 1.0);
    /// assert!(param.vary());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            init_value: value,
            vary: true,
            bounds: Bounds::default(),
            expr: None,
            compiled: None,
            stderr: None,
        }
    }

    /// Create a varying parameter with bounds. The value is clamped into the bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameter;
    ///
    /// let param = Parameter::with_bounds("g0_amp0", 1.5, 0.0, 1.0).unwrap();
    /// assert_eq!(param.value(), 1.0);
    /// assert_eq!(param.min(), 0.0);
    /// assert_eq!(param.max(), 1.0);
    /// ```
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        let value = bounds.clamp(value);

        Ok(Self {
            value,
            init_value: value,
            bounds,
            ..Self::new(name, value)
        })
    }

    /// Create a parameter whose value is derived from an expression.
    /// The expression is parsed immediately and the parameter does not vary.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameter;
    ///
    /// let param = Parameter::with_expr("g0_amp2", 0.4, "1 - g0_amp0 - g0_amp1").unwrap();
    /// assert!(!param.vary());
    /// assert_eq!(param.expr(), Some("1 - g0_amp0 - g0_amp1"));
    /// assert!(Parameter::with_expr("bad", 0.0, "1 -").is_err());
    /// ```
    pub fn with_expr(name: &str, value: f64, expr: &str) -> Result<Self, ParameterError> {
        let mut param = Self::new(name, value);
        param.set_expr(Some(expr))?;
        Ok(param)
    }

    /// Stored value of the parameter. For expression parameters this is the
    /// value computed at the last refresh, not a fresh evaluation.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the stored value. Fails if the value lies outside the bounds.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.is_within_bounds(value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }

        self.value = value;
        Ok(())
    }

    /// Store a value after clamping it into the bounds
    pub(crate) fn set_value_clamped(&mut self, value: f64) {
        self.value = self.bounds.clamp(value);
    }

    /// Value the parameter was created with
    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Reset the parameter to its initial value, clamped to the current bounds
    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
    }

    /// Name of the parameter
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the parameter is varied during optimization
    pub fn vary(&self) -> bool {
        self.vary
    }

    /// Set whether the parameter is varied. Expression parameters cannot vary.
    pub fn set_vary(&mut self, vary: bool) -> Result<(), ParameterError> {
        if vary && self.expr.is_some() {
            return Err(ParameterError::ExpressionAndVary {
                name: self.name.clone(),
            });
        }

        self.vary = vary;
        Ok(())
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Set the bounds and clamp the current value into them
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }

    pub fn set_min(&mut self, min: f64) -> Result<(), ParameterError> {
        self.set_bounds(min, self.bounds.max)
    }

    pub fn set_max(&mut self, max: f64) -> Result<(), ParameterError> {
        self.set_bounds(self.bounds.min, max)
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Source text of the constraint expression, if any
    pub fn expr(&self) -> Option<&str> {
        self.expr.as_deref()
    }

    /// Compiled constraint expression, if any
    pub fn compiled_expr(&self) -> Option<&Expression> {
        self.compiled.as_ref()
    }

    /// Set or clear the constraint expression.
    ///
    /// Setting an expression parses it and fixes the parameter. Clearing it
    /// leaves `vary` untouched.
    pub fn set_expr(&mut self, expr: Option<&str>) -> Result<(), ParameterError> {
        match expr {
            Some(source) => {
                let compiled =
                    Expression::parse(source).map_err(|source| ParameterError::InvalidExpression {
                        name: self.name.clone(),
                        source,
                    })?;
                self.expr = Some(source.to_string());
                self.compiled = Some(compiled);
                self.vary = false;
            }
            None => {
                self.expr = None;
                self.compiled = None;
            }
        }

        Ok(())
    }

    /// Re-parse the stored expression text. Needed after deserialization,
    /// which does not carry the compiled form.
    pub(crate) fn recompile(&mut self) -> Result<(), ParameterError> {
        match self.expr.clone() {
            Some(source) => self.set_expr(Some(&source)),
            None => Ok(()),
        }
    }

    pub fn stderr(&self) -> Option<f64> {
        self.stderr
    }

    pub fn set_stderr(&mut self, stderr: Option<f64>) {
        self.stderr = stderr;
    }

    /// Bounds transform for this parameter
    pub fn bounds_transform(&self) -> BoundsTransform {
        BoundsTransform::new(self.bounds)
    }

    /// Convert the stored value to the optimizer's internal coordinate
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        self.bounds_transform()
            .to_internal(self.value)
            .map_err(ParameterError::from)
    }

    /// Convert an internal coordinate to an external value
    pub fn from_internal(&self, internal_value: f64) -> f64 {
        self.bounds_transform().to_external(internal_value)
    }

    /// Scale a derivative with respect to the external value into one with
    /// respect to the internal coordinate
    pub fn scale_gradient(&self, gradient: f64) -> Result<f64, ParameterError> {
        self.bounds_transform()
            .scale_gradient(self.value, gradient)
            .map_err(ParameterError::from)
    }
}
