//! Parameters collection implementation
//!
//! [`Parameters`] keeps named [`Parameter`]s in insertion order and owns the
//! relationships between them. Two read paths exist:
//!
//! - [`Parameters::stored_value`] returns the stored number.
//! - [`Parameters::value`] dispatches on the parameter kind. Expression
//!   parameters are evaluated against the current values of the parameters
//!   they reference, recursively, and clamped to their bounds on every call.
//!
//! [`Parameters::update_expressions`] writes the evaluated values back into
//! storage in dependency order. The optimizer bridge calls it after each
//! update of the varying values.

use crate::parameters::expression::{EvaluationContext, Expression, ExpressionError};
use crate::parameters::parameter::{Parameter, ParameterError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A collection of parameters for optimization problems
///
/// Similar to the `Parameters` class in lmfit. Names are unique and
/// iteration follows insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "ParametersRepr", into = "ParametersRepr")]
pub struct Parameters {
    /// Map of parameter names to Parameter objects
    params: HashMap<String, Parameter>,

    /// Parameter names in insertion order
    order: Vec<String>,

    /// Expression parameters sorted so that every parameter comes after the
    /// expression parameters it references
    eval_order: Vec<String>,
}

/// On-disk form: a plain ordered list
#[derive(Serialize, Deserialize)]
struct ParametersRepr {
    params: Vec<Parameter>,
}

impl From<Parameters> for ParametersRepr {
    fn from(params: Parameters) -> Self {
        let Parameters {
            mut params, order, ..
        } = params;
        let list = order.iter().filter_map(|name| params.remove(name)).collect();
        ParametersRepr { params: list }
    }
}

impl TryFrom<ParametersRepr> for Parameters {
    type Error = ParameterError;

    fn try_from(repr: ParametersRepr) -> Result<Self, Self::Error> {
        let mut params = Parameters::new();
        for mut param in repr.params {
            param.recompile()?;
            params.add(param)?;
        }
        Ok(params)
    }
}

/// Context that resolves names through the dispatching accessor, tracking
/// how deep the chain of expression references has gone.
struct Resolver<'a> {
    params: &'a Parameters,
    depth: usize,
}

impl EvaluationContext for Resolver<'_> {
    fn get_variable(&self, name: &str) -> Result<f64, ExpressionError> {
        self.params
            .resolve(name, self.depth)
            .map_err(|err| match err {
                ParameterError::ParameterNotFound { name } => {
                    ExpressionError::UndefinedVariable { name }
                }
                ParameterError::CircularDependency { name } => {
                    ExpressionError::CircularReference { name }
                }
                other => ExpressionError::InvalidOperation {
                    message: other.to_string(),
                },
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.params.contains(name)
    }
}

/// Context that reads stored values only
struct StoredValues<'a>(&'a Parameters);

impl EvaluationContext for StoredValues<'_> {
    fn get_variable(&self, name: &str) -> Result<f64, ExpressionError> {
        self.0
            .params
            .get(name)
            .map(|p| p.value())
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

impl Parameters {
    /// Create a new empty parameters collection
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameters;
    ///
    /// let params = Parameters::new();
    /// assert!(params.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the collection
    ///
    /// Fails if the name is taken or if the parameter's expression would
    /// close a reference cycle. On failure the collection is unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::{Parameter, Parameters};
    ///
    /// let mut params = Parameters::new();
    /// params.add(Parameter::new("g0_tau0", 1.0)).unwrap();
    /// assert!(params.add(Parameter::new("g0_tau0", 2.0)).is_err());
    /// assert_eq!(params.len(), 1);
    /// ```
    pub fn add(&mut self, param: Parameter) -> Result<(), ParameterError> {
        let name = param.name().to_string();
        if self.params.contains_key(&name) {
            return Err(ParameterError::DuplicateParameter { name });
        }

        self.params.insert(name.clone(), param);
        self.order.push(name.clone());

        if let Err(err) = self.rebuild_eval_order() {
            self.params.remove(&name);
            self.order.pop();
            return Err(err);
        }

        Ok(())
    }

    /// Add a varying, unbounded parameter
    pub fn add_param(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.add(Parameter::new(name, value))
    }

    /// Add a varying parameter with bounds
    pub fn add_param_with_bounds(
        &mut self,
        name: &str,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<(), ParameterError> {
        self.add(Parameter::with_bounds(name, value, min, max)?)
    }

    /// Add a parameter defined by an expression over other parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameters;
    ///
    /// let mut params = Parameters::new();
    /// params.add_param_with_bounds("g0_amp0", 0.3, 0.0, 1.0).unwrap();
    /// params.add_param_with_bounds("g0_amp1", 0.3, 0.0, 1.0).unwrap();
    /// params.add_param_with_expr("g0_amp2", 0.0, "1 - g0_amp0 - g0_amp1").unwrap();
    ///
    /// assert!((params.value("g0_amp2").unwrap() - 0.4).abs() < 1e-12);
    /// ```
    pub fn add_param_with_expr(
        &mut self,
        name: &str,
        value: f64,
        expr: &str,
    ) -> Result<(), ParameterError> {
        self.add(Parameter::with_expr(name, value, expr)?)
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// Get a mutable reference to a parameter.
    ///
    /// Use [`Parameters::set_expr`] to change an expression: it keeps the
    /// dependency order in sync and rejects cycles.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Remove a parameter. Expressions that referenced it fail to evaluate
    /// until the name is defined again.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let param = self.params.remove(name)?;
        self.order.retain(|n| n != name);
        self.eval_order.retain(|n| n != name);
        Some(param)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Iterate over parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.order
            .iter()
            .filter_map(move |name| self.params.get_key_value(name))
    }

    /// Effective value of a parameter.
    ///
    /// Plain parameters return their stored value. Expression parameters are
    /// evaluated against the effective values of the parameters they
    /// reference and clamped to their own bounds. Nothing is cached.
    pub fn value(&self, name: &str) -> Result<f64, ParameterError> {
        self.resolve(name, 0)
    }

    /// Stored value of a parameter, without evaluating any expression
    pub fn stored_value(&self, name: &str) -> Result<f64, ParameterError> {
        self.params
            .get(name)
            .map(|p| p.value())
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    fn resolve(&self, name: &str, depth: usize) -> Result<f64, ParameterError> {
        let param = self
            .params
            .get(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?;

        let expr = match param.compiled_expr() {
            Some(expr) => expr,
            None => return Ok(param.value()),
        };

        // A chain longer than the collection can only come from a cycle.
        if depth > self.params.len() {
            return Err(ParameterError::CircularDependency {
                name: name.to_string(),
            });
        }

        let context = Resolver {
            params: self,
            depth: depth + 1,
        };
        let value = expr.evaluate(&context).map_err(|err| match err {
            ExpressionError::CircularReference { .. } => ParameterError::CircularDependency {
                name: name.to_string(),
            },
            other => ParameterError::ExpressionEvaluation {
                name: name.to_string(),
                message: other.to_string(),
            },
        })?;

        Ok(param.bounds().clamp(value))
    }

    /// Set the stored value of a parameter. Fails outside the bounds.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.params
            .get_mut(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?
            .set_value(value)
    }

    /// Set or clear the expression of a parameter.
    ///
    /// A new expression that would create a reference cycle is rejected and
    /// the previous expression is restored.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::{ParameterError, Parameters};
    ///
    /// let mut params = Parameters::new();
    /// params.add_param("a", 1.0).unwrap();
    /// params.add_param_with_expr("b", 0.0, "2 * a").unwrap();
    ///
    /// let err = params.set_expr("a", Some("b + 1")).unwrap_err();
    /// assert!(matches!(err, ParameterError::CircularDependency { .. }));
    /// assert!(params.get("a").unwrap().expr().is_none());
    /// ```
    pub fn set_expr(&mut self, name: &str, expr: Option<&str>) -> Result<(), ParameterError> {
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?;

        let previous = param.clone();
        param.set_expr(expr)?;

        if let Err(err) = self.rebuild_eval_order() {
            self.params.insert(name.to_string(), previous);
            self.rebuild_eval_order()?;
            return Err(err);
        }

        Ok(())
    }

    /// Parameters that vary during optimization, in insertion order
    pub fn varying(&self) -> Vec<&Parameter> {
        self.iter().map(|(_, p)| p).filter(|p| p.vary()).collect()
    }

    /// Names of the varying parameters, in insertion order
    pub fn varying_names(&self) -> Vec<String> {
        self.varying().iter().map(|p| p.name().to_string()).collect()
    }

    /// Parameters that are fixed or defined by an expression
    pub fn fixed(&self) -> Vec<&Parameter> {
        self.iter().map(|(_, p)| p).filter(|p| !p.vary()).collect()
    }

    /// Names and stored values of the varying parameters
    pub fn varying_values(&self) -> Vec<(String, f64)> {
        self.varying()
            .iter()
            .map(|p| (p.name().to_string(), p.value()))
            .collect()
    }

    /// Names and internal (bounds-transformed) values of the varying parameters
    pub fn varying_internal_values(&self) -> Result<Vec<(String, f64)>, ParameterError> {
        self.varying()
            .iter()
            .map(|p| Ok((p.name().to_string(), p.to_internal()?)))
            .collect()
    }

    /// Set the varying parameters from internal optimizer coordinates, then
    /// refresh every expression parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameters;
    ///
    /// let mut params = Parameters::new();
    /// params.add_param_with_bounds("amp", 0.5, 0.0, 1.0).unwrap();
    /// params.add_param_with_expr("rest", 0.0, "1 - amp").unwrap();
    ///
    /// params.update_from_internal(&[std::f64::consts::FRAC_PI_2]).unwrap();
    /// assert!((params.stored_value("amp").unwrap() - 1.0).abs() < 1e-12);
    /// assert!(params.stored_value("rest").unwrap().abs() < 1e-12);
    /// ```
    pub fn update_from_internal(&mut self, values: &[f64]) -> Result<(), ParameterError> {
        let varying = self.varying_names();
        if values.len() != varying.len() {
            return Err(ParameterError::ExpressionEvaluation {
                name: "parameters".to_string(),
                message: format!(
                    "Expected {} values for varying parameters, got {}",
                    varying.len(),
                    values.len()
                ),
            });
        }

        for (name, &internal) in varying.iter().zip(values) {
            if let Some(param) = self.params.get_mut(name) {
                let external = param.from_internal(internal);
                param.set_value_clamped(external);
            }
        }

        self.update_expressions()
    }

    /// Evaluate every expression parameter in dependency order and store the
    /// clamped result.
    pub fn update_expressions(&mut self) -> Result<(), ParameterError> {
        for i in 0..self.eval_order.len() {
            let name = &self.eval_order[i];
            let param = match self.params.get(name) {
                Some(param) => param,
                None => continue,
            };
            let value = match param.compiled_expr() {
                Some(expr) => expr.evaluate(&StoredValues(self)).map_err(|err| {
                    ParameterError::ExpressionEvaluation {
                        name: name.clone(),
                        message: err.to_string(),
                    }
                })?,
                None => continue,
            };

            let name = self.eval_order[i].clone();
            if let Some(param) = self.params.get_mut(&name) {
                param.set_value_clamped(value);
            }
        }

        Ok(())
    }

    /// Reset every parameter to its initial value and refresh expressions
    pub fn reset(&mut self) -> Result<(), ParameterError> {
        for param in self.params.values_mut() {
            param.reset();
        }
        self.update_expressions()
    }

    /// Names of the parameters that the expression of `name` references
    pub fn dependencies(&self, name: &str) -> Result<Vec<String>, ParameterError> {
        let param = self
            .params
            .get(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })?;

        Ok(param
            .compiled_expr()
            .map(|expr| {
                expr.variables()
                    .into_iter()
                    .filter(|var| self.params.contains_key(var))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Names of the parameters whose expressions reference `name`
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.iter()
            .filter(|(_, p)| {
                p.compiled_expr()
                    .map(|expr| expr.variables().iter().any(|v| v == name))
                    .unwrap_or(false)
            })
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Parse and evaluate an ad-hoc expression against the effective values
    pub fn eval_expression(&self, expr: &str) -> Result<f64, ParameterError> {
        let parsed = Expression::parse(expr).map_err(|source| ParameterError::InvalidExpression {
            name: expr.to_string(),
            source,
        })?;

        parsed
            .evaluate(self)
            .map_err(|err| ParameterError::ExpressionEvaluation {
                name: expr.to_string(),
                message: err.to_string(),
            })
    }

    /// Recompute the evaluation order of the expression parameters with a
    /// depth-first topological sort. Fails on the first cycle found.
    fn rebuild_eval_order(&mut self) -> Result<(), ParameterError> {
        fn visit(
            name: &str,
            params: &HashMap<String, Parameter>,
            done: &mut HashSet<String>,
            in_progress: &mut HashSet<String>,
            out: &mut Vec<String>,
        ) -> Result<(), ParameterError> {
            if done.contains(name) {
                return Ok(());
            }
            if !in_progress.insert(name.to_string()) {
                return Err(ParameterError::CircularDependency {
                    name: name.to_string(),
                });
            }

            if let Some(expr) = params.get(name).and_then(|p| p.compiled_expr()) {
                for var in expr.variables() {
                    if params.contains_key(&var) {
                        visit(&var, params, done, in_progress, out)?;
                    }
                }
                out.push(name.to_string());
            }

            in_progress.remove(name);
            done.insert(name.to_string());
            Ok(())
        }

        let mut done = HashSet::new();
        let mut in_progress = HashSet::new();
        let mut out = Vec::new();
        for name in &self.order {
            visit(name, &self.params, &mut done, &mut in_progress, &mut out)?;
        }

        self.eval_order = out;
        Ok(())
    }
}

impl EvaluationContext for Parameters {
    fn get_variable(&self, name: &str) -> Result<f64, ExpressionError> {
        Resolver {
            params: self,
            depth: 0,
        }
        .get_variable(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Error that can occur during serialization/deserialization
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Parameters {
    /// Save parameters to a JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), SerializationError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Serialize parameters to a pretty-printed JSON string
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load parameters from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, SerializationError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Load parameters from a JSON string.
    ///
    /// Expressions are recompiled and the dependency order is rebuilt.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiexp_rs::parameters::Parameters;
    ///
    /// let json = r#"{
    ///   "params": [
    ///     {"name": "a", "value": 0.25, "init_value": 0.25, "vary": true,
    ///      "bounds": {"min": 0.0, "max": 1.0}},
    ///     {"name": "b", "value": 0.0, "init_value": 0.0, "vary": false,
    ///      "expr": "1 - a"}
    ///   ]
    /// }"#;
    ///
    /// let params = Parameters::from_json(json).unwrap();
    /// assert_eq!(params.names(), vec!["a", "b"]);
    /// assert_eq!(params.value("b").unwrap(), 0.75);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(json)?)
    }
}
