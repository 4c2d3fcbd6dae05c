//! Model trait and the weighted least-squares fit driver.
//!
//! A [`Model`] computes one curve per group from a parameter set. A
//! [`ModelProblem`] pairs it with a sample grid, observed data and
//! uncertainties, and produces the flattened residual vector
//! `(model - data) / sigma` in group-major order. [`fit`] runs the
//! Levenberg-Marquardt optimizer on any [`ParameterProblem`] and collects
//! lmfit-style statistics and uncertainties into a [`FitResult`].

use ndarray::{Array1, Array2};

use crate::error::{MultiExpError, Result};
use crate::lm::{ConvergenceStatus, LevenbergMarquardt, LmConfig};
use crate::parameters::Parameters;
use crate::problem_params::{ParameterProblem, ParameterProblemAdapter};
use crate::profile::{self, Profiler};
use crate::uncertainty::{apply_standard_errors, UncertaintyCalculator};

/// Measurement uncertainty: one value for every sample, or one per sample.
///
/// Per-sample values are shared by all groups.
#[derive(Debug, Clone, PartialEq)]
pub enum Uncertainty {
    Scalar(f64),
    PerSample(Array1<f64>),
}

impl Uncertainty {
    /// Check that every sigma is finite and positive and that a per-sample
    /// vector matches the grid.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        match self {
            Uncertainty::Scalar(sigma) => check_sigma(*sigma),
            Uncertainty::PerSample(sigma) => {
                if sigma.len() != n_samples {
                    return Err(MultiExpError::DimensionMismatch(format!(
                        "Expected {} uncertainties, got {}",
                        n_samples,
                        sigma.len()
                    )));
                }
                sigma.iter().try_for_each(|&s| check_sigma(s))
            }
        }
    }

    /// Sigma for sample `i`
    pub fn sigma(&self, i: usize) -> f64 {
        match self {
            Uncertainty::Scalar(sigma) => *sigma,
            Uncertainty::PerSample(sigma) => sigma[i],
        }
    }
}

fn check_sigma(sigma: f64) -> Result<()> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(())
    } else {
        Err(MultiExpError::InvalidInput(format!(
            "Uncertainty must be finite and positive, got {}",
            sigma
        )))
    }
}

impl From<f64> for Uncertainty {
    fn from(sigma: f64) -> Self {
        Uncertainty::Scalar(sigma)
    }
}

impl From<Array1<f64>> for Uncertainty {
    fn from(sigma: Array1<f64>) -> Self {
        Uncertainty::PerSample(sigma)
    }
}

/// A trait representing a model that can be fit to data.
///
/// `eval` must be a pure function of `params` and `x`: the optimizer calls
/// it with trial parameter sets that are not the model's own.
pub trait Model {
    /// Returns a reference to the model's parameters.
    fn parameters(&self) -> &Parameters;

    /// Returns a mutable reference to the model's parameters.
    fn parameters_mut(&mut self) -> &mut Parameters;

    /// Number of curves the model produces
    fn n_groups(&self) -> usize;

    /// Evaluate every group at `x`. Output shape is `(n_groups, x.len())`.
    fn eval(&self, params: &Parameters, x: &Array1<f64>) -> Result<Array2<f64>>;

    /// Evaluate with the model's current parameters
    fn eval_current(&self, x: &Array1<f64>) -> Result<Array2<f64>> {
        self.eval(self.parameters(), x)
    }
}

/// A model bound to a sample grid, observed data and uncertainties.
#[derive(Debug, Clone)]
pub struct ModelProblem<M: Model> {
    model: M,
    x: Array1<f64>,
    data: Array2<f64>,
    uncertainty: Uncertainty,
}

impl<M: Model> ModelProblem<M> {
    /// `data` has one row per group and one column per sample.
    pub fn new(
        model: M,
        x: Array1<f64>,
        data: Array2<f64>,
        uncertainty: impl Into<Uncertainty>,
    ) -> Result<Self> {
        let uncertainty = uncertainty.into();
        if data.dim() != (model.n_groups(), x.len()) {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Expected data of shape ({}, {}), got {:?}",
                model.n_groups(),
                x.len(),
                data.dim()
            )));
        }
        uncertainty.validate(x.len())?;

        Ok(Self {
            model,
            x,
            data,
            uncertainty,
        })
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn uncertainty(&self) -> &Uncertainty {
        &self.uncertainty
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Number of residuals
    pub fn ndata(&self) -> usize {
        self.data.len()
    }

    /// Number of varying parameters
    pub fn nvarys(&self) -> usize {
        self.model.parameters().varying().len()
    }

    /// Fit the model and attach the best-fit curves to the result.
    pub fn fit(&mut self, config: &LmConfig, profiler: Option<&Profiler>) -> Result<FitResult> {
        let mut result = fit(&mut *self, config, profiler)?;
        result.best_fit = Some(self.model.eval_current(&self.x)?);
        Ok(result)
    }
}

impl<M: Model> ParameterProblem for ModelProblem<M> {
    fn parameters(&self) -> &Parameters {
        self.model.parameters()
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        self.model.parameters_mut()
    }

    fn residuals(&self, params: &Parameters) -> Result<Array1<f64>> {
        let curves = self.model.eval(params, &self.x)?;
        if curves.dim() != self.data.dim() {
            return Err(MultiExpError::DimensionMismatch(format!(
                "Model produced shape {:?}, data has shape {:?}",
                curves.dim(),
                self.data.dim()
            )));
        }

        let n_samples = self.x.len();
        let mut residuals = Array1::zeros(self.data.len());
        for ((g, i), &value) in curves.indexed_iter() {
            residuals[g * n_samples + i] = (value - self.data[[g, i]]) / self.uncertainty.sigma(i);
        }
        Ok(residuals)
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }
}

/// Result of fitting a model to data
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Whether the optimizer reported convergence
    pub success: bool,

    /// Why the optimizer stopped
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,

    /// Number of residual evaluations
    pub nfev: usize,

    /// Number of accepted optimizer steps
    pub iterations: usize,

    /// Number of residuals
    pub ndata: usize,

    /// Number of varying parameters
    pub nvarys: usize,

    /// Degrees of freedom, at least 1
    pub nfree: usize,

    /// Sum of squared residuals
    pub chisqr: f64,

    /// chisqr / nfree
    pub redchi: f64,

    /// Akaike information criterion
    pub aic: f64,

    /// Bayesian information criterion
    pub bic: f64,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Model curves at the solution, shape `(n_groups, n_samples)`
    pub best_fit: Option<Array2<f64>>,

    /// Fitted parameters, standard errors included when available
    pub params: Parameters,

    /// Effective parameter values before the fit, in insertion order
    pub init_values: Vec<(String, f64)>,

    /// Names of the varying parameters, in covariance order
    pub var_names: Vec<String>,

    /// Covariance of the varying parameters
    pub covar: Option<Array2<f64>>,

    /// Correlation of the varying parameters
    pub correl: Option<Array2<f64>>,
}

impl FitResult {
    /// Fitted value of a parameter
    pub fn value(&self, name: &str) -> Result<f64> {
        Ok(self.params.value(name)?)
    }

    /// Standard error of a parameter, if estimated
    pub fn stderr(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(|p| p.stderr())
    }

    /// Correlation between two varying parameters
    pub fn correlation(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.var_names.iter().position(|n| n == a)?;
        let j = self.var_names.iter().position(|n| n == b)?;
        self.correl.as_ref().map(|c| c[[i, j]])
    }
}

/// Fit a parameter problem with the Levenberg-Marquardt optimizer.
///
/// The problem's parameters are left at the fitted values. Standard errors
/// are set when the covariance matrix can be estimated; a singular Jacobian
/// only drops the uncertainties, it does not fail the fit. With a
/// [`Profiler`], the run is recorded under the `minimize` section and the
/// objective's inner sections.
pub fn fit<P: ParameterProblem + ?Sized>(
    problem: &mut P,
    config: &LmConfig,
    profiler: Option<&Profiler>,
) -> Result<FitResult> {
    problem.parameters_mut().update_expressions()?;

    let init_values = problem
        .parameters()
        .names()
        .into_iter()
        .map(|name| -> Result<(String, f64)> {
            let value = problem.parameters().value(&name)?;
            Ok((name, value))
        })
        .collect::<Result<Vec<_>>>()?;
    let var_names = problem.parameters().varying_names();
    let start = problem.parameters_to_internal()?;

    let optimizer = LevenbergMarquardt::with_config(config.clone());
    let lm_result = {
        let mut adapter = ParameterProblemAdapter::new(&*problem);
        if let Some(profiler) = profiler {
            adapter = adapter.with_profiler(profiler);
        }
        let run = || optimizer.minimize(&adapter, start);
        match profiler {
            Some(profiler) => profiler.time(profile::MINIMIZE, run),
            None => run(),
        }?
    };

    problem.update_parameters_from_internal(&lm_result.params)?;

    let ndata = lm_result.residuals.len();
    let stats = UncertaintyCalculator::new(ndata, var_names.len(), lm_result.cost);

    for name in problem.parameters().names() {
        if let Some(param) = problem.parameters_mut().get_mut(&name) {
            param.set_stderr(None);
        }
    }

    let (covar, correl) = match &lm_result.jacobian {
        Some(jacobian) => match stats.analyze(jacobian, problem.parameters()) {
            Ok(uncertainty) => {
                apply_standard_errors(problem.parameters_mut(), &uncertainty)?;
                (Some(uncertainty.covariance), Some(uncertainty.correlation))
            }
            Err(err) => {
                log::warn!("uncertainties not estimated: {}", err);
                (None, None)
            }
        },
        None => (None, None),
    };

    log::info!(
        "fit finished: {} (nfev = {}, chisqr = {:.6e}, redchi = {:.6e})",
        lm_result.message,
        lm_result.func_evals,
        lm_result.cost,
        stats.redchi
    );

    Ok(FitResult {
        success: lm_result.success,
        status: lm_result.status,
        message: lm_result.message,
        nfev: lm_result.func_evals,
        iterations: lm_result.iterations,
        ndata,
        nvarys: stats.nvarys,
        nfree: stats.nfree,
        chisqr: stats.chisqr,
        redchi: stats.redchi,
        aic: stats.aic(),
        bic: stats.bic(),
        residuals: lm_result.residuals,
        best_fit: None,
        params: problem.parameters().clone(),
        init_values,
        var_names,
        covar,
        correl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Two independent single-exponential decays, one per group
    struct TwoDecays {
        params: Parameters,
    }

    impl TwoDecays {
        fn new() -> Self {
            let mut params = Parameters::new();
            params.add_param("a0", 1.0).unwrap();
            params.add_param_with_bounds("t0", 1.0, 1e-3, f64::INFINITY).unwrap();
            params.add_param_with_expr("a1", 1.0, "2 * a0").unwrap();
            params.add_param_with_bounds("t1", 5.0, 1e-3, f64::INFINITY).unwrap();
            Self { params }
        }
    }

    impl Model for TwoDecays {
        fn parameters(&self) -> &Parameters {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.params
        }

        fn n_groups(&self) -> usize {
            2
        }

        fn eval(&self, params: &Parameters, x: &Array1<f64>) -> Result<Array2<f64>> {
            let mut out = Array2::zeros((2, x.len()));
            for g in 0..2 {
                let a = params.value(&format!("a{}", g))?;
                let t = params.value(&format!("t{}", g))?;
                out.row_mut(g).assign(&x.mapv(|v| a * (-v / t).exp()));
            }
            Ok(out)
        }
    }

    fn synthetic(model: &TwoDecays, x: &Array1<f64>) -> Array2<f64> {
        let mut truth = model.params.clone();
        truth.set_value("a0", 1.5).unwrap();
        truth.set_value("t0", 2.0).unwrap();
        truth.set_value("t1", 7.0).unwrap();
        truth.update_expressions().unwrap();
        model.eval(&truth, x).unwrap()
    }

    #[test]
    fn test_residuals_are_group_major_and_weighted() {
        let model = TwoDecays::new();
        let x = array![0.0, 1.0, 2.0];
        let data = Array2::zeros((2, 3));
        let problem = ModelProblem::new(model, x.clone(), data, array![1.0, 2.0, 4.0]).unwrap();

        let residuals = problem.eval_with_parameters().unwrap();
        assert_eq!(residuals.len(), 6);
        // a0 = 1, t0 = 1
        assert_relative_eq!(residuals[0], 1.0);
        assert_relative_eq!(residuals[1], (-1.0f64).exp() / 2.0, epsilon = 1e-15);
        // a1 = 2 a0 through the expression, t1 = 5
        assert_relative_eq!(residuals[3], 2.0);
        assert_relative_eq!(residuals[5], 2.0 * (-0.4f64).exp() / 4.0, epsilon = 1e-15);
    }

    #[test]
    fn test_problem_validation() {
        let x = array![0.0, 1.0, 2.0];
        assert!(matches!(
            ModelProblem::new(TwoDecays::new(), x.clone(), Array2::zeros((1, 3)), 1.0),
            Err(MultiExpError::DimensionMismatch(_))
        ));
        assert!(matches!(
            ModelProblem::new(TwoDecays::new(), x.clone(), Array2::zeros((2, 3)), 0.0),
            Err(MultiExpError::InvalidInput(_))
        ));
        assert!(matches!(
            ModelProblem::new(TwoDecays::new(), x.clone(), Array2::zeros((2, 3)), array![1.0, 1.0]),
            Err(MultiExpError::DimensionMismatch(_))
        ));
        assert!(matches!(
            ModelProblem::new(
                TwoDecays::new(),
                x,
                Array2::zeros((2, 3)),
                array![1.0, f64::NAN, 1.0]
            ),
            Err(MultiExpError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fit_recovers_parameters() {
        let model = TwoDecays::new();
        let x = Array1::linspace(0.0, 20.0, 41);
        let data = synthetic(&model, &x);
        let mut problem = ModelProblem::new(model, x, data, 0.01).unwrap();

        let profiler = Profiler::new();
        let result = problem.fit(&LmConfig::default(), Some(&profiler)).unwrap();

        assert!(result.success, "{}", result.message);
        assert_relative_eq!(result.value("a0").unwrap(), 1.5, epsilon = 1e-6);
        assert_relative_eq!(result.value("a1").unwrap(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(result.value("t0").unwrap(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.value("t1").unwrap(), 7.0, epsilon = 1e-6);

        assert_eq!(result.ndata, 82);
        assert_eq!(result.nvarys, 3);
        assert_eq!(result.nfree, 79);
        assert_eq!(result.var_names, vec!["a0", "t0", "t1"]);
        assert_eq!(result.init_values[2], ("a1".to_string(), 2.0));
        assert!(result.chisqr < 1e-8);
        assert_eq!(result.best_fit.as_ref().map(|b| b.dim()), Some((2, 41)));

        // Problem parameters are left at the solution
        assert_relative_eq!(problem.parameters().value("t1").unwrap(), 7.0, epsilon = 1e-6);

        let minimize = profiler.section(profile::MINIMIZE).unwrap();
        assert_eq!(minimize.calls, 1);
        assert_eq!(
            profiler.section(profile::EVALUATE_RESIDUALS).unwrap().calls,
            result.nfev
        );
    }

    #[test]
    fn test_fit_uncertainties() {
        let model = TwoDecays::new();
        let x = Array1::linspace(0.0, 20.0, 41);
        let mut data = synthetic(&model, &x);
        // Deterministic perturbation so chisqr is not zero
        for (k, v) in data.iter_mut().enumerate() {
            *v += if k % 2 == 0 { 0.01 } else { -0.01 };
        }
        let mut problem = ModelProblem::new(model, x, data, 0.01).unwrap();
        let result = problem.fit(&LmConfig::default(), None).unwrap();

        let covar = result.covar.as_ref().unwrap();
        assert_eq!(covar.dim(), (3, 3));
        let a0_err = result.stderr("a0").unwrap();
        assert_relative_eq!(a0_err, covar[[0, 0]].sqrt(), epsilon = 1e-12);
        // a1 = 2 a0
        assert_relative_eq!(result.stderr("a1").unwrap(), 2.0 * a0_err, max_relative = 1e-4);
        assert_relative_eq!(result.correlation("a0", "a0").unwrap(), 1.0);
        let c = result.correlation("a0", "t0").unwrap();
        assert!(c.abs() <= 1.0);
        assert!(result.aic.is_finite() && result.bic > result.aic);
    }

    #[test]
    fn test_fit_without_varying_parameters_fails() {
        let mut model = TwoDecays::new();
        for name in ["a0", "t0", "t1"] {
            model.params.get_mut(name).unwrap().set_vary(false).unwrap();
        }
        let x = array![0.0, 1.0, 2.0];
        let mut problem = ModelProblem::new(model, x, Array2::zeros((2, 3)), 1.0).unwrap();
        assert!(matches!(
            problem.fit(&LmConfig::default(), None),
            Err(MultiExpError::InvalidInput(_))
        ));
    }
}
