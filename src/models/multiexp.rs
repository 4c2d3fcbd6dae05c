//! Multi-exponential decay model with a per-group amplitude constraint.
//!
//! Each group `g` is a sum of three decays
//!
//! ```text
//! f_g(x) = Σ_k A_gk · exp(-x / T_gk)
//! ```
//!
//! with parameters named `g{g}_amp{k}` and `g{g}_tau{k}`. How the last
//! amplitude is obtained depends on the [`AmplitudePolicy`].

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{MultiExpError, Result};
use crate::model::Model;
use crate::parameters::Parameters;

/// Number of decay components per group
pub const COMPONENTS: usize = 3;

/// How the third amplitude of each group is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmplitudePolicy {
    /// `g{g}_amp2` is a parameter with expression `1 - g{g}_amp0 - g{g}_amp1`,
    /// read through [`Parameters::value`].
    Expression,
    /// Only two amplitudes are parameters; the third is `1 - a0 - a1`
    /// computed in the model arithmetic.
    HardCoded,
    /// Three independent amplitudes, no sum constraint.
    Free,
}

impl AmplitudePolicy {
    pub const ALL: [AmplitudePolicy; 3] = [
        AmplitudePolicy::Expression,
        AmplitudePolicy::HardCoded,
        AmplitudePolicy::Free,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AmplitudePolicy::Expression => "expression",
            AmplitudePolicy::HardCoded => "hard_coded",
            AmplitudePolicy::Free => "free",
        }
    }

    /// Whether the amplitudes of a group sum to one
    pub fn is_constrained(&self) -> bool {
        !matches!(self, AmplitudePolicy::Free)
    }
}

impl fmt::Display for AmplitudePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AmplitudePolicy {
    type Err = MultiExpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "expression" | "expr" => Ok(AmplitudePolicy::Expression),
            "hard_coded" | "hardcoded" => Ok(AmplitudePolicy::HardCoded),
            "free" => Ok(AmplitudePolicy::Free),
            other => Err(MultiExpError::InvalidInput(format!(
                "Unknown amplitude policy '{}'",
                other
            ))),
        }
    }
}

/// Name of amplitude `k` of group `g`
pub fn amp_name(group: usize, k: usize) -> String {
    format!("g{}_amp{}", group, k)
}

/// Name of decay constant `k` of group `g`
pub fn tau_name(group: usize, k: usize) -> String {
    format!("g{}_tau{}", group, k)
}

/// Expression tying the last amplitude of group `g` to the other two
pub fn sum_constraint(group: usize) -> String {
    format!("1 - {} - {}", amp_name(group, 0), amp_name(group, 1))
}

/// `amplitude · exp(-x / decay)` at every sample
pub fn exp_decay(x: &Array1<f64>, amplitude: f64, decay: f64) -> Array1<f64> {
    x.mapv(|v| amplitude * (-v / decay).exp())
}

#[derive(Debug, Clone)]
struct GroupNames {
    amps: [String; COMPONENTS],
    taus: [String; COMPONENTS],
}

impl GroupNames {
    fn new(group: usize) -> Self {
        Self {
            amps: [0, 1, 2].map(|k| amp_name(group, k)),
            taus: [0, 1, 2].map(|k| tau_name(group, k)),
        }
    }
}

/// Sum-of-exponentials model over several independent groups.
///
/// # Examples
///
/// ```
/// use multiexp_rs::model::Model;
/// use multiexp_rs::models::{AmplitudePolicy, MultiExpModel};
/// use ndarray::array;
///
/// let model = MultiExpModel::new(AmplitudePolicy::Expression, 2).unwrap();
/// let curves = model.eval_current(&array![0.0, 1.0, 10.0]).unwrap();
///
/// // All amplitudes sum to one, so every curve starts at one
/// assert!((curves[[0, 0]] - 1.0).abs() < 1e-12);
/// assert!((curves[[1, 0]] - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct MultiExpModel {
    policy: AmplitudePolicy,
    n_groups: usize,
    amplitudes: [f64; COMPONENTS],
    decays: [f64; COMPONENTS],
    amplitude_bounds: (f64, f64),
    decay_bounds: (f64, f64),
    names: Vec<GroupNames>,
    params: Parameters,
}

impl MultiExpModel {
    /// Default initial amplitudes
    pub const DEFAULT_AMPLITUDES: [f64; COMPONENTS] = [0.3, 0.3, 0.4];
    /// Default initial decay constants
    pub const DEFAULT_DECAYS: [f64; COMPONENTS] = [1.0, 10.0, 100.0];
    /// Default lower bound of every decay constant
    pub const MIN_DECAY: f64 = 1e-3;

    /// Create a model with `n_groups` groups and default initial values.
    pub fn new(policy: AmplitudePolicy, n_groups: usize) -> Result<Self> {
        if n_groups == 0 {
            return Err(MultiExpError::InvalidInput(
                "A multi-exponential model needs at least one group".to_string(),
            ));
        }

        let mut model = Self {
            policy,
            n_groups,
            amplitudes: Self::DEFAULT_AMPLITUDES,
            decays: Self::DEFAULT_DECAYS,
            amplitude_bounds: (0.0, 1.0),
            decay_bounds: (Self::MIN_DECAY, f64::INFINITY),
            names: (0..n_groups).map(GroupNames::new).collect(),
            params: Parameters::new(),
        };
        model.rebuild()?;
        Ok(model)
    }

    /// Initial amplitudes and decay constants, shared by every group.
    ///
    /// Under the constrained policies the third amplitude is only a starting
    /// value for the stored expression result.
    pub fn with_guess(
        mut self,
        amplitudes: [f64; COMPONENTS],
        decays: [f64; COMPONENTS],
    ) -> Result<Self> {
        self.amplitudes = amplitudes;
        self.decays = decays;
        self.rebuild()?;
        Ok(self)
    }

    /// Bounds of the varying amplitudes. Default `[0, 1]`.
    pub fn with_amplitude_bounds(mut self, min: f64, max: f64) -> Result<Self> {
        self.amplitude_bounds = (min, max);
        self.rebuild()?;
        Ok(self)
    }

    /// Bounds of the decay constants. Default `[1e-3, inf)`.
    pub fn with_decay_bounds(mut self, min: f64, max: f64) -> Result<Self> {
        self.decay_bounds = (min, max);
        self.rebuild()?;
        Ok(self)
    }

    fn rebuild(&mut self) -> Result<()> {
        let (amp_min, amp_max) = self.amplitude_bounds;
        let (tau_min, tau_max) = self.decay_bounds;
        let mut params = Parameters::new();

        for (group, names) in self.names.iter().enumerate() {
            for k in 0..2 {
                params.add_param_with_bounds(&names.amps[k], self.amplitudes[k], amp_min, amp_max)?;
            }
            match self.policy {
                AmplitudePolicy::Expression => {
                    params.add_param_with_expr(
                        &names.amps[2],
                        self.amplitudes[2],
                        &sum_constraint(group),
                    )?;
                }
                AmplitudePolicy::Free => {
                    params.add_param_with_bounds(
                        &names.amps[2],
                        self.amplitudes[2],
                        amp_min,
                        amp_max,
                    )?;
                }
                AmplitudePolicy::HardCoded => {}
            }
            for k in 0..COMPONENTS {
                params.add_param_with_bounds(&names.taus[k], self.decays[k], tau_min, tau_max)?;
            }
        }

        params.update_expressions()?;
        self.params = params;
        Ok(())
    }

    pub fn policy(&self) -> AmplitudePolicy {
        self.policy
    }

    /// The three amplitudes of group `g` under this model's policy.
    pub fn amplitudes(&self, params: &Parameters, group: usize) -> Result<[f64; COMPONENTS]> {
        let names = self.group_names(group)?;
        let a0 = params.value(&names.amps[0])?;
        let a1 = params.value(&names.amps[1])?;
        let a2 = match self.policy {
            AmplitudePolicy::HardCoded => 1.0 - a0 - a1,
            AmplitudePolicy::Expression | AmplitudePolicy::Free => params.value(&names.amps[2])?,
        };
        Ok([a0, a1, a2])
    }

    /// The three decay constants of group `g`.
    pub fn decays(&self, params: &Parameters, group: usize) -> Result<[f64; COMPONENTS]> {
        let names = self.group_names(group)?;
        Ok([
            params.value(&names.taus[0])?,
            params.value(&names.taus[1])?,
            params.value(&names.taus[2])?,
        ])
    }

    fn group_names(&self, group: usize) -> Result<&GroupNames> {
        self.names.get(group).ok_or_else(|| {
            MultiExpError::InvalidInput(format!(
                "Group {} out of range for a model with {} groups",
                group, self.n_groups
            ))
        })
    }
}

impl Model for MultiExpModel {
    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    fn n_groups(&self) -> usize {
        self.n_groups
    }

    fn eval(&self, params: &Parameters, x: &Array1<f64>) -> Result<Array2<f64>> {
        let mut curves = Array2::zeros((self.n_groups, x.len()));

        for (group, mut row) in curves.outer_iter_mut().enumerate() {
            let amps = self.amplitudes(params, group)?;
            let taus = self.decays(params, group)?;
            for (out, &v) in row.iter_mut().zip(x.iter()) {
                *out = amps[0] * (-v / taus[0]).exp()
                    + amps[1] * (-v / taus[1]).exp()
                    + amps[2] * (-v / taus[2]).exp();
            }
        }

        Ok(curves)
    }
}
