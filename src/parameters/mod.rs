//! # Parameter System
//!
//! Named parameters with bounds and algebraic constraint expressions,
//! similar to lmfit-py.
//!
//! ## Core Components
//!
//! - [`Parameter`]: a value with bounds, a `vary` flag and an optional expression
//! - [`Parameters`]: an insertion-ordered collection with dependency tracking
//!   and the dispatching value accessor
//! - [`Bounds`] and [`BoundsTransform`]: bounds and the Minuit-style mapping
//!   used by the optimizer
//! - [`Expression`]: the parsed constraint AST and its interpreter
//!
//! ## Example Usage
//!
//! ```rust
//! use multiexp_rs::parameters::Parameters;
//!
//! let mut params = Parameters::new();
//! params.add_param_with_bounds("g0_amp0", 0.3, 0.0, 1.0).unwrap();
//! params.add_param_with_bounds("g0_amp1", 0.3, 0.0, 1.0).unwrap();
//! params.add_param_with_expr("g0_amp2", 0.4, "1 - g0_amp0 - g0_amp1").unwrap();
//! params.add_param_with_bounds("g0_tau0", 1.0, 1e-3, f64::INFINITY).unwrap();
//!
//! // Expression parameters are evaluated on lookup
//! let a2 = params.value("g0_amp2").unwrap();
//! assert!((a2 - 0.4).abs() < 1e-12);
//!
//! // Only varying parameters reach the optimizer
//! assert_eq!(params.varying().len(), 3);
//! ```

pub mod bounds;
pub mod expression;
pub mod parameter;
pub mod parameters;


pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use expression::{EvaluationContext, Expression, ExpressionError, SimpleContext};
pub use parameter::{Parameter, ParameterError};
pub use parameters::{Parameters, SerializationError};
