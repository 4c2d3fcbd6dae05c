//! Section profiler for fit runs.
//!
//! A [`Profiler`] accumulates call counts and wall time per named section.
//! Sections are reported in the order they were first recorded. The
//! profiler is single-threaded and uses interior mutability so it can be
//! shared by reference with the objective function during a fit.

use std::cell::RefCell;
use std::fmt;
use std::time::{Duration, Instant};

/// Mapping the optimizer's vector onto the parameter set
pub const UPDATE_PARAMETERS: &str = "update_parameters";
/// Computing model curves and residuals
pub const EVALUATE_RESIDUALS: &str = "evaluate_residuals";
/// Finite-difference Jacobian, residual calls included
pub const JACOBIAN: &str = "jacobian";
/// The whole minimization
pub const MINIMIZE: &str = "minimize";

/// Accumulated statistics for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionStats {
    pub name: String,
    pub calls: usize,
    pub total: Duration,
}

impl SectionStats {
    /// Mean time per call
    pub fn per_call(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.total.as_secs_f64() / self.calls as f64)
        }
    }
}

#[derive(Debug, Default)]
pub struct Profiler {
    sections: RefCell<Vec<SectionStats>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call of `elapsed` to section `name`.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let mut sections = self.sections.borrow_mut();
        match sections.iter_mut().find(|s| s.name == name) {
            Some(section) => {
                section.calls += 1;
                section.total += elapsed;
            }
            None => sections.push(SectionStats {
                name: name.to_string(),
                calls: 1,
                total: elapsed,
            }),
        }
    }

    /// Run `f` and record its wall time under `name`.
    ///
    /// Nested calls are allowed; the outer section includes the inner time.
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(name, start.elapsed());
        out
    }

    pub fn section(&self, name: &str) -> Option<SectionStats> {
        self.sections.borrow().iter().find(|s| s.name == name).cloned()
    }

    /// Copy of all sections in first-seen order
    pub fn snapshot(&self) -> Vec<SectionStats> {
        self.sections.borrow().clone()
    }

    pub fn reset(&self) {
        self.sections.borrow_mut().clear();
    }
}

impl fmt::Display for SectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} calls, {} total, {} per call",
            self.name,
            self.calls,
            format_duration(self.total),
            format_duration(self.per_call())
        )
    }
}

/// Human-readable duration with a unit matched to its magnitude.
pub fn format_duration(duration: Duration) -> String {
    format_seconds(duration.as_secs_f64())
}

pub(crate) fn format_seconds(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} µs", secs * 1e6)
    } else {
        format!("{:.1} ns", secs * 1e9)
    }
}
