//! Micro-benchmark runner in the style of Python's `timeit`.
//!
//! A [`Timer`] runs a closure `repeat` times, each run executing it `loops`
//! times back to back, and reports per-loop statistics over the runs. When
//! no loop count is given it is auto-ranged over `1, 2, 5, 10, 20, 50, …`
//! until one run takes at least `min_run_time`.

use std::fmt;
use std::hint::black_box;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::parameters::Parameters;
use crate::profile::format_seconds;

/// Per-loop timing statistics, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub best: f64,
    pub runs: usize,
    pub loops: usize,
}

impl fmt::Display for TimingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ± {} per loop (mean ± std. dev. of {} run{}, {} loop{} each)",
            format_seconds(self.mean),
            format_seconds(self.std_dev),
            self.runs,
            if self.runs == 1 { "" } else { "s" },
            self.loops,
            if self.loops == 1 { "" } else { "s" },
        )
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    repeat: usize,
    number: Option<usize>,
    min_run_time: Duration,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            repeat: 7,
            number: None,
            min_run_time: Duration::from_millis(200),
        }
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timed runs. Default: 7
    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Fixed number of loops per run, disabling auto-ranging
    pub fn with_number(mut self, number: usize) -> Self {
        self.number = Some(number.max(1));
        self
    }

    /// Target duration of one run when auto-ranging. Default: 200 ms
    pub fn with_min_run_time(mut self, min_run_time: Duration) -> Self {
        self.min_run_time = min_run_time;
        self
    }

    /// Time `f` and return per-loop statistics.
    pub fn run<T>(&self, mut f: impl FnMut() -> T) -> TimingStats {
        let loops = match self.number {
            Some(number) => number,
            None => self.autorange(&mut f),
        };

        let per_loop: Vec<f64> = (0..self.repeat)
            .map(|_| time_loops(&mut f, loops).as_secs_f64() / loops as f64)
            .collect();

        let runs = per_loop.len();
        let mean = per_loop.iter().sum::<f64>() / runs as f64;
        let variance = per_loop.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / runs as f64;
        let best = per_loop.iter().copied().fold(f64::INFINITY, f64::min);

        TimingStats {
            mean,
            std_dev: variance.sqrt(),
            best,
            runs,
            loops,
        }
    }

    fn autorange<T>(&self, f: &mut impl FnMut() -> T) -> usize {
        let mut scale = 1;
        loop {
            for base in [1, 2, 5] {
                let loops = base * scale;
                if time_loops(f, loops) >= self.min_run_time {
                    return loops;
                }
            }
            scale = match scale.checked_mul(10) {
                Some(next) => next,
                None => return 5 * scale,
            };
        }
    }
}

fn time_loops<T>(f: &mut impl FnMut() -> T, loops: usize) -> Duration {
    let start = Instant::now();
    for _ in 0..loops {
        black_box(f());
    }
    start.elapsed()
}

/// Timing of one parameter access path.
#[derive(Debug, Clone)]
pub struct AccessTiming {
    pub path: String,
    pub stats: TimingStats,
    /// Mean time relative to the plain read
    pub overhead: f64,
}

/// Time three ways of reading a value through [`Parameters::value`]: a plain
/// parameter, a constant expression and a sum constraint `1 - a - b`.
pub fn compare_access_paths(timer: &Timer) -> Result<Vec<AccessTiming>> {
    let mut params = Parameters::new();
    params.add_param("a", 0.3)?;
    params.add_param("b", 0.3)?;
    params.add_param_with_expr("constant", 0.0, "0.4")?;
    params.add_param_with_expr("sum", 0.0, "1 - a - b")?;

    let paths = [
        ("plain read", "a"),
        ("constant expression", "constant"),
        ("sum expression", "sum"),
    ];

    let mut timings = Vec::with_capacity(paths.len());
    for (label, name) in paths {
        // Surface lookup errors before timing
        params.value(name)?;
        let stats = timer.run(|| params.value(black_box(name)));
        log::debug!("{}: {}", label, stats);
        timings.push((label, stats));
    }

    let plain = timings[0].1.mean;
    Ok(timings
        .into_iter()
        .map(|(label, stats)| AccessTiming {
            path: label.to_string(),
            overhead: if plain > 0.0 { stats.mean / plain } else { f64::NAN },
            stats,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_loops() {
        let mut calls = 0usize;
        let stats = Timer::new().with_repeat(3).with_number(10).run(|| {
            calls += 1;
            calls
        });

        assert_eq!(calls, 30);
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.loops, 10);
        assert!(stats.best <= stats.mean);
        assert!(stats.std_dev >= 0.0);
    }

    #[test]
    fn test_autorange_reaches_target() {
        let timer = Timer::new()
            .with_repeat(2)
            .with_min_run_time(Duration::from_micros(200));
        let stats = timer.run(|| std::thread::sleep(Duration::from_micros(50)));

        // Each run lasts at least the target
        assert!(stats.loops >= 2);
        assert!(stats.best * stats.loops as f64 >= 200e-6);
    }

    #[test]
    fn test_display() {
        let stats = TimingStats {
            mean: 2.5e-6,
            std_dev: 1.0e-7,
            best: 2.4e-6,
            runs: 7,
            loops: 1,
        };
        assert_eq!(
            stats.to_string(),
            "2.500 µs ± 100.0 ns per loop (mean ± std. dev. of 7 runs, 1 loop each)"
        );
    }

    #[test]
    fn test_compare_access_paths() {
        let timer = Timer::new().with_repeat(2).with_number(100);
        let timings = compare_access_paths(&timer).unwrap();

        let paths: Vec<&str> = timings.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, ["plain read", "constant expression", "sum expression"]);
        assert_eq!(timings[0].overhead, 1.0);
        assert!(timings.iter().all(|t| t.stats.loops == 100));
    }
}
