//! Human-readable reports.
//!
//! [`fit_report`] renders an lmfit-style text report of a [`FitResult`].
//! The table builders render profiler sections, access-path timings and the
//! policy comparison with `comfy-table`. Output goes through [`emit_lines`],
//! which logs at info level when a logger is enabled and prints otherwise.

use std::fmt::Write;

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

use crate::experiment::{Comparison, PolicyRun};
use crate::model::FitResult;
use crate::profile::{format_duration, format_seconds, SectionStats};
use crate::timing::{AccessTiming, TimingStats};

/// Correlations below this magnitude are left out of [`fit_report`]
pub const MIN_CORRELATION: f64 = 0.1;

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

/// Emit every line of `text`
pub fn emit_lines(text: &str) {
    for line in text.lines() {
        emit_line(line);
    }
}

fn new_table(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn right(content: impl ToString) -> Cell {
    Cell::new(content).set_alignment(CellAlignment::Right)
}

/// lmfit-style report: fit statistics, variables and correlations.
pub fn fit_report(result: &FitResult) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_fit_report(&mut out, result);
    out
}

fn write_fit_report(out: &mut String, result: &FitResult) -> std::fmt::Result {
    writeln!(out, "[[Fit Statistics]]")?;
    writeln!(out, "    # fitting method   = leastsq")?;
    writeln!(out, "    # function evals   = {}", result.nfev)?;
    writeln!(out, "    # data points      = {}", result.ndata)?;
    writeln!(out, "    # variables        = {}", result.nvarys)?;
    writeln!(out, "    chi-square         = {:.8}", result.chisqr)?;
    writeln!(out, "    reduced chi-square = {:.8}", result.redchi)?;
    writeln!(out, "    Akaike info crit   = {:.8}", result.aic)?;
    writeln!(out, "    Bayesian info crit = {:.8}", result.bic)?;
    if !result.success {
        writeln!(out, "##  Warning: {}", result.message)?;
    }

    writeln!(out, "[[Variables]]")?;
    let width = result
        .params
        .names()
        .iter()
        .map(|n| n.len())
        .max()
        .unwrap_or(0);
    for (name, param) in result.params.iter() {
        let value = result.params.value(name).unwrap_or(param.value());
        let label = format!("{}:", name);
        write!(out, "    {:<w$} {:>14.8}", label, value, w = width + 1)?;

        match param.stderr() {
            Some(stderr) if value != 0.0 => write!(
                out,
                " +/- {:.8} ({:.2}%)",
                stderr,
                (stderr / value).abs() * 100.0
            )?,
            Some(stderr) => write!(out, " +/- {:.8}", stderr)?,
            None if param.vary() => write!(out, " +/- None")?,
            None => {}
        }

        if let Some(expr) = param.expr() {
            writeln!(out, " == '{}'", expr)?;
        } else if !param.vary() {
            writeln!(out, " (fixed)")?;
        } else {
            let init = result
                .init_values
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .unwrap_or(param.init_value());
            writeln!(out, " (init = {})", init)?;
        }
    }

    if let Some(correl) = &result.correl {
        let mut pairs = Vec::new();
        for i in 0..result.var_names.len() {
            for j in (i + 1)..result.var_names.len() {
                let c = correl[[i, j]];
                if c.abs() >= MIN_CORRELATION {
                    pairs.push((i, j, c));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));

        if !pairs.is_empty() {
            writeln!(
                out,
                "[[Correlations]] (unreported correlations are < {:.3})",
                MIN_CORRELATION
            )?;
            for (i, j, c) in pairs {
                writeln!(
                    out,
                    "    C({}, {}) = {:+.4}",
                    result.var_names[i], result.var_names[j], c
                )?;
            }
        }
    }

    Ok(())
}

/// Profiler sections with their share of the slowest section
pub fn profile_table(sections: &[SectionStats]) -> Table {
    let mut table = new_table(vec![
        Cell::new("section"),
        right("calls"),
        right("total"),
        right("per call"),
        right("share"),
    ]);

    let longest = sections
        .iter()
        .map(|s| s.total.as_secs_f64())
        .fold(0.0, f64::max);
    for section in sections {
        let share = if longest > 0.0 {
            format!("{:.1}%", 100.0 * section.total.as_secs_f64() / longest)
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(&section.name),
            right(section.calls),
            right(format_duration(section.total)),
            right(format_duration(section.per_call())),
            right(share),
        ]);
    }
    table
}

/// Access-path micro-benchmark results
pub fn timing_table(timings: &[AccessTiming]) -> Table {
    let mut table = new_table(vec![
        Cell::new("access path"),
        right("mean"),
        right("std. dev."),
        right("best"),
        right("overhead"),
    ]);
    for timing in timings {
        table.add_row(vec![
            Cell::new(&timing.path),
            right(format_seconds(timing.stats.mean)),
            right(format_seconds(timing.stats.std_dev)),
            right(format_seconds(timing.stats.best)),
            right(format!("{:.1}x", timing.overhead)),
        ]);
    }
    table
}

/// Fit outcome and cost per policy
pub fn comparison_table(runs: &[PolicyRun]) -> Table {
    let mut table = new_table(vec![
        Cell::new("policy"),
        Cell::new("status"),
        right("nvarys"),
        right("nfev"),
        right("redchi"),
        right("wall time"),
        right("per evaluation"),
    ]);
    for run in runs {
        table.add_row(vec![
            Cell::new(run.policy),
            Cell::new(&run.fit.message),
            right(run.fit.nvarys),
            right(run.fit.nfev),
            right(format!("{:.4}", run.fit.redchi)),
            right(format_duration(run.wall_time)),
            right(
                run.time_per_evaluation()
                    .map(format_duration)
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    table
}

/// Residual evaluation timings per policy
pub fn residual_table(timings: &[(crate::models::AmplitudePolicy, TimingStats)]) -> Table {
    let mut table = new_table(vec![Cell::new("policy"), Cell::new("one residual evaluation")]);
    for (policy, stats) in timings {
        table.add_row(vec![Cell::new(policy), Cell::new(stats)]);
    }
    table
}

/// Emit the full comparison: per-policy fit reports, profiles and timings.
pub fn print_comparison(comparison: &Comparison) {
    for run in &comparison.runs {
        emit_line(&format!("==== {} policy ====", run.policy));
        emit_lines(&fit_report(&run.fit));
        emit_lines(&profile_table(&run.profile).to_string());
    }

    emit_line("==== fits ====");
    emit_lines(&comparison_table(&comparison.runs).to_string());
    emit_line("==== residual evaluation ====");
    emit_lines(&residual_table(&comparison.residual_timings).to_string());
    emit_line("==== parameter access ====");
    emit_lines(&timing_table(&comparison.access).to_string());
}
