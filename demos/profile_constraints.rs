//! Fit the same synthetic decays under every amplitude policy and print the
//! fit reports, profiler sections and timing tables.
//!
//! ```text
//! cargo run --release --example profile_constraints [config.json]
//! ```
//!
//! Without an argument the default configuration is used: four groups of
//! three decays on `[0] ++ logspace(-1, 3, 200)` with 1% noise.

use multiexp_rs::experiment::{run_comparison, ExperimentConfig};
use multiexp_rs::report;
use multiexp_rs::timing::Timer;

fn main() -> multiexp_rs::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ExperimentConfig::load_json(path)?,
        None => ExperimentConfig::default(),
    };

    let comparison = run_comparison(&config, &Timer::new())?;
    report::print_comparison(&comparison);

    Ok(())
}
