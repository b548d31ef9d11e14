use anyhow::{Context, Result};
use compressor_dispatch::sweep::{run_sweep, SweepReport};
use compressor_dispatch::{config, telemetry};
use compressor_dispatch::{CounterfactualDispatch, CounterfactualGenerator, MilpOptimizer};
use config::Config;
use serde_json::json;
use telemetry::init_tracing;
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };

    let fleet = cfg.fleet.compressors.clone();
    info!(units = fleet.len(), "starting compressor dispatch sweep");

    let mut optimizer = MilpOptimizer::new(fleet.clone());
    optimizer.setup().context("building MILP model")?;
    let optimal = run_sweep(&mut optimizer, &cfg.sweep)?;

    let policy = cfg.counterfactual.policy(&fleet)?;
    let generator = CounterfactualGenerator::new(fleet)?;
    let mut counterfactual = CounterfactualDispatch::new(generator, policy);
    let baseline = run_sweep(&mut counterfactual, &cfg.sweep)?;

    let gap = SweepReport::power_gap(&optimal, &baseline);

    let output = json!({
        "optimal": optimal,
        "counterfactual": baseline,
        "power_gap": gap,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
