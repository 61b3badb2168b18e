use clap::Args;
use serde_json::Value;

use underwrite_core::scenarios::{
    self, GridOptions, HoldPeriodRequest, ScenarioSetRequest, SensitivityRequest, ThresholdTable,
};

use crate::input;

/// Arguments for a named scenario set
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to JSON file with `base`, optional `waterfall`, and `scenarios`
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a two-way sensitivity grid
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to JSON file with `base`, optional `waterfall`, and `grid`
    #[arg(long)]
    pub input: Option<String>,

    /// Severity bands as JSON or YAML (defaults apply when omitted)
    #[arg(long)]
    pub thresholds: Option<String>,
}

/// Arguments for a hold-period sweep
#[derive(Args)]
pub struct HoldPeriodArgs {
    /// Path to JSON file with `base`, optional `waterfall`, `min_years` and `max_years`
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let set: ScenarioSetRequest = input::read_input(args.input.as_deref(), "scenario analysis")?;
    let runner = set.deal.into_runner()?;
    let result = scenarios::run_scenarios(&runner, &set.scenarios)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let run: SensitivityRequest = input::read_input(args.input.as_deref(), "sensitivity analysis")?;
    let thresholds: ThresholdTable = match args.thresholds {
        Some(ref path) => input::file::read_config(path)?,
        None => ThresholdTable::default(),
    };
    let runner = run.deal.into_runner()?;
    let result = scenarios::evaluate_grid(&runner, &run.grid, &thresholds, &GridOptions::default())?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_hold_period(args: HoldPeriodArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let run: HoldPeriodRequest = input::read_input(args.input.as_deref(), "hold-period sweep")?;
    let runner = run.deal.into_runner()?;
    let result = scenarios::sweep_hold_periods(&runner, &run.range, None)?;
    Ok(serde_json::to_value(result)?)
}
