use clap::Args;
use serde_json::Value;

use underwrite_core::waterfall::{self, WaterfallInput};

use crate::input;

/// Arguments for an equity waterfall distribution
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON file with `structure`, `annual_cash_flows` and `sale_proceeds`
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let wf_input: WaterfallInput = input::read_input(args.input.as_deref(), "waterfall")?;
    let result = waterfall::calculate_waterfall(&wf_input)?;
    Ok(serde_json::to_value(result)?)
}
