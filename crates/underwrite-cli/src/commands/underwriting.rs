use clap::Args;
use serde_json::Value;

use underwrite_core::underwriting::{self, UnderwritingAssumptions};

use crate::input;

/// Arguments for a single-deal underwriting run
#[derive(Args)]
pub struct UnderwriteArgs {
    /// Path to JSON assumptions file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_underwrite(args: UnderwriteArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let assumptions: UnderwritingAssumptions =
        input::read_input(args.input.as_deref(), "underwriting")?;
    log::debug!("Underwriting '{}'", assumptions.property_name);
    let result = underwriting::underwrite(&assumptions)?;
    Ok(serde_json::to_value(result)?)
}
