//! LP/GP equity waterfall: return of capital, preferred return, GP catch-up,
//! IRR-hurdle promote tiers and an optional lookback.

pub mod engine;
pub mod structure;

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::types::{with_metadata, ComputationOutput, Money};
use crate::UnderwriteResult;

pub use engine::{distribute, ClassDistribution, WaterfallDistribution, YearlyDistribution};
pub use structure::{Hurdle, PromoteTier, ShareClass, ValidatedWaterfall, WaterfallStructure};

/// Cash to distribute: one entry per year, plus sale proceeds received in
/// the final year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    pub structure: WaterfallStructure,
    pub annual_cash_flows: Vec<Money>,
    #[serde(default)]
    pub sale_proceeds: Money,
}

/// Validate the structure, then distribute every year's cash.
///
/// Malformed tiers or share classes are rejected before any cash moves.
pub fn calculate_waterfall(
    input: &WaterfallInput,
) -> UnderwriteResult<ComputationOutput<WaterfallDistribution>> {
    let start = Instant::now();
    let validated = input.structure.clone().validate()?;
    let (distribution, warnings) =
        distribute(&validated, &input.annual_cash_flows, input.sale_proceeds)?;
    let elapsed = start.elapsed().as_micros() as u64;

    let methodology = if validated.is_per_class() {
        "Equity waterfall (per-class priority, pooled promote tiers)"
    } else {
        "Equity waterfall (pooled LP/GP, IRR-hurdle promote tiers)"
    };
    Ok(with_metadata(methodology, input, warnings, elapsed, distribution))
}
