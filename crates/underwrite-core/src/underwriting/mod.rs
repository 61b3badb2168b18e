//! Deal underwriting: assumptions → amortization → yearly cash flows → exit → returns.

pub mod amortization;
pub mod assumptions;
pub mod metrics;
pub mod projection;

use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{with_metadata, ComputationOutput};
use crate::UnderwriteResult;

pub use amortization::{AmortizationSchedule, DebtServiceYear, LoanTerms};
pub use assumptions::{
    AssumptionOverrides, OperatingExpenses, UnderwritingAssumptions, ValidatedAssumptions,
};
pub use metrics::{compute_returns, levered_cash_flows, ReturnSummary};
pub use projection::{project_cash_flows, CashFlowProjection, CashFlowYear, ExitEvent};

const MIN_COMFORTABLE_DSCR: Decimal = dec!(1.20);
const MAX_COMFORTABLE_LTV: Decimal = dec!(0.80);

/// Full underwriting result for one assumption set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingOutput {
    pub cash_flows: Vec<CashFlowYear>,
    pub exit: ExitEvent,
    pub returns: ReturnSummary,
}

/// Validate, project and measure a deal.
///
/// Validation errors are returned before any projection runs; undefined
/// metrics are reported inside the [`ReturnSummary`], with a warning for each
/// unusual credit or valuation signal.
pub fn underwrite(
    assumptions: &UnderwritingAssumptions,
) -> UnderwriteResult<ComputationOutput<UnderwritingOutput>> {
    let start = Instant::now();
    let validated = assumptions.clone().validate()?;
    let (output, warnings) = underwrite_validated(&validated)?;
    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Levered real-estate underwriting (monthly amortization, forward-NOI exit)",
        assumptions,
        warnings,
        elapsed,
        output,
    ))
}

/// Project and measure an already-validated assumption set.
/// Returns the output plus validation and credit warnings.
pub(crate) fn underwrite_validated(
    validated: &ValidatedAssumptions,
) -> UnderwriteResult<(UnderwritingOutput, Vec<String>)> {
    let projection = project_cash_flows(validated)?;
    let returns = compute_returns(validated, &projection);

    let mut warnings = validated.warnings().to_vec();
    collect_warnings(validated, &projection, &returns, &mut warnings);

    let CashFlowProjection { years, exit } = projection;
    Ok((
        UnderwritingOutput {
            cash_flows: years,
            exit,
            returns,
        },
        warnings,
    ))
}

fn collect_warnings(
    validated: &ValidatedAssumptions,
    projection: &CashFlowProjection,
    returns: &ReturnSummary,
    warnings: &mut Vec<String>,
) {
    let a = validated.assumptions();

    if let Some(dscr) = projection.first_year().and_then(|y| y.dscr.value()) {
        if dscr < MIN_COMFORTABLE_DSCR {
            warnings.push(format!(
                "Year-1 DSCR {dscr:.2}x is below {MIN_COMFORTABLE_DSCR}x; debt service is thinly covered"
            ));
        }
    }
    if let Some(ltv) = returns.loan_to_value.value() {
        if ltv > MAX_COMFORTABLE_LTV {
            warnings.push(format!(
                "LTV {:.1}% exceeds 80%; high leverage",
                ltv * dec!(100)
            ));
        }
    }
    if let Some(going_in) = returns.going_in_cap_rate.value() {
        if a.exit_cap_rate < going_in {
            warnings.push(format!(
                "Exit cap rate {} is below going-in cap rate {going_in:.4}; assumes cap rate compression",
                a.exit_cap_rate
            ));
        }
    }
    let negative_years: Vec<String> = projection
        .years
        .iter()
        .filter(|y| y.before_tax_cash_flow < Decimal::ZERO)
        .map(|y| y.year.to_string())
        .collect();
    if !negative_years.is_empty() {
        warnings.push(format!(
            "Negative before-tax cash flow in year(s) {}",
            negative_years.join(", ")
        ));
    }
    if !returns.irr.is_defined() {
        warnings.push("Levered IRR is undefined for this cash-flow profile".into());
    }
}
