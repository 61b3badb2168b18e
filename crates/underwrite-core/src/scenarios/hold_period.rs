use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::types::{with_metadata, ComputationOutput, Metric, Money};
use crate::underwriting::assumptions::MAX_HOLD_PERIOD_YEARS;
use crate::underwriting::AssumptionOverrides;
use crate::UnderwriteResult;

use super::runner::Evaluate;
use super::sensitivity::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPeriodInput {
    pub min_years: u32,
    pub max_years: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPeriodRow {
    pub hold_period_years: u32,
    pub irr: Metric,
    pub equity_multiple: Metric,
    pub total_profit: Money,
    pub net_equity_proceeds: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp_irr: Option<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPeriodAnalysis {
    pub rows: Vec<HoldPeriodRow>,
    /// Year with the highest defined levered IRR (earliest on ties)
    pub best_irr_year: Option<u32>,
    /// Year with the highest total profit (earliest on ties)
    pub best_total_profit_year: Option<u32>,
    pub completed: usize,
    pub total: usize,
    /// Set when a cancellation left later years unevaluated
    pub cancelled: bool,
}

/// Re-run the full pipeline once per exit year in `[min_years, max_years]`.
///
/// On cancellation the years already evaluated are kept and the best-year
/// picks cover those rows only.
pub fn sweep_hold_periods<E: Evaluate + ?Sized>(
    evaluator: &E,
    input: &HoldPeriodInput,
    cancel: Option<&CancellationToken>,
) -> UnderwriteResult<ComputationOutput<HoldPeriodAnalysis>> {
    let start = Instant::now();
    if input.min_years < 1 || input.min_years > input.max_years {
        return Err(UnderwriteError::invalid(
            "min_years",
            "Hold period range must satisfy 1 <= min_years <= max_years",
        ));
    }
    if input.max_years > MAX_HOLD_PERIOD_YEARS {
        return Err(UnderwriteError::invalid(
            "max_years",
            format!("Hold period cannot exceed {MAX_HOLD_PERIOD_YEARS} years"),
        ));
    }

    let total = (input.max_years - input.min_years + 1) as usize;
    let mut rows = Vec::with_capacity(total);
    let mut warnings = Vec::new();

    for years in input.min_years..=input.max_years {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            break;
        }
        let overrides = AssumptionOverrides {
            hold_period_years: Some(years),
            ..Default::default()
        };
        let outcome = evaluator.evaluate(&overrides)?;
        let deal = &outcome.assumptions;
        if deal.loan_amount > Decimal::ZERO && years > deal.loan_term_years {
            warnings.push(format!("Year {years}: exit falls after loan maturity"));
        }
        rows.push(HoldPeriodRow {
            hold_period_years: years,
            irr: outcome.returns.irr.clone(),
            equity_multiple: outcome.returns.equity_multiple.clone(),
            total_profit: outcome.returns.total_profit,
            net_equity_proceeds: outcome.exit.net_equity_proceeds,
            lp_irr: outcome.waterfall.as_ref().map(|w| w.lp_irr.clone()),
        });
    }

    let completed = rows.len();
    let cancelled = completed < total;
    if cancelled {
        warnings.push(format!(
            "Sweep cancelled: {completed} of {total} hold periods evaluated"
        ));
    }

    let best_irr_year = argmax(&rows, |r| r.irr.value());
    let best_total_profit_year = argmax(&rows, |r| Some(r.total_profit));
    if best_irr_year.is_none() && completed > 0 {
        warnings.push("No hold period produced a defined IRR".into());
    }

    let analysis = HoldPeriodAnalysis {
        rows,
        best_irr_year,
        best_total_profit_year,
        completed,
        total,
        cancelled,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Hold-period sweep (full pipeline per exit year)",
        input,
        warnings,
        elapsed,
        analysis,
    ))
}

/// Earliest year holding the maximum of `key`, skipping rows where it is absent.
fn argmax<F>(rows: &[HoldPeriodRow], key: F) -> Option<u32>
where
    F: Fn(&HoldPeriodRow) -> Option<Decimal>,
{
    let mut best: Option<(u32, Decimal)> = None;
    for row in rows {
        if let Some(v) = key(row) {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((row.hold_period_years, v));
            }
        }
    }
    best.map(|(year, _)| year)
}
