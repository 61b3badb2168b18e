use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::types::{with_metadata, ComputationOutput, Metric};
use crate::underwriting::{AssumptionOverrides, ReturnSummary, UnderwritingAssumptions};
use crate::UnderwriteResult;

use super::runner::{Evaluate, OutputMetric};
use super::thresholds::{Severity, ThresholdTable};

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// An assumption a sweep axis can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssumptionField {
    PurchasePrice,
    GrossPotentialRent,
    VacancyRate,
    OtherIncome,
    LoanAmount,
    InterestRate,
    AmortizationYears,
    HoldPeriodYears,
    ExitCapRate,
    SellingCostRate,
    RentGrowthRate,
    ExpenseGrowthRate,
}

impl AssumptionField {
    /// `overrides` with this field set to `value`. Year fields must be
    /// positive whole numbers.
    pub fn override_with(
        self,
        overrides: AssumptionOverrides,
        value: Decimal,
    ) -> UnderwriteResult<AssumptionOverrides> {
        let mut o = overrides;
        match self {
            AssumptionField::PurchasePrice => o.purchase_price = Some(value),
            AssumptionField::GrossPotentialRent => o.gross_potential_rent = Some(value),
            AssumptionField::VacancyRate => o.vacancy_rate = Some(value),
            AssumptionField::OtherIncome => o.other_income = Some(value),
            AssumptionField::LoanAmount => o.loan_amount = Some(value),
            AssumptionField::InterestRate => o.interest_rate = Some(value),
            AssumptionField::AmortizationYears => o.amortization_years = Some(self.years(value)?),
            AssumptionField::HoldPeriodYears => o.hold_period_years = Some(self.years(value)?),
            AssumptionField::ExitCapRate => o.exit_cap_rate = Some(value),
            AssumptionField::SellingCostRate => o.selling_cost_rate = Some(value),
            AssumptionField::RentGrowthRate => o.rent_growth_rate = Some(value),
            AssumptionField::ExpenseGrowthRate => o.expense_growth_rate = Some(value),
        }
        Ok(o)
    }

    /// Current value of this field in `a`, if set.
    pub fn base_value(self, a: &UnderwritingAssumptions) -> Option<Decimal> {
        match self {
            AssumptionField::PurchasePrice => a.purchase_price,
            AssumptionField::GrossPotentialRent => Some(a.gross_potential_rent),
            AssumptionField::VacancyRate => Some(a.vacancy_rate),
            AssumptionField::OtherIncome => Some(a.other_income),
            AssumptionField::LoanAmount => Some(a.loan_amount),
            AssumptionField::InterestRate => Some(a.interest_rate),
            AssumptionField::AmortizationYears => Some(Decimal::from(a.amortization_years)),
            AssumptionField::HoldPeriodYears => Some(Decimal::from(a.hold_period_years)),
            AssumptionField::ExitCapRate => Some(a.exit_cap_rate),
            AssumptionField::SellingCostRate => Some(a.selling_cost_rate),
            AssumptionField::RentGrowthRate => Some(a.rent_growth_rate),
            AssumptionField::ExpenseGrowthRate => Some(a.expense_growth_rate),
        }
    }

    fn years(self, value: Decimal) -> UnderwriteResult<u32> {
        if value.fract() != Decimal::ZERO || value < Decimal::ONE {
            return Err(UnderwriteError::invalid(
                format!("{self:?}"),
                format!("{value} is not a whole number of years"),
            ));
        }
        value
            .to_u32()
            .ok_or_else(|| UnderwriteError::invalid(format!("{self:?}"), "Year count out of range"))
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag that tells a running sweep to abandon cells it has not
/// started. Cells already evaluated are kept.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Grid types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGridInput {
    pub x_field: AssumptionField,
    pub y_field: AssumptionField,
    pub x_values: Vec<Decimal>,
    pub y_values: Vec<Decimal>,
    pub output_metric: OutputMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    Evaluated,
    Failed { reason: String },
    /// Abandoned after cancellation
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Index into `y_values`
    pub row: usize,
    /// Index into `x_values`
    pub col: usize,
    pub x_value: Decimal,
    pub y_value: Decimal,
    #[serde(flatten)]
    pub status: CellStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Metric>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ReturnSummary>,
}

impl GridCell {
    fn pending(row: usize, col: usize, x_value: Decimal, y_value: Decimal) -> Self {
        GridCell {
            row,
            col,
            x_value,
            y_value,
            status: CellStatus::Skipped,
            value: None,
            severity: Severity::Undefined,
            returns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub x_field: AssumptionField,
    pub y_field: AssumptionField,
    pub x_values: Vec<Decimal>,
    pub y_values: Vec<Decimal>,
    pub output_metric: OutputMetric,
    /// `cells[row][col]`, rows follow `y_values`
    pub cells: Vec<Vec<GridCell>>,
    /// `(row, col)` of the cell whose axis values equal the base assumptions
    pub base_cell: Option<(usize, usize)>,
    pub completed: usize,
    pub total: usize,
    pub cancelled: bool,
}

impl SensitivityGrid {
    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }
}

/// Optional hooks for a grid run.
#[derive(Default)]
pub struct GridOptions<'a> {
    pub cancel: Option<&'a CancellationToken>,
    /// Called once per finished cell, from whichever worker finished it
    pub on_cell: Option<&'a (dyn Fn(&GridCell) + Sync)>,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate `output_metric` for every `(x, y)` pair, one full pipeline run
/// per cell, and colour each cell from `thresholds`.
///
/// A failing cell is recorded in place and never aborts the grid. With the
/// `parallel` feature cells run on the rayon pool; the grid is assembled
/// once every worker has returned.
pub fn evaluate_grid<E: Evaluate + ?Sized>(
    evaluator: &E,
    input: &SensitivityGridInput,
    thresholds: &ThresholdTable,
    options: &GridOptions<'_>,
) -> UnderwriteResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();
    validate_grid(input)?;

    let coords: Vec<(usize, usize)> = (0..input.y_values.len())
        .flat_map(|row| (0..input.x_values.len()).map(move |col| (row, col)))
        .collect();
    let total = coords.len();
    let completed = AtomicUsize::new(0);

    let eval_cell = |&(row, col): &(usize, usize)| -> GridCell {
        let x = input.x_values[col];
        let y = input.y_values[row];
        let mut cell = GridCell::pending(row, col, x, y);
        if options.cancel.is_some_and(CancellationToken::is_cancelled) {
            return cell;
        }

        let outcome = input
            .x_field
            .override_with(AssumptionOverrides::default(), x)
            .and_then(|o| input.y_field.override_with(o, y))
            .and_then(|o| evaluator.evaluate(&o));

        match outcome {
            Ok(outcome) => {
                let value = outcome.metric(input.output_metric);
                cell.severity = thresholds.classify(input.output_metric, &value);
                cell.value = Some(value);
                cell.returns = Some(outcome.returns);
                cell.status = CellStatus::Evaluated;
            }
            Err(e) => {
                log::debug!("Grid cell ({x}, {y}) failed: {e}");
                cell.status = CellStatus::Failed {
                    reason: e.to_string(),
                };
            }
        }
        completed.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = options.on_cell {
            callback(&cell);
        }
        cell
    };

    #[cfg(feature = "parallel")]
    let evaluated: Vec<GridCell> = coords.par_iter().map(eval_cell).collect();
    #[cfg(not(feature = "parallel"))]
    let evaluated: Vec<GridCell> = coords.iter().map(eval_cell).collect();

    let mut warnings = Vec::new();
    let mut cells: Vec<Vec<GridCell>> = input
        .y_values
        .iter()
        .map(|_| Vec::with_capacity(input.x_values.len()))
        .collect();
    for cell in evaluated {
        if let CellStatus::Failed { reason } = &cell.status {
            warnings.push(format!(
                "Cell ({}, {}) failed: {reason}",
                cell.x_value, cell.y_value
            ));
        }
        cells[cell.row].push(cell);
    }

    let completed = completed.into_inner();
    let cancelled = completed < total;
    if cancelled {
        warnings.push(format!(
            "Grid cancelled: {completed} of {total} cells evaluated"
        ));
    }

    let base = evaluator.base_assumptions();
    let base_cell = match (
        input.x_field.base_value(base).and_then(|b| position(&input.x_values, b)),
        input.y_field.base_value(base).and_then(|b| position(&input.y_values, b)),
    ) {
        (Some(col), Some(row)) => Some((row, col)),
        _ => None,
    };

    log::info!(
        "Sensitivity grid {:?} x {:?}: {completed}/{total} cells",
        input.x_field,
        input.y_field
    );

    let grid = SensitivityGrid {
        x_field: input.x_field,
        y_field: input.y_field,
        x_values: input.x_values.clone(),
        y_values: input.y_values.clone(),
        output_metric: input.output_metric,
        cells,
        base_cell,
        completed,
        total,
        cancelled,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Two-way sensitivity grid (full pipeline per cell)",
        input,
        warnings,
        elapsed,
        grid,
    ))
}

fn validate_grid(input: &SensitivityGridInput) -> UnderwriteResult<()> {
    if input.x_values.is_empty() {
        return Err(UnderwriteError::invalid("x_values", "At least one value is required"));
    }
    if input.y_values.is_empty() {
        return Err(UnderwriteError::invalid("y_values", "At least one value is required"));
    }
    if input.x_field == input.y_field {
        return Err(UnderwriteError::invalid(
            "y_field",
            "The two axes must vary different assumptions",
        ));
    }
    Ok(())
}

fn position(values: &[Decimal], target: Decimal) -> Option<usize> {
    values.iter().position(|v| *v == target)
}
