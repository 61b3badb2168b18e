use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::time_value::irr_metric;
use crate::types::{Metric, Money, Rate, UndefinedReason};

use super::assumptions::ValidatedAssumptions;
use super::projection::CashFlowProjection;

/// Scalar return aggregate for one underwriting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub purchase_price: Money,
    pub equity_invested: Money,
    pub loan_to_value: Metric,
    /// Year-one NOI / purchase price
    pub going_in_cap_rate: Metric,
    pub exit_cap_rate: Rate,
    /// Sum of yearly before-tax cash flows plus net equity proceeds at exit
    pub total_cash_distributed: Money,
    pub total_profit: Money,
    /// Levered IRR on equity
    pub irr: Metric,
    /// Property-level IRR before debt
    pub unlevered_irr: Metric,
    pub equity_multiple: Metric,
    pub avg_cash_on_cash: Metric,
    pub avg_dscr: Metric,
    pub min_dscr: Metric,
    /// Year-one NOI / loan amount
    pub debt_yield: Metric,
    /// Year-one operating expenses / effective gross income
    pub operating_expense_ratio: Metric,
    /// (Year-one expenses + debt service) / (GPR + other income)
    pub break_even_occupancy: Metric,
}

/// Signed equity cash-flow vector:
/// `[-equity, CF_1, ..., CF_n + net equity proceeds]`.
pub fn levered_cash_flows(equity_invested: Money, projection: &CashFlowProjection) -> Vec<Money> {
    let mut flows = Vec::with_capacity(projection.years.len() + 1);
    flows.push(-equity_invested);
    flows.extend(projection.years.iter().map(|y| y.before_tax_cash_flow));
    if let Some(last) = flows.last_mut() {
        *last += projection.exit.net_equity_proceeds;
    }
    flows
}

/// Property-level vector: `[-(price + closing), NOI_1, ..., NOI_n + net sale proceeds]`.
pub fn unlevered_cash_flows(
    all_in_cost: Money,
    projection: &CashFlowProjection,
) -> Vec<Money> {
    let mut flows = Vec::with_capacity(projection.years.len() + 1);
    flows.push(-all_in_cost);
    flows.extend(projection.years.iter().map(|y| y.net_operating_income));
    if let Some(last) = flows.last_mut() {
        *last += projection.exit.net_sale_proceeds;
    }
    flows
}

/// Derive every return metric from a projection. Ratios with nothing to
/// divide by come back as [`Metric::Undefined`], never as zero.
pub fn compute_returns(
    validated: &ValidatedAssumptions,
    projection: &CashFlowProjection,
) -> ReturnSummary {
    let a = validated.assumptions();
    let price = validated.purchase_price();
    let equity = validated.equity_invested();

    let total_cash_distributed: Money = projection
        .years
        .iter()
        .map(|y| y.before_tax_cash_flow)
        .sum::<Money>()
        + projection.exit.net_equity_proceeds;

    let irr = if equity > Decimal::ZERO {
        irr_metric(&levered_cash_flows(equity, projection), "levered IRR")
    } else {
        Metric::undefined(
            UndefinedReason::ZeroDenominator,
            "levered IRR: no equity invested",
        )
    };
    let unlevered_irr = irr_metric(
        &unlevered_cash_flows(price + a.closing_costs, projection),
        "unlevered IRR",
    );

    let min_dscr = projection
        .years
        .iter()
        .filter_map(|y| y.dscr.value())
        .min()
        .map(Metric::defined)
        .unwrap_or_else(|| {
            Metric::undefined(UndefinedReason::ZeroDenominator, "min DSCR: no debt service")
        });

    let (noi_1, expenses_1, egi_1, potential_1, debt_service_1) = match projection.first_year() {
        Some(y) => (
            y.net_operating_income,
            y.expenses.total_expenses,
            y.revenue.effective_gross_income,
            y.revenue.gross_potential_rent + y.revenue.other_income,
            y.debt_service.total_debt_service,
        ),
        None => Default::default(),
    };

    ReturnSummary {
        purchase_price: price,
        equity_invested: equity,
        loan_to_value: Metric::ratio(a.loan_amount, price, "LTV: purchase price is zero"),
        going_in_cap_rate: Metric::ratio(noi_1, price, "going-in cap rate: purchase price is zero"),
        exit_cap_rate: a.exit_cap_rate,
        total_cash_distributed,
        total_profit: total_cash_distributed - equity,
        irr,
        unlevered_irr,
        equity_multiple: Metric::ratio(
            total_cash_distributed,
            equity,
            "equity multiple: equity invested is zero",
        ),
        avg_cash_on_cash: Metric::mean(
            projection.years.iter().map(|y| &y.cash_on_cash),
            "average cash-on-cash: equity invested is zero",
        ),
        avg_dscr: Metric::mean(
            projection.years.iter().map(|y| &y.dscr),
            "average DSCR: no debt service",
        ),
        min_dscr,
        debt_yield: Metric::ratio(noi_1, a.loan_amount, "debt yield: no loan"),
        operating_expense_ratio: Metric::ratio(
            expenses_1,
            egi_1,
            "expense ratio: effective gross income is zero",
        ),
        break_even_occupancy: Metric::ratio(
            expenses_1 + debt_service_1,
            potential_1,
            "break-even occupancy: potential income is zero",
        ),
    }
}
