use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::time_value::compound_factor;
use crate::types::{Metric, Money, Rate};
use crate::UnderwriteResult;

use super::amortization::{AmortizationSchedule, DebtServiceYear};
use super::assumptions::{UnderwritingAssumptions, ValidatedAssumptions};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    pub gross_potential_rent: Money,
    pub vacancy_loss: Money,
    pub other_income: Money,
    pub effective_gross_income: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseBreakdown {
    pub taxes: Money,
    pub insurance: Money,
    pub management: Money,
    pub reserves: Money,
    pub repairs: Money,
    pub total_expenses: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtService {
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub total_debt_service: Money,
    pub ending_loan_balance: Money,
}

impl From<&DebtServiceYear> for DebtService {
    fn from(row: &DebtServiceYear) -> Self {
        DebtService {
            interest_paid: row.interest_paid,
            principal_paid: row.principal_paid,
            total_debt_service: row.debt_service,
            ending_loan_balance: row.ending_balance,
        }
    }
}

/// One projection year. Flattened so a cash-flow table can be written
/// straight from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowYear {
    pub year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
    #[serde(flatten)]
    pub revenue: RevenueBreakdown,
    #[serde(flatten)]
    pub expenses: ExpenseBreakdown,
    pub net_operating_income: Money,
    #[serde(flatten)]
    pub debt_service: DebtService,
    pub before_tax_cash_flow: Money,
    pub cumulative_cash_flow: Money,
    pub cash_on_cash: Metric,
    pub dscr: Metric,
}

/// Terminal sale at the end of the hold period, priced on forward NOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub exit_year: u32,
    /// NOI for the year after the hold period
    pub exit_noi: Money,
    pub exit_cap_rate: Rate,
    pub gross_sale_price: Money,
    pub selling_costs: Money,
    pub net_sale_proceeds: Money,
    pub loan_payoff: Money,
    pub net_equity_proceeds: Money,
}

/// Complete projection: exactly `hold_period_years` rows plus the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowProjection {
    pub years: Vec<CashFlowYear>,
    pub exit: ExitEvent,
}

impl CashFlowProjection {
    pub fn before_tax_cash_flows(&self) -> Vec<Money> {
        self.years.iter().map(|y| y.before_tax_cash_flow).collect()
    }

    pub fn first_year(&self) -> Option<&CashFlowYear> {
        self.years.first()
    }
}

/// Operating line items for a single year, before debt.
struct OperatingYear {
    revenue: RevenueBreakdown,
    expenses: ExpenseBreakdown,
    noi: Money,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Project operating and financing cash flows for every hold year, then the
/// exit. Pure: the same validated assumptions always produce the same output.
pub fn project_cash_flows(validated: &ValidatedAssumptions) -> UnderwriteResult<CashFlowProjection> {
    let a = validated.assumptions();
    let n = a.hold_period_years;
    let equity = validated.equity_invested();

    let schedule = AmortizationSchedule::new(validated.loan_terms())?;
    let debt_rows = schedule.years(n);

    let mut years = Vec::with_capacity(n as usize);
    let mut cumulative = Decimal::ZERO;

    for (i, debt_row) in (1..=n).zip(debt_rows.iter()) {
        let op = operating_year(a, i)?;
        let debt = DebtService::from(debt_row);
        let before_tax_cash_flow = op.noi - debt.total_debt_service;
        cumulative += before_tax_cash_flow;

        years.push(CashFlowYear {
            year: i,
            period_end: period_end(a.acquisition_date, i)?,
            cash_on_cash: Metric::ratio(
                before_tax_cash_flow,
                equity,
                "cash-on-cash: equity invested is zero",
            ),
            dscr: Metric::ratio(op.noi, debt.total_debt_service, "DSCR: no debt service"),
            revenue: op.revenue,
            expenses: op.expenses,
            net_operating_income: op.noi,
            debt_service: debt,
            before_tax_cash_flow,
            cumulative_cash_flow: cumulative,
        });
    }

    let loan_payoff = debt_rows
        .last()
        .map(|r| r.ending_balance)
        .unwrap_or(a.loan_amount);
    let exit = exit_event(a, loan_payoff)?;

    log::debug!(
        "Projected {} years for '{}': cumulative BTCF {}, net equity proceeds {}",
        years.len(),
        a.property_name,
        cumulative,
        exit.net_equity_proceeds
    );

    Ok(CashFlowProjection { years, exit })
}

/// Revenue, expenses and NOI for year `i` (1-indexed), grown by (1+g)^(i-1).
fn operating_year(a: &UnderwritingAssumptions, i: u32) -> UnderwriteResult<OperatingYear> {
    let periods = i - 1;
    let rent_factor = growth_factor("rent_growth_rate", a.rent_growth_rate, periods)?;
    let expense_factor = growth_factor("expense_growth_rate", a.expense_growth_rate, periods)?;
    let other_factor = growth_factor(
        "other_income_growth_rate",
        a.effective_other_income_growth(),
        periods,
    )?;

    let gross_potential_rent = a.gross_potential_rent * rent_factor;
    let vacancy_loss = gross_potential_rent * a.vacancy_rate;
    let other_income = a.other_income * other_factor;
    let effective_gross_income = gross_potential_rent - vacancy_loss + other_income;

    let grown = a.operating_expenses.scaled(expense_factor);
    let total_expenses = grown.total();
    let noi = effective_gross_income - total_expenses;

    Ok(OperatingYear {
        revenue: RevenueBreakdown {
            gross_potential_rent,
            vacancy_loss,
            other_income,
            effective_gross_income,
        },
        expenses: ExpenseBreakdown {
            taxes: grown.taxes,
            insurance: grown.insurance,
            management: grown.management,
            reserves: grown.reserves,
            repairs: grown.repairs,
            total_expenses,
        },
        noi,
    })
}

fn growth_factor(field: &str, rate: Rate, periods: u32) -> UnderwriteResult<Decimal> {
    compound_factor(rate, periods)
        .ok_or_else(|| UnderwriteError::invalid(field, "Growth compounding overflow"))
}

/// Sale priced on NOI one year beyond the hold period.
fn exit_event(a: &UnderwritingAssumptions, loan_payoff: Money) -> UnderwriteResult<ExitEvent> {
    let exit_year = a.hold_period_years;
    let forward = operating_year(a, exit_year + 1)?;

    if a.exit_cap_rate.is_zero() {
        return Err(UnderwriteError::DivisionByZero {
            context: "exit valuation (forward NOI / exit_cap_rate)".into(),
        });
    }
    let gross_sale_price = forward.noi / a.exit_cap_rate;
    let selling_costs = gross_sale_price * a.selling_cost_rate;
    let net_sale_proceeds = gross_sale_price - selling_costs;

    Ok(ExitEvent {
        exit_year,
        exit_noi: forward.noi,
        exit_cap_rate: a.exit_cap_rate,
        gross_sale_price,
        selling_costs,
        net_sale_proceeds,
        loan_payoff,
        net_equity_proceeds: net_sale_proceeds - loan_payoff,
    })
}

fn period_end(acquisition: Option<NaiveDate>, year: u32) -> UnderwriteResult<Option<NaiveDate>> {
    match acquisition {
        None => Ok(None),
        Some(date) => date
            .checked_add_months(Months::new(year * 12))
            .map(Some)
            .ok_or_else(|| UnderwriteError::DateError(format!("Year {year} end date out of range"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::underwriting::test_support::sample_assumptions;
    use rust_decimal_macros::dec;

    fn project(a: UnderwritingAssumptions) -> CashFlowProjection {
        project_cash_flows(&a.validate().unwrap()).unwrap()
    }

    #[test]
    fn test_length_equals_hold_period() {
        for hold in [1u32, 3, 5, 10] {
            let mut a = sample_assumptions();
            a.hold_period_years = hold;
            a.loan_term_years = 10;
            assert_eq!(project(a).years.len(), hold as usize);
        }
    }

    #[test]
    fn test_year_one_noi() {
        let p = project(sample_assumptions());
        let y1 = &p.years[0];
        assert_eq!(y1.revenue.vacancy_loss, dec!(41000));
        assert_eq!(y1.revenue.effective_gross_income, dec!(794000));
        assert_eq!(y1.expenses.total_expenses, dec!(263950));
        assert_eq!(y1.net_operating_income, dec!(530050));
    }

    #[test]
    fn test_growth_applied_from_year_two() {
        let p = project(sample_assumptions());
        assert_eq!(p.years[1].revenue.gross_potential_rent, dec!(844600));
        assert_eq!(p.years[1].expenses.taxes, dec!(123000));
    }

    #[test]
    fn test_exit_uses_forward_noi() {
        let a = sample_assumptions();
        let p = project(a.clone());
        let forward = operating_year(&a, a.hold_period_years + 1).unwrap().noi;
        let last = p.years.last().unwrap().net_operating_income;
        assert_eq!(p.exit.exit_noi, forward);
        assert!(p.exit.exit_noi > last);
        assert_eq!(p.exit.gross_sale_price, forward / dec!(0.055));
        assert_eq!(
            p.exit.net_equity_proceeds,
            p.exit.gross_sale_price - p.exit.selling_costs - p.exit.loan_payoff
        );
    }

    #[test]
    fn test_loan_payoff_is_balloon_balance() {
        let p = project(sample_assumptions());
        let last = p.years.last().unwrap();
        assert_eq!(p.exit.loan_payoff, last.debt_service.ending_loan_balance);
        assert!(p.exit.loan_payoff > dec!(7800000));
    }

    #[test]
    fn test_cumulative_is_running_sum() {
        let p = project(sample_assumptions());
        let mut running = Decimal::ZERO;
        for y in &p.years {
            running += y.before_tax_cash_flow;
            assert_eq!(y.cumulative_cash_flow, running);
        }
    }

    #[test]
    fn test_cumulative_non_decreasing_when_cash_flows_positive() {
        let mut a = sample_assumptions();
        a.loan_amount = dec!(5000000);
        let p = project(a);
        assert!(p.years.iter().all(|y| y.before_tax_cash_flow >= Decimal::ZERO));
        for w in p.years.windows(2) {
            assert!(w[1].cumulative_cash_flow >= w[0].cumulative_cash_flow);
        }
    }

    #[test]
    fn test_all_cash_deal_has_undefined_dscr() {
        let mut a = sample_assumptions();
        a.loan_amount = Decimal::ZERO;
        let p = project(a);
        assert!(!p.years[0].dscr.is_defined());
        assert_eq!(p.exit.loan_payoff, Decimal::ZERO);
    }

    #[test]
    fn test_period_end_dates() {
        let mut a = sample_assumptions();
        a.acquisition_date = NaiveDate::from_ymd_opt(2024, 3, 31);
        let p = project(a);
        assert_eq!(p.years[0].period_end, NaiveDate::from_ymd_opt(2025, 3, 31));
        assert_eq!(p.years[4].period_end, NaiveDate::from_ymd_opt(2029, 3, 31));
    }

    #[test]
    fn test_projection_is_pure() {
        let v = sample_assumptions().validate().unwrap();
        assert_eq!(project_cash_flows(&v).unwrap(), project_cash_flows(&v).unwrap());
    }
}
