use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::types::{Money, Rate};
use crate::UnderwriteResult;

use super::amortization::{LoanTerms, MAX_LOAN_YEARS};

/// Selling costs (brokerage, transfer taxes, legal) as a share of gross sale price.
pub const DEFAULT_SELLING_COST_RATE: Rate = dec!(0.02);

/// Longest hold period accepted by the projector.
pub const MAX_HOLD_PERIOD_YEARS: u32 = 50;

/// Tolerance when checking a supplied LTV against the supplied price.
const LTV_MISMATCH_TOLERANCE: Rate = dec!(0.005);

fn default_selling_cost_rate() -> Rate {
    DEFAULT_SELLING_COST_RATE
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Year-one operating expense lines. Each line grows at the expense growth rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingExpenses {
    pub taxes: Money,
    pub insurance: Money,
    pub management: Money,
    pub reserves: Money,
    pub repairs: Money,
}

impl OperatingExpenses {
    pub fn total(&self) -> Money {
        self.taxes + self.insurance + self.management + self.reserves + self.repairs
    }

    /// Every line scaled by `factor`.
    pub fn scaled(&self, factor: Decimal) -> OperatingExpenses {
        OperatingExpenses {
            taxes: self.taxes * factor,
            insurance: self.insurance * factor,
            management: self.management * factor,
            reserves: self.reserves * factor,
            repairs: self.repairs * factor,
        }
    }

    fn lines(&self) -> [(&'static str, Money); 5] {
        [
            ("operating_expenses.taxes", self.taxes),
            ("operating_expenses.insurance", self.insurance),
            ("operating_expenses.management", self.management),
            ("operating_expenses.reserves", self.reserves),
            ("operating_expenses.repairs", self.repairs),
        ]
    }
}

/// Immutable underwriting input snapshot for one deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderwritingAssumptions {
    /// Property identifier
    #[serde(default)]
    pub property_name: String,
    /// Closing date; when present each projection year carries a period-end date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_date: Option<NaiveDate>,
    /// Acquisition price. Derived from `loan_amount / loan_to_value` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    /// Loan-to-value at acquisition (used only to derive a missing price)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_to_value: Option<Rate>,
    /// Acquisition closing costs funded with equity
    #[serde(default)]
    pub closing_costs: Money,
    /// Year-one gross potential rent
    pub gross_potential_rent: Money,
    /// Vacancy and collection loss (fraction of GPR)
    pub vacancy_rate: Rate,
    /// Parking, laundry, fees, etc.
    #[serde(default)]
    pub other_income: Money,
    pub operating_expenses: OperatingExpenses,
    pub loan_amount: Money,
    /// Annual note rate, compounded monthly
    pub interest_rate: Rate,
    pub amortization_years: u32,
    /// Loan maturity (balloon date) in years
    pub loan_term_years: u32,
    /// Initial interest-only period in years
    #[serde(default)]
    pub interest_only_years: u32,
    pub hold_period_years: u32,
    pub exit_cap_rate: Rate,
    #[serde(default = "default_selling_cost_rate")]
    pub selling_cost_rate: Rate,
    pub rent_growth_rate: Rate,
    pub expense_growth_rate: Rate,
    /// Growth for other income; falls back to `rent_growth_rate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_income_growth_rate: Option<Rate>,
}

impl UnderwritingAssumptions {
    /// Validate once and freeze into a [`ValidatedAssumptions`].
    pub fn validate(self) -> UnderwriteResult<ValidatedAssumptions> {
        ValidatedAssumptions::new(self)
    }

    pub fn effective_other_income_growth(&self) -> Rate {
        self.other_income_growth_rate.unwrap_or(self.rent_growth_rate)
    }
}

/// Assumptions that passed validation, with the derived purchase price and
/// equity requirement. Construction is the only place validation runs.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedAssumptions {
    assumptions: UnderwritingAssumptions,
    purchase_price: Money,
    equity_invested: Money,
    warnings: Vec<String>,
}

impl ValidatedAssumptions {
    pub fn new(assumptions: UnderwritingAssumptions) -> UnderwriteResult<Self> {
        let mut warnings = Vec::new();
        validate_ranges(&assumptions)?;
        let purchase_price = resolve_purchase_price(&assumptions, &mut warnings)?;

        if assumptions.loan_amount > purchase_price {
            return Err(UnderwriteError::invalid(
                "loan_amount",
                format!(
                    "Loan amount {} exceeds purchase price {}",
                    assumptions.loan_amount, purchase_price
                ),
            ));
        }

        let equity_invested = purchase_price + assumptions.closing_costs - assumptions.loan_amount;

        if assumptions.loan_amount > Decimal::ZERO
            && assumptions.hold_period_years > assumptions.loan_term_years
        {
            warnings.push(format!(
                "Loan matures in year {} before the year-{} exit; balloon assumed refinanced on the same terms",
                assumptions.loan_term_years, assumptions.hold_period_years
            ));
        }
        if assumptions.vacancy_rate > dec!(0.15) {
            warnings.push(format!(
                "Vacancy rate {:.1}% exceeds 15%, above typical market norms",
                assumptions.vacancy_rate * dec!(100)
            ));
        }

        Ok(ValidatedAssumptions {
            assumptions,
            purchase_price,
            equity_invested,
            warnings,
        })
    }

    pub fn assumptions(&self) -> &UnderwritingAssumptions {
        &self.assumptions
    }

    pub fn purchase_price(&self) -> Money {
        self.purchase_price
    }

    /// Purchase price plus closing costs less loan proceeds.
    pub fn equity_invested(&self) -> Money {
        self.equity_invested
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn loan_terms(&self) -> LoanTerms {
        LoanTerms {
            principal: self.assumptions.loan_amount,
            annual_rate: self.assumptions.interest_rate,
            amortization_years: self.assumptions.amortization_years,
            interest_only_years: self.assumptions.interest_only_years,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn require_non_negative(field: &str, value: Decimal) -> UnderwriteResult<()> {
    if value < Decimal::ZERO {
        return Err(UnderwriteError::invalid(field, "Must not be negative"));
    }
    Ok(())
}

fn validate_ranges(a: &UnderwritingAssumptions) -> UnderwriteResult<()> {
    if a.hold_period_years < 1 {
        return Err(UnderwriteError::invalid(
            "hold_period_years",
            "Holding period must be at least 1 year",
        ));
    }
    if a.hold_period_years > MAX_HOLD_PERIOD_YEARS {
        return Err(UnderwriteError::invalid(
            "hold_period_years",
            format!("Holding period cannot exceed {MAX_HOLD_PERIOD_YEARS} years"),
        ));
    }
    if a.gross_potential_rent <= Decimal::ZERO {
        return Err(UnderwriteError::invalid(
            "gross_potential_rent",
            "Gross potential rent must be positive",
        ));
    }
    if a.vacancy_rate < Decimal::ZERO || a.vacancy_rate >= Decimal::ONE {
        return Err(UnderwriteError::invalid(
            "vacancy_rate",
            "Vacancy rate must be between 0 and 1 (exclusive upper)",
        ));
    }
    require_non_negative("other_income", a.other_income)?;
    require_non_negative("closing_costs", a.closing_costs)?;
    for (field, value) in a.operating_expenses.lines() {
        require_non_negative(field, value)?;
    }
    require_non_negative("loan_amount", a.loan_amount)?;
    require_non_negative("interest_rate", a.interest_rate)?;

    if a.exit_cap_rate <= Decimal::ZERO {
        return Err(UnderwriteError::invalid(
            "exit_cap_rate",
            "Exit cap rate must be positive",
        ));
    }
    if a.selling_cost_rate < Decimal::ZERO || a.selling_cost_rate >= Decimal::ONE {
        return Err(UnderwriteError::invalid(
            "selling_cost_rate",
            "Selling cost rate must be between 0 and 1 (exclusive upper)",
        ));
    }
    require_non_negative("rent_growth_rate", a.rent_growth_rate)?;
    require_non_negative("expense_growth_rate", a.expense_growth_rate)?;
    if let Some(g) = a.other_income_growth_rate {
        require_non_negative("other_income_growth_rate", g)?;
    }

    for (field, years) in [
        ("amortization_years", a.amortization_years),
        ("loan_term_years", a.loan_term_years),
        ("interest_only_years", a.interest_only_years),
    ] {
        if years > MAX_LOAN_YEARS {
            return Err(UnderwriteError::invalid(
                field,
                format!("Cannot exceed {MAX_LOAN_YEARS} years"),
            ));
        }
    }

    if a.loan_amount > Decimal::ZERO {
        if a.amortization_years < 1 {
            return Err(UnderwriteError::invalid(
                "amortization_years",
                "Amortization period must be at least 1 year when a loan is present",
            ));
        }
        if a.loan_term_years < 1 {
            return Err(UnderwriteError::invalid(
                "loan_term_years",
                "Loan term must be at least 1 year when a loan is present",
            ));
        }
        if a.interest_only_years > a.loan_term_years {
            return Err(UnderwriteError::invalid(
                "interest_only_years",
                "Interest-only period cannot exceed the loan term",
            ));
        }
    }
    Ok(())
}

fn resolve_purchase_price(
    a: &UnderwritingAssumptions,
    warnings: &mut Vec<String>,
) -> UnderwriteResult<Money> {
    if let Some(ltv) = a.loan_to_value {
        if ltv <= Decimal::ZERO || ltv > Decimal::ONE {
            return Err(UnderwriteError::invalid(
                "loan_to_value",
                "Loan-to-value must be in (0, 1]",
            ));
        }
    }

    match (a.purchase_price, a.loan_to_value) {
        (Some(price), ltv) => {
            if price <= Decimal::ZERO {
                return Err(UnderwriteError::invalid(
                    "purchase_price",
                    "Purchase price must be positive",
                ));
            }
            if let Some(ltv) = ltv {
                let implied = a.loan_amount / price;
                if (implied - ltv).abs() > LTV_MISMATCH_TOLERANCE {
                    warnings.push(format!(
                        "Supplied LTV {ltv} differs from loan / price {implied:.4}; purchase price used"
                    ));
                }
            }
            Ok(price)
        }
        (None, Some(ltv)) if a.loan_amount > Decimal::ZERO => Ok(a.loan_amount / ltv),
        _ => Err(UnderwriteError::invalid(
            "purchase_price",
            "Either purchase_price, or loan_to_value with a positive loan_amount, is required",
        )),
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// A partial set of assumptions. Every present field replaces the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_to_value: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_costs: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gross_potential_rent: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vacancy_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_income: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_expenses: Option<OperatingExpenses>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amortization_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_term_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_only_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_period_years: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_cap_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_cost_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_growth_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_growth_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_income_growth_rate: Option<Rate>,
}

impl AssumptionOverrides {
    pub fn is_empty(&self) -> bool {
        *self == AssumptionOverrides::default()
    }

    /// A copy of `base` with every present override applied. `base` is untouched.
    pub fn apply(&self, base: &UnderwritingAssumptions) -> UnderwritingAssumptions {
        let mut merged = base.clone();
        if let Some(v) = self.purchase_price {
            merged.purchase_price = Some(v);
        }
        if let Some(v) = self.loan_to_value {
            merged.loan_to_value = Some(v);
        }
        if let Some(v) = self.closing_costs {
            merged.closing_costs = v;
        }
        if let Some(v) = self.gross_potential_rent {
            merged.gross_potential_rent = v;
        }
        if let Some(v) = self.vacancy_rate {
            merged.vacancy_rate = v;
        }
        if let Some(v) = self.other_income {
            merged.other_income = v;
        }
        if let Some(v) = &self.operating_expenses {
            merged.operating_expenses = v.clone();
        }
        if let Some(v) = self.loan_amount {
            merged.loan_amount = v;
        }
        if let Some(v) = self.interest_rate {
            merged.interest_rate = v;
        }
        if let Some(v) = self.amortization_years {
            merged.amortization_years = v;
        }
        if let Some(v) = self.loan_term_years {
            merged.loan_term_years = v;
        }
        if let Some(v) = self.interest_only_years {
            merged.interest_only_years = v;
        }
        if let Some(v) = self.hold_period_years {
            merged.hold_period_years = v;
        }
        if let Some(v) = self.exit_cap_rate {
            merged.exit_cap_rate = v;
        }
        if let Some(v) = self.selling_cost_rate {
            merged.selling_cost_rate = v;
        }
        if let Some(v) = self.rent_growth_rate {
            merged.rent_growth_rate = v;
        }
        if let Some(v) = self.expense_growth_rate {
            merged.expense_growth_rate = v;
        }
        if let Some(v) = self.other_income_growth_rate {
            merged.other_income_growth_rate = Some(v);
        }
        merged
    }

    /// Layer `other` on top of `self`; fields present in `other` win.
    pub fn merged_with(&self, other: &AssumptionOverrides) -> AssumptionOverrides {
        AssumptionOverrides {
            purchase_price: other.purchase_price.or(self.purchase_price),
            loan_to_value: other.loan_to_value.or(self.loan_to_value),
            closing_costs: other.closing_costs.or(self.closing_costs),
            gross_potential_rent: other.gross_potential_rent.or(self.gross_potential_rent),
            vacancy_rate: other.vacancy_rate.or(self.vacancy_rate),
            other_income: other.other_income.or(self.other_income),
            operating_expenses: other
                .operating_expenses
                .clone()
                .or_else(|| self.operating_expenses.clone()),
            loan_amount: other.loan_amount.or(self.loan_amount),
            interest_rate: other.interest_rate.or(self.interest_rate),
            amortization_years: other.amortization_years.or(self.amortization_years),
            loan_term_years: other.loan_term_years.or(self.loan_term_years),
            interest_only_years: other.interest_only_years.or(self.interest_only_years),
            hold_period_years: other.hold_period_years.or(self.hold_period_years),
            exit_cap_rate: other.exit_cap_rate.or(self.exit_cap_rate),
            selling_cost_rate: other.selling_cost_rate.or(self.selling_cost_rate),
            rent_growth_rate: other.rent_growth_rate.or(self.rent_growth_rate),
            expense_growth_rate: other.expense_growth_rate.or(self.expense_growth_rate),
            other_income_growth_rate: other
                .other_income_growth_rate
                .or(self.other_income_growth_rate),
        }
    }
}
