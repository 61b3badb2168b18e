use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::time_value::compound_factor;
use crate::types::{Money, Rate};
use crate::UnderwriteResult;

const MONTHS_PER_YEAR: u32 = 12;

/// Longest amortization, loan term or interest-only period accepted.
pub const MAX_LOAN_YEARS: u32 = 50;

/// Loan terms needed to build an amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    /// Annual note rate; compounding is monthly
    pub annual_rate: Rate,
    pub amortization_years: u32,
    /// Initial years in which only interest is paid
    #[serde(default)]
    pub interest_only_years: u32,
}

/// Principal/interest split for one loan year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtServiceYear {
    pub year: u32,
    pub interest_paid: Money,
    pub principal_paid: Money,
    pub debt_service: Money,
    pub ending_balance: Money,
    pub interest_only: bool,
}

/// Level-payment, monthly-compounded amortization schedule.
///
/// Amortization over the full `amortization_years` begins after any
/// interest-only period. Once the balance reaches zero every later year is
/// all zeros.
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    terms: LoanTerms,
    monthly_rate: Rate,
    monthly_payment: Money,
    io_months: u32,
    amort_months: u32,
}

impl AmortizationSchedule {
    pub fn new(terms: LoanTerms) -> UnderwriteResult<Self> {
        if terms.principal < Decimal::ZERO {
            return Err(UnderwriteError::invalid(
                "principal",
                "Loan principal cannot be negative",
            ));
        }
        if terms.annual_rate < Decimal::ZERO {
            return Err(UnderwriteError::invalid(
                "annual_rate",
                "Interest rate cannot be negative",
            ));
        }
        if terms.principal > Decimal::ZERO && terms.amortization_years == 0 {
            return Err(UnderwriteError::invalid(
                "amortization_years",
                "Amortization period must be at least 1 year",
            ));
        }

        let amort_months = loan_months("amortization_years", terms.amortization_years)?;
        let io_months = loan_months("interest_only_years", terms.interest_only_years)?;

        let monthly_rate = terms.annual_rate / dec!(12);
        let monthly_payment = if terms.principal.is_zero() {
            Decimal::ZERO
        } else {
            compute_monthly_payment(terms.principal, monthly_rate, amort_months)?
        };

        Ok(AmortizationSchedule {
            terms,
            monthly_rate,
            monthly_payment,
            io_months,
            amort_months,
        })
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    /// Level monthly payment once amortization starts.
    pub fn monthly_payment(&self) -> Money {
        self.monthly_payment
    }

    /// Debt service for loan year `year` (1-indexed).
    pub fn year(&self, year: u32) -> UnderwriteResult<DebtServiceYear> {
        if year == 0 {
            return Err(UnderwriteError::invalid("year", "Loan years are 1-indexed"));
        }
        self.years(year)
            .pop()
            .ok_or_else(|| UnderwriteError::InsufficientData(format!("No schedule for year {year}")))
    }

    /// Outstanding balance at the end of `year` (0 = original principal).
    pub fn balance_after_year(&self, year: u32) -> Money {
        if year == 0 {
            return self.terms.principal;
        }
        self.years(year)
            .last()
            .map(|y| y.ending_balance)
            .unwrap_or(self.terms.principal)
    }

    /// Annual rows for years 1..=count, computed in a single monthly pass.
    pub fn years(&self, count: u32) -> Vec<DebtServiceYear> {
        let io_months = u64::from(self.io_months);
        let amort_months = u64::from(self.amort_months);

        let mut rows = Vec::with_capacity(count.min(MAX_LOAN_YEARS) as usize);
        let mut balance = self.terms.principal;

        for year in 1..=count {
            let mut interest_paid = Decimal::ZERO;
            let mut principal_paid = Decimal::ZERO;

            for month_in_year in 1..=MONTHS_PER_YEAR {
                let month = u64::from(year - 1) * u64::from(MONTHS_PER_YEAR)
                    + u64::from(month_in_year);
                if balance <= Decimal::ZERO {
                    break;
                }
                let interest = balance * self.monthly_rate;

                if month <= io_months {
                    interest_paid += interest;
                    continue;
                }

                let amort_month = month - io_months;
                let principal = if amort_month >= amort_months {
                    // Final payment clears any rounding residue
                    balance
                } else {
                    (self.monthly_payment - interest).min(balance)
                };
                interest_paid += interest;
                principal_paid += principal;
                balance -= principal;
            }

            rows.push(DebtServiceYear {
                year,
                interest_paid,
                principal_paid,
                debt_service: interest_paid + principal_paid,
                ending_balance: balance,
                interest_only: year <= self.terms.interest_only_years,
            });
        }

        rows
    }
}

/// `years` in months, bounded by [`MAX_LOAN_YEARS`].
fn loan_months(field: &str, years: u32) -> UnderwriteResult<u32> {
    if years > MAX_LOAN_YEARS {
        return Err(UnderwriteError::invalid(
            field,
            format!("Cannot exceed {MAX_LOAN_YEARS} years"),
        ));
    }
    years
        .checked_mul(MONTHS_PER_YEAR)
        .ok_or_else(|| UnderwriteError::invalid(field, "Month count overflows"))
}

/// Standard fixed-rate mortgage payment: P * r(1+r)^n / ((1+r)^n - 1)
fn compute_monthly_payment(
    principal: Money,
    monthly_rate: Rate,
    total_months: u32,
) -> UnderwriteResult<Money> {
    if total_months == 0 {
        return Err(UnderwriteError::DivisionByZero {
            context: "monthly payment with zero amortization months".into(),
        });
    }
    if monthly_rate.is_zero() {
        // Interest-free: straight-line amortisation
        return Ok(principal / Decimal::from(total_months));
    }

    let compound = compound_factor(monthly_rate, total_months).ok_or_else(|| {
        UnderwriteError::invalid("interest_rate", "Compounding overflow in payment calculation")
    })?;

    let numerator = principal * monthly_rate * compound;
    let denominator = compound - Decimal::ONE;

    if denominator.is_zero() {
        return Err(UnderwriteError::DivisionByZero {
            context: "mortgage payment denominator".into(),
        });
    }

    Ok(numerator / denominator)
}
