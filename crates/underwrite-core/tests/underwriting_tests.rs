#![cfg(feature = "underwriting")]

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use underwrite_core::time_value::{irr, irr_metric, npv};
use underwrite_core::underwriting::{
    underwrite, AmortizationSchedule, LoanTerms, OperatingExpenses, UnderwritingAssumptions,
};
use underwrite_core::{Metric, UndefinedReason, UnderwriteError};

fn garden_apartments() -> UnderwritingAssumptions {
    UnderwritingAssumptions {
        property_name: "Garden Apartments".into(),
        acquisition_date: None,
        purchase_price: None,
        loan_to_value: Some(dec!(0.80)),
        closing_costs: dec!(200000),
        gross_potential_rent: dec!(820000),
        vacancy_rate: dec!(0.05),
        other_income: dec!(15000),
        operating_expenses: OperatingExpenses {
            taxes: dec!(120000),
            insurance: dec!(35000),
            management: dec!(38950),
            reserves: dec!(25000),
            repairs: dec!(45000),
        },
        loan_amount: dec!(8500000),
        interest_rate: dec!(0.0625),
        amortization_years: 30,
        loan_term_years: 10,
        interest_only_years: 0,
        hold_period_years: 5,
        exit_cap_rate: dec!(0.055),
        selling_cost_rate: dec!(0.02),
        rent_growth_rate: dec!(0.03),
        expense_growth_rate: dec!(0.025),
        other_income_growth_rate: None,
    }
}

// ===========================================================================
// Projection
// ===========================================================================

#[test]
fn test_example_deal_noi_and_defined_irr() {
    let out = underwrite(&garden_apartments()).unwrap();
    let noi_1 = out.result.cash_flows[0].net_operating_income;
    assert!(
        noi_1 >= dec!(480000) && noi_1 <= dec!(560000),
        "NOI_1 {noi_1} outside the expected band"
    );
    assert!(out.result.returns.irr.is_defined());
}

#[test]
fn test_price_derived_from_ltv() {
    let out = underwrite(&garden_apartments()).unwrap();
    let r = &out.result.returns;
    assert_eq!(r.purchase_price, dec!(10625000));
    assert_eq!(r.equity_invested, dec!(2325000));
    assert_eq!(r.loan_to_value.value(), Some(dec!(0.8)));
}

#[test]
fn test_projection_length_for_every_hold_period() {
    for hold in 1..=15u32 {
        let mut a = garden_apartments();
        a.hold_period_years = hold;
        let out = underwrite(&a).unwrap();
        assert_eq!(out.result.cash_flows.len(), hold as usize);
        assert_eq!(out.result.exit.exit_year, hold);
    }
}

#[test]
fn test_cumulative_monotonic_iff_cash_flows_non_negative() {
    for loan in [dec!(8500000), dec!(6000000), dec!(4000000)] {
        let mut a = garden_apartments();
        a.loan_amount = loan;
        a.loan_to_value = None;
        a.purchase_price = Some(dec!(10625000));
        let years = underwrite(&a).unwrap().result.cash_flows;

        let all_non_negative = years.iter().all(|y| y.before_tax_cash_flow >= Decimal::ZERO);
        let monotonic = years
            .windows(2)
            .all(|w| w[1].cumulative_cash_flow >= w[0].cumulative_cash_flow)
            && years[0].cumulative_cash_flow >= Decimal::ZERO;
        assert_eq!(all_non_negative, monotonic, "loan {loan}");
    }
}

#[test]
fn test_exit_priced_on_forward_noi() {
    let out = underwrite(&garden_apartments()).unwrap();
    let exit = &out.result.exit;
    let year_5 = &out.result.cash_flows[4];
    assert!(exit.exit_noi > year_5.net_operating_income);
    assert_eq!(exit.gross_sale_price, exit.exit_noi / dec!(0.055));
    assert_eq!(exit.loan_payoff, year_5.debt_service.ending_loan_balance);
}

#[test]
fn test_balloon_warning_when_hold_exceeds_term() {
    let mut a = garden_apartments();
    a.hold_period_years = 12;
    let out = underwrite(&a).unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("balloon")));
}

#[test]
fn test_validation_errors() {
    let mut a = garden_apartments();
    a.vacancy_rate = dec!(-0.01);
    assert!(matches!(
        underwrite(&a),
        Err(UnderwriteError::InvalidInput { ref field, .. }) if field == "vacancy_rate"
    ));

    let mut a = garden_apartments();
    a.loan_to_value = None;
    assert!(underwrite(&a).is_err());

    let mut a = garden_apartments();
    a.loan_to_value = None;
    a.purchase_price = Some(dec!(8000000));
    assert!(matches!(
        underwrite(&a),
        Err(UnderwriteError::InvalidInput { ref field, .. }) if field == "loan_amount"
    ));
}

#[test]
fn test_oversized_loan_periods_are_validation_errors() {
    let mut a = garden_apartments();
    a.amortization_years = 400_000_000;
    assert!(matches!(
        underwrite(&a),
        Err(UnderwriteError::InvalidInput { ref field, .. }) if field == "amortization_years"
    ));

    // all-cash deal: the interest-only period is still bounded
    let mut a = garden_apartments();
    a.loan_to_value = None;
    a.purchase_price = Some(dec!(10625000));
    a.loan_amount = Decimal::ZERO;
    a.interest_only_years = 400_000_000;
    assert!(matches!(
        underwrite(&a),
        Err(UnderwriteError::InvalidInput { ref field, .. }) if field == "interest_only_years"
    ));
}

#[test]
fn test_assumptions_from_json_use_defaults() {
    let json = r#"{
        "purchase_price": "5000000",
        "gross_potential_rent": "600000",
        "vacancy_rate": "0.06",
        "operating_expenses": {
            "taxes": "70000", "insurance": "20000", "management": "24000",
            "reserves": "15000", "repairs": "30000"
        },
        "loan_amount": "3250000",
        "interest_rate": "0.065",
        "amortization_years": 25,
        "loan_term_years": 7,
        "hold_period_years": 7,
        "exit_cap_rate": "0.0625",
        "rent_growth_rate": "0.025",
        "expense_growth_rate": "0.03"
    }"#;
    let a: UnderwritingAssumptions = serde_json::from_str(json).unwrap();
    assert_eq!(a.selling_cost_rate, dec!(0.02));
    assert_eq!(a.other_income, Decimal::ZERO);
    assert_eq!(a.interest_only_years, 0);
    let out = underwrite(&a).unwrap();
    assert_eq!(out.result.cash_flows.len(), 7);
}

// ===========================================================================
// Amortization
// ===========================================================================

#[test]
fn test_yearly_debt_service_is_twelve_payments() {
    let schedule = AmortizationSchedule::new(LoanTerms {
        principal: dec!(8500000),
        annual_rate: dec!(0.0625),
        amortization_years: 30,
        interest_only_years: 0,
    })
    .unwrap();
    let twelve = schedule.monthly_payment() * dec!(12);
    for row in schedule.years(10) {
        let diff = row.interest_paid + row.principal_paid - twelve;
        assert!(diff.abs() < dec!(0.0001), "year {}: {diff}", row.year);
    }
}

#[test]
fn test_balance_zero_after_amortization_term() {
    let schedule = AmortizationSchedule::new(LoanTerms {
        principal: dec!(2000000),
        annual_rate: dec!(0.055),
        amortization_years: 15,
        interest_only_years: 0,
    })
    .unwrap();
    assert!(schedule.balance_after_year(15).abs() < dec!(0.01));
    assert!(schedule.balance_after_year(10) > Decimal::ZERO);
}

// ===========================================================================
// IRR
// ===========================================================================

#[test]
fn test_irr_round_trip_single_payoff() {
    // 1000 -> 1331 over three years is exactly 10%
    let rate = irr(&[dec!(-1000), Decimal::ZERO, Decimal::ZERO, dec!(1331)]).unwrap();
    assert!((rate - dec!(0.10)).abs() < dec!(0.000001), "got {rate}");

    let rate = irr(&[dec!(-2500), dec!(3750)]).unwrap();
    assert!((rate - dec!(0.5)).abs() < dec!(0.000001), "got {rate}");
}

#[test]
fn test_irr_negative_rate_found() {
    let flows = [dec!(-1000), dec!(100), dec!(100), dec!(300)];
    let rate = irr(&flows).unwrap();
    assert!(rate < Decimal::ZERO);
    assert!(npv(rate, &flows).unwrap().abs() < dec!(0.001));
}

#[test]
fn test_irr_undefined_without_sign_change() {
    match irr_metric(&[dec!(100), dec!(200)], "test") {
        Metric::Undefined { reason, .. } => assert_eq!(reason, UndefinedReason::NoSignChange),
        other => panic!("expected undefined, got {other:?}"),
    }
}
