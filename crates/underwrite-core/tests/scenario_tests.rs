#![cfg(feature = "scenarios")]

use std::sync::atomic::{AtomicUsize, Ordering};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use underwrite_core::scenarios::{
    evaluate_grid, run_scenarios, sweep_hold_periods, AssumptionField, CellStatus, Evaluate,
    GridOptions, HoldPeriodInput, OutputMetric, Scenario, ScenarioOutcome, ScenarioRunner,
    SensitivityGridInput, Severity, ThresholdTable,
};
use underwrite_core::underwriting::{
    AssumptionOverrides, OperatingExpenses, UnderwritingAssumptions,
};
use underwrite_core::waterfall::{Hurdle, PromoteTier, WaterfallStructure};
use underwrite_core::{UnderwriteError, UnderwriteResult};

fn harbor_view() -> UnderwritingAssumptions {
    UnderwritingAssumptions {
        property_name: "Harbor View".into(),
        acquisition_date: None,
        purchase_price: Some(dec!(10500000)),
        loan_to_value: None,
        closing_costs: dec!(150000),
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
        loan_amount: dec!(7000000),
        interest_rate: dec!(0.0575),
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

/// 90/10 split of the 3,650,000 equity in `harbor_view`.
fn jv() -> WaterfallStructure {
    let tier = |hurdle: Hurdle, lp: Decimal| PromoteTier {
        hurdle,
        lp_split: lp,
        gp_split: Decimal::ONE - lp,
    };
    WaterfallStructure {
        lp_equity: dec!(3285000),
        gp_equity: dec!(365000),
        preferred_return_rate: dec!(0.08),
        gp_catch_up: false,
        catch_up_percent: Decimal::ZERO,
        lookback: false,
        use_per_class_waterfall: false,
        promote_tiers: vec![
            tier(Hurdle::Bounded(dec!(0.12)), dec!(0.80)),
            tier(Hurdle::Unbounded, dec!(0.70)),
        ],
        share_classes: Vec::new(),
    }
}

fn runner() -> ScenarioRunner {
    ScenarioRunner::new(harbor_view(), Some(jv())).unwrap()
}

/// Forwards to a real runner and counts calls.
struct CountingRunner {
    inner: ScenarioRunner,
    calls: AtomicUsize,
}

impl Evaluate for CountingRunner {
    fn base_assumptions(&self) -> &UnderwritingAssumptions {
        self.inner.base()
    }

    fn evaluate(&self, overrides: &AssumptionOverrides) -> UnderwriteResult<ScenarioOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.run(overrides)
    }
}

fn exit_cap_by_rent_grid() -> SensitivityGridInput {
    SensitivityGridInput {
        x_field: AssumptionField::ExitCapRate,
        y_field: AssumptionField::GrossPotentialRent,
        x_values: vec![dec!(0.05), dec!(0.055), dec!(0.06)],
        y_values: vec![dec!(780000), dec!(820000), dec!(860000)],
        output_metric: OutputMetric::LeveredIrr,
    }
}

// ===========================================================================
// Sensitivity grid
// ===========================================================================

#[test]
fn test_three_by_three_grid_runs_nine_pipelines() {
    let counting = CountingRunner {
        inner: runner(),
        calls: AtomicUsize::new(0),
    };
    let out = evaluate_grid(
        &counting,
        &exit_cap_by_rent_grid(),
        &ThresholdTable::default(),
        &GridOptions::default(),
    )
    .unwrap();

    assert_eq!(counting.calls.load(Ordering::SeqCst), 9);
    let grid = out.result;
    assert_eq!(grid.completed, 9);
    assert_eq!(grid.total, 9);
    assert!(!grid.cancelled);
    assert_eq!(grid.base_cell, Some((1, 1)));
}

#[test]
fn test_base_cell_matches_direct_run() {
    let r = runner();
    let grid = evaluate_grid(
        &r,
        &exit_cap_by_rent_grid(),
        &ThresholdTable::default(),
        &GridOptions::default(),
    )
    .unwrap()
    .result;
    let base = r.run(&AssumptionOverrides::default()).unwrap();

    let cell = grid.cell(1, 1).unwrap();
    assert_eq!(cell.status, CellStatus::Evaluated);
    assert_eq!(cell.returns.as_ref(), Some(&base.returns));
    assert_eq!(cell.value.as_ref(), Some(&base.returns.irr));
}

#[test]
fn test_grid_irr_moves_with_rent_and_cap_rate() {
    let grid = evaluate_grid(
        &runner(),
        &exit_cap_by_rent_grid(),
        &ThresholdTable::default(),
        &GridOptions::default(),
    )
    .unwrap()
    .result;
    let irr = |row, col| {
        grid.cell(row, col)
            .and_then(|c| c.value.as_ref())
            .and_then(|m| m.value())
            .unwrap()
    };
    for row in 0..3 {
        assert!(irr(row, 0) > irr(row, 1) && irr(row, 1) > irr(row, 2));
    }
    for col in 0..3 {
        assert!(irr(0, col) < irr(1, col) && irr(1, col) < irr(2, col));
    }
    assert!(grid
        .cells
        .iter()
        .flatten()
        .all(|c| c.severity != Severity::Undefined));
}

#[test]
fn test_lp_irr_grid_uses_waterfall() {
    let mut input = exit_cap_by_rent_grid();
    input.output_metric = OutputMetric::LpIrr;
    let grid = evaluate_grid(
        &runner(),
        &input,
        &ThresholdTable::default(),
        &GridOptions::default(),
    )
    .unwrap()
    .result;
    let cell = grid.cell(1, 1).unwrap();
    assert!(cell.value.as_ref().unwrap().is_defined());
}

// ===========================================================================
// Scenario sets
// ===========================================================================

#[test]
fn test_scenario_set_compares_against_base() {
    let downside = Scenario::new(
        "Downside",
        AssumptionOverrides {
            vacancy_rate: Some(dec!(0.10)),
            exit_cap_rate: Some(dec!(0.0625)),
            ..Default::default()
        },
    );
    let upside = Scenario::new(
        "Upside",
        AssumptionOverrides {
            rent_growth_rate: Some(dec!(0.045)),
            ..Default::default()
        },
    );
    let set = vec![Scenario::base_case("Base"), downside, upside];
    let out = run_scenarios(&runner(), &set).unwrap().result;

    let base = &out.comparisons[0];
    assert!(base.is_base_case);
    assert_eq!(base.profit_deviation_from_base, Decimal::ZERO);
    assert!(out.comparisons[1].profit_deviation_from_base < Decimal::ZERO);
    assert!(out.comparisons[2].profit_deviation_from_base > Decimal::ZERO);
    assert!(out.comparisons[1].irr_deviation_from_base.unwrap() < Decimal::ZERO);
    assert!(out.scenarios.iter().all(|s| s.last_outcome.is_some()));
    // inputs are untouched
    assert!(set.iter().all(|s| s.last_outcome.is_none()));
}

#[test]
fn test_scenario_set_needs_one_base_case() {
    let set = vec![
        Scenario::new("A", AssumptionOverrides::default()),
        Scenario::new("B", AssumptionOverrides::default()),
    ];
    assert!(matches!(
        run_scenarios(&runner(), &set),
        Err(UnderwriteError::InvalidInput { .. })
    ));
}

// ===========================================================================
// Hold-period sweep
// ===========================================================================

#[test]
fn test_hold_period_sweep_covers_range() {
    let input = HoldPeriodInput {
        min_years: 3,
        max_years: 12,
    };
    let out = sweep_hold_periods(&runner(), &input, None).unwrap();
    let years: Vec<u32> = out.result.rows.iter().map(|r| r.hold_period_years).collect();
    assert_eq!(years, (3..=12).collect::<Vec<_>>());
    assert!(out.result.best_irr_year.is_some());
    assert!(out.result.rows.iter().all(|r| r.lp_irr.is_some()));
    // loan matures after year 10
    assert!(out.warnings.iter().any(|w| w.starts_with("Year 11")));
    assert!(!out.warnings.iter().any(|w| w.starts_with("Year 10:")));
}

#[test]
fn test_hold_period_sweep_rejects_inverted_range() {
    let input = HoldPeriodInput {
        min_years: 8,
        max_years: 4,
    };
    assert!(sweep_hold_periods(&runner(), &input, None).is_err());
}
