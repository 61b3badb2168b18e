use std::collections::HashSet;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::UnderwriteError;
use crate::types::{with_metadata, ComputationOutput, Metric, Money};
use crate::underwriting::AssumptionOverrides;
use crate::UnderwriteResult;

use super::runner::{Evaluate, ScenarioOutcome};

/// A named override of the base deal, with the outcome of its last run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub is_base_case: bool,
    #[serde(default)]
    pub overrides: AssumptionOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<ScenarioOutcome>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, overrides: AssumptionOverrides) -> Self {
        Scenario {
            name: name.into(),
            is_base_case: false,
            overrides,
            last_outcome: None,
        }
    }

    pub fn base_case(name: impl Into<String>) -> Self {
        Scenario {
            is_base_case: true,
            ..Scenario::new(name, AssumptionOverrides::default())
        }
    }

    /// A new scenario carrying a fresh outcome; `self` keeps its old one.
    pub fn evaluated<E: Evaluate + ?Sized>(&self, evaluator: &E) -> UnderwriteResult<Scenario> {
        let outcome = evaluator.evaluate(&self.overrides)?;
        Ok(Scenario {
            last_outcome: Some(outcome),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub name: String,
    pub is_base_case: bool,
    pub irr: Metric,
    pub equity_multiple: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp_irr: Option<Metric>,
    pub total_profit: Money,
    /// IRR minus base-case IRR; absent when either is undefined
    pub irr_deviation_from_base: Option<Decimal>,
    pub profit_deviation_from_base: Money,
    /// Relative to base-case profit; absent when base profit is zero
    pub profit_deviation_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSetOutput {
    pub scenarios: Vec<Scenario>,
    pub comparisons: Vec<ScenarioComparison>,
}

/// Index of the single base case. Names must be unique.
pub fn validate_scenario_set(scenarios: &[Scenario]) -> UnderwriteResult<usize> {
    if scenarios.is_empty() {
        return Err(UnderwriteError::InsufficientData(
            "At least one scenario required".into(),
        ));
    }
    let mut names = HashSet::new();
    for s in scenarios {
        if !names.insert(s.name.as_str()) {
            return Err(UnderwriteError::invalid(
                "scenarios",
                format!("Duplicate scenario name '{}'", s.name),
            ));
        }
    }
    let bases: Vec<usize> = scenarios
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_base_case)
        .map(|(i, _)| i)
        .collect();
    match bases.as_slice() {
        [only] => Ok(*only),
        [] => Err(UnderwriteError::invalid(
            "scenarios",
            "Exactly one scenario must be marked as the base case (found none)",
        )),
        many => Err(UnderwriteError::invalid(
            "scenarios",
            format!(
                "Exactly one scenario must be marked as the base case (found {})",
                many.len()
            ),
        )),
    }
}

/// Evaluate every scenario and compare each against the base case.
///
/// A scenario whose overrides fail validation aborts the set: a comparison
/// table with holes is worse than a clear error naming the scenario.
pub fn run_scenarios<E: Evaluate + ?Sized>(
    evaluator: &E,
    scenarios: &[Scenario],
) -> UnderwriteResult<ComputationOutput<ScenarioSetOutput>> {
    let start = Instant::now();
    let base_idx = validate_scenario_set(scenarios)?;
    let mut warnings = Vec::new();

    let evaluated: Vec<Scenario> = scenarios
        .iter()
        .map(|s| {
            s.evaluated(evaluator)
                .map_err(|e| e.with_context(&format!("scenario:{}", s.name)))
        })
        .collect::<UnderwriteResult<_>>()?;

    let outcome_of = |s: &Scenario| -> UnderwriteResult<ScenarioOutcome> {
        s.last_outcome.clone().ok_or_else(|| {
            UnderwriteError::InsufficientData(format!("Scenario '{}' has no outcome", s.name))
        })
    };
    let base = outcome_of(&evaluated[base_idx])?;
    let base_profit = base.returns.total_profit;

    let mut comparisons = Vec::with_capacity(evaluated.len());
    for scenario in &evaluated {
        let outcome = outcome_of(scenario)?;
        let r = &outcome.returns;
        for w in &outcome.warnings {
            warnings.push(format!("{}: {w}", scenario.name));
        }

        let profit_deviation = r.total_profit - base_profit;
        comparisons.push(ScenarioComparison {
            name: scenario.name.clone(),
            is_base_case: scenario.is_base_case,
            irr: r.irr.clone(),
            equity_multiple: r.equity_multiple.clone(),
            lp_irr: outcome.waterfall.as_ref().map(|w| w.lp_irr.clone()),
            total_profit: r.total_profit,
            irr_deviation_from_base: match (r.irr.value(), base.returns.irr.value()) {
                (Some(v), Some(b)) => Some(v - b),
                _ => None,
            },
            profit_deviation_from_base: profit_deviation,
            profit_deviation_pct: if base_profit.is_zero() {
                None
            } else {
                Some(profit_deviation / base_profit.abs())
            },
        });
    }

    let output = ScenarioSetOutput {
        scenarios: evaluated,
        comparisons,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Scenario comparison against base case",
        &serde_json::json!({
            "num_scenarios": scenarios.len(),
            "base_case": scenarios[base_idx].name,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::test_support::sample_runner;
    use rust_decimal_macros::dec;

    fn downside() -> Scenario {
        Scenario::new(
            "Downside",
            AssumptionOverrides {
                vacancy_rate: Some(dec!(0.10)),
                exit_cap_rate: Some(dec!(0.065)),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_exactly_one_base_case() {
        assert!(validate_scenario_set(&[downside()]).is_err());
        let two_bases = [Scenario::base_case("A"), Scenario::base_case("B")];
        assert!(validate_scenario_set(&two_bases).is_err());
        assert_eq!(
            validate_scenario_set(&[downside(), Scenario::base_case("Base")]).unwrap(),
            1
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let set = [Scenario::base_case("Base"), Scenario::new("Base", Default::default())];
        assert!(validate_scenario_set(&set).is_err());
    }

    #[test]
    fn test_evaluated_returns_new_value() {
        let runner = sample_runner();
        let original = downside();
        let evaluated = original.evaluated(&runner).unwrap();
        assert!(original.last_outcome.is_none());
        assert!(evaluated.last_outcome.is_some());
        assert_eq!(evaluated.name, original.name);
    }

    #[test]
    fn test_downside_underperforms_base() {
        let runner = sample_runner();
        let out = run_scenarios(&runner, &[Scenario::base_case("Base"), downside()]).unwrap();
        let cmp = &out.result.comparisons;
        assert_eq!(cmp[0].profit_deviation_from_base, Decimal::ZERO);
        assert_eq!(cmp[0].irr_deviation_from_base, Some(Decimal::ZERO));
        assert!(cmp[1].profit_deviation_from_base < Decimal::ZERO);
        assert!(cmp[1].lp_irr.is_some());
    }

    #[test]
    fn test_invalid_scenario_names_itself() {
        let runner = sample_runner();
        let bad = Scenario::new(
            "Broken",
            AssumptionOverrides {
                vacancy_rate: Some(dec!(1.5)),
                ..Default::default()
            },
        );
        let err = run_scenarios(&runner, &[Scenario::base_case("Base"), bad]).unwrap_err();
        match err {
            UnderwriteError::InvalidInput { field, .. } => {
                assert_eq!(field, "scenario:Broken.vacancy_rate")
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    struct ZeroDenominator {
        base: crate::underwriting::UnderwritingAssumptions,
    }

    impl Evaluate for ZeroDenominator {
        fn base_assumptions(&self) -> &crate::underwriting::UnderwritingAssumptions {
            &self.base
        }

        fn evaluate(&self, _: &AssumptionOverrides) -> UnderwriteResult<ScenarioOutcome> {
            Err(UnderwriteError::DivisionByZero {
                context: "equity multiple".into(),
            })
        }
    }

    #[test]
    fn test_scenario_error_keeps_variant() {
        let evaluator = ZeroDenominator {
            base: crate::underwriting::test_support::sample_assumptions(),
        };
        let err = run_scenarios(&evaluator, &[Scenario::base_case("Base")]).unwrap_err();
        match err {
            UnderwriteError::DivisionByZero { context } => {
                assert_eq!(context, "scenario:Base: equity multiple")
            }
            other => panic!("expected DivisionByZero, got {other:?}"),
        }
    }
}
