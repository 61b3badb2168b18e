use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Metric, Money, UndefinedReason};
use crate::underwriting::{
    underwrite_validated, AssumptionOverrides, CashFlowYear, ExitEvent, ReturnSummary,
    UnderwritingAssumptions,
};
use crate::waterfall::{distribute, ValidatedWaterfall, WaterfallDistribution, WaterfallStructure};
use crate::UnderwriteResult;

/// Gap between structure equity and underwritten equity that triggers a warning.
const EQUITY_MISMATCH_TOLERANCE: Money = Decimal::ONE;

/// A metric a sensitivity cell or scenario comparison can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMetric {
    LeveredIrr,
    UnleveredIrr,
    EquityMultiple,
    AvgCashOnCash,
    AvgDscr,
    MinDscr,
    LpIrr,
    GpIrr,
}

/// Fully materialized result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// The merged assumptions that were evaluated
    pub assumptions: UnderwritingAssumptions,
    pub cash_flows: Vec<CashFlowYear>,
    pub exit: ExitEvent,
    pub returns: ReturnSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall: Option<WaterfallDistribution>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ScenarioOutcome {
    pub fn metric(&self, metric: OutputMetric) -> Metric {
        let r = &self.returns;
        match metric {
            OutputMetric::LeveredIrr => r.irr.clone(),
            OutputMetric::UnleveredIrr => r.unlevered_irr.clone(),
            OutputMetric::EquityMultiple => r.equity_multiple.clone(),
            OutputMetric::AvgCashOnCash => r.avg_cash_on_cash.clone(),
            OutputMetric::AvgDscr => r.avg_dscr.clone(),
            OutputMetric::MinDscr => r.min_dscr.clone(),
            OutputMetric::LpIrr => self.waterfall_metric(|w| &w.lp_irr),
            OutputMetric::GpIrr => self.waterfall_metric(|w| &w.gp_irr),
        }
    }

    fn waterfall_metric(&self, pick: impl Fn(&WaterfallDistribution) -> &Metric) -> Metric {
        match &self.waterfall {
            Some(w) => pick(w).clone(),
            None => Metric::undefined(
                UndefinedReason::InsufficientCashFlows,
                "no waterfall structure configured",
            ),
        }
    }
}

/// Anything that can evaluate an assumption override. The grid and sweeps
/// only see this trait, so they can run against a stub in tests.
pub trait Evaluate: Sync {
    fn base_assumptions(&self) -> &UnderwritingAssumptions;

    fn evaluate(&self, overrides: &AssumptionOverrides) -> UnderwriteResult<ScenarioOutcome>;
}

/// Runs projection, return metrics and (optionally) the waterfall for a base
/// deal under a set of overrides. The base is never mutated.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    base: UnderwritingAssumptions,
    waterfall: Option<ValidatedWaterfall>,
}

impl ScenarioRunner {
    /// Validates the base assumptions and the waterfall once, up front.
    pub fn new(
        base: UnderwritingAssumptions,
        waterfall: Option<WaterfallStructure>,
    ) -> UnderwriteResult<Self> {
        base.clone().validate()?;
        let waterfall = waterfall.map(WaterfallStructure::validate).transpose()?;
        Ok(ScenarioRunner { base, waterfall })
    }

    pub fn base(&self) -> &UnderwritingAssumptions {
        &self.base
    }

    pub fn waterfall(&self) -> Option<&ValidatedWaterfall> {
        self.waterfall.as_ref()
    }

    pub fn run(&self, overrides: &AssumptionOverrides) -> UnderwriteResult<ScenarioOutcome> {
        let merged = overrides.apply(&self.base);
        let validated = merged.clone().validate()?;
        let (output, mut warnings) = underwrite_validated(&validated)?;

        let waterfall = match &self.waterfall {
            Some(structure) => {
                let equity = structure.structure().total_equity();
                if (equity - validated.equity_invested()).abs() > EQUITY_MISMATCH_TOLERANCE {
                    warnings.push(format!(
                        "Waterfall equity {equity} differs from underwritten equity {}",
                        validated.equity_invested()
                    ));
                }
                let flows: Vec<Money> = output
                    .cash_flows
                    .iter()
                    .map(|y| y.before_tax_cash_flow)
                    .collect();
                let (distribution, wf_warnings) =
                    distribute(structure, &flows, output.exit.net_equity_proceeds)?;
                warnings.extend(wf_warnings);
                Some(distribution)
            }
            None => None,
        };

        Ok(ScenarioOutcome {
            assumptions: merged,
            cash_flows: output.cash_flows,
            exit: output.exit,
            returns: output.returns,
            waterfall,
            warnings,
        })
    }
}

impl Evaluate for ScenarioRunner {
    fn base_assumptions(&self) -> &UnderwritingAssumptions {
        &self.base
    }

    fn evaluate(&self, overrides: &AssumptionOverrides) -> UnderwriteResult<ScenarioOutcome> {
        self.run(overrides)
    }
}
