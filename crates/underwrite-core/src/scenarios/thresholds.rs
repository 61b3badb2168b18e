use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Metric;

use super::runner::OutputMetric;

/// Heat-map colour for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Green,
    Amber,
    Red,
    /// The metric itself was undefined, or the cell failed
    Undefined,
}

/// Cut-offs for a metric where higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub green_at_or_above: Decimal,
    pub amber_at_or_above: Decimal,
}

impl Band {
    pub fn classify(&self, value: Decimal) -> Severity {
        if value >= self.green_at_or_above {
            Severity::Green
        } else if value >= self.amber_at_or_above {
            Severity::Amber
        } else {
            Severity::Red
        }
    }
}

/// Severity thresholds per metric family. Loaded from configuration; the
/// grid never hard-codes a cut-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    /// Levered, unlevered, LP and GP IRR
    pub irr: Band,
    pub equity_multiple: Band,
    pub cash_on_cash: Band,
    /// Average and minimum DSCR
    pub dscr: Band,
}

/// House view for a stabilized value-add deal.
pub const DEFAULT_THRESHOLDS: ThresholdTable = ThresholdTable {
    irr: Band {
        green_at_or_above: dec!(0.15),
        amber_at_or_above: dec!(0.10),
    },
    equity_multiple: Band {
        green_at_or_above: dec!(2.0),
        amber_at_or_above: dec!(1.5),
    },
    cash_on_cash: Band {
        green_at_or_above: dec!(0.08),
        amber_at_or_above: dec!(0.05),
    },
    dscr: Band {
        green_at_or_above: dec!(1.25),
        amber_at_or_above: dec!(1.10),
    },
};

impl Default for ThresholdTable {
    fn default() -> Self {
        DEFAULT_THRESHOLDS
    }
}

impl ThresholdTable {
    pub fn band(&self, metric: OutputMetric) -> &Band {
        match metric {
            OutputMetric::LeveredIrr
            | OutputMetric::UnleveredIrr
            | OutputMetric::LpIrr
            | OutputMetric::GpIrr => &self.irr,
            OutputMetric::EquityMultiple => &self.equity_multiple,
            OutputMetric::AvgCashOnCash => &self.cash_on_cash,
            OutputMetric::AvgDscr | OutputMetric::MinDscr => &self.dscr,
        }
    }

    pub fn classify(&self, metric: OutputMetric, value: &Metric) -> Severity {
        match value.value() {
            Some(v) => self.band(metric).classify(v),
            None => Severity::Undefined,
        }
    }
}
