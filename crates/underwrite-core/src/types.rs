use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Why a metric could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// The ratio's denominator was zero (e.g. no equity, no debt service)
    ZeroDenominator,
    /// The cash-flow vector never changes sign, so no IRR exists
    NoSignChange,
    /// The root-finder could not bracket or converge within its bounds
    NoRootInBounds,
    /// Too few cash flows, or no observations to average
    InsufficientCashFlows,
}

/// A derived metric that is either a number or an explicit "undefined".
///
/// Undefined values are never coerced to zero, so a caller can always tell a
/// genuine 0% from a ratio that had nothing to divide by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Metric {
    Defined {
        value: Decimal,
    },
    Undefined {
        reason: UndefinedReason,
        detail: String,
    },
}

impl Metric {
    pub fn defined(value: Decimal) -> Self {
        Metric::Defined { value }
    }

    pub fn undefined(reason: UndefinedReason, detail: impl Into<String>) -> Self {
        Metric::Undefined {
            reason,
            detail: detail.into(),
        }
    }

    /// `numerator / denominator`, undefined when the denominator is zero.
    pub fn ratio(numerator: Decimal, denominator: Decimal, context: &str) -> Self {
        if denominator.is_zero() {
            Metric::undefined(UndefinedReason::ZeroDenominator, context)
        } else {
            Metric::defined(numerator / denominator)
        }
    }

    /// Arithmetic mean of the defined values; undefined when none are defined.
    pub fn mean<'a>(metrics: impl IntoIterator<Item = &'a Metric>, context: &str) -> Self {
        let (sum, count) = metrics
            .into_iter()
            .filter_map(Metric::value)
            .fold((Decimal::ZERO, 0u32), |(s, n), v| (s + v, n + 1));
        if count == 0 {
            Metric::undefined(UndefinedReason::InsufficientCashFlows, context)
        } else {
            Metric::defined(sum / Decimal::from(count))
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Metric::Defined { value } => Some(*value),
            Metric::Undefined { .. } => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Defined { .. })
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
