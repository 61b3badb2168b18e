//! Re-running the underwriting pipeline under overrides: named scenarios,
//! two-way sensitivity grids and hold-period sweeps.

pub mod hold_period;
pub mod request;
pub mod runner;
pub mod scenario;
pub mod sensitivity;
pub mod thresholds;

pub use hold_period::{sweep_hold_periods, HoldPeriodAnalysis, HoldPeriodInput, HoldPeriodRow};
pub use request::{DealInput, HoldPeriodRequest, ScenarioSetRequest, SensitivityRequest};
pub use runner::{Evaluate, OutputMetric, ScenarioOutcome, ScenarioRunner};
pub use scenario::{run_scenarios, validate_scenario_set, Scenario, ScenarioComparison, ScenarioSetOutput};
pub use sensitivity::{
    evaluate_grid, AssumptionField, CancellationToken, CellStatus, GridCell, GridOptions,
    SensitivityGrid, SensitivityGridInput,
};
pub use thresholds::{Band, Severity, ThresholdTable, DEFAULT_THRESHOLDS};
