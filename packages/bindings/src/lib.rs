use napi::Result as NapiResult;
use napi_derive::napi;

use underwrite_core::scenarios::{
    self, GridOptions, HoldPeriodRequest, ScenarioSetRequest, SensitivityRequest, ThresholdTable,
};
use underwrite_core::underwriting::{self, UnderwritingAssumptions};
use underwrite_core::waterfall::{self, WaterfallInput};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Underwriting
// ---------------------------------------------------------------------------

#[napi]
pub fn underwrite(input_json: String) -> NapiResult<String> {
    let input: UnderwritingAssumptions =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = underwriting::underwrite(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_waterfall(input_json: String) -> NapiResult<String> {
    let input: WaterfallInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = waterfall::calculate_waterfall(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[napi]
pub fn run_scenarios(input_json: String) -> NapiResult<String> {
    let input: ScenarioSetRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let runner = input.deal.into_runner().map_err(to_napi_error)?;
    let output = scenarios::run_scenarios(&runner, &input.scenarios).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// `thresholds_json` is optional; default severity bands apply without it.
#[napi]
pub fn sensitivity_grid(input_json: String, thresholds_json: Option<String>) -> NapiResult<String> {
    let input: SensitivityRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let thresholds: ThresholdTable = match thresholds_json {
        Some(json) => serde_json::from_str(&json).map_err(to_napi_error)?,
        None => ThresholdTable::default(),
    };
    let runner = input.deal.into_runner().map_err(to_napi_error)?;
    let output =
        scenarios::evaluate_grid(&runner, &input.grid, &thresholds, &GridOptions::default())
            .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn hold_period_analysis(input_json: String) -> NapiResult<String> {
    let input: HoldPeriodRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let runner = input.deal.into_runner().map_err(to_napi_error)?;
    let output =
        scenarios::sweep_hold_periods(&runner, &input.range, None).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
