use serde::{Deserialize, Serialize};

use crate::underwriting::UnderwritingAssumptions;
use crate::waterfall::WaterfallStructure;
use crate::UnderwriteResult;

use super::hold_period::HoldPeriodInput;
use super::runner::ScenarioRunner;
use super::scenario::Scenario;
use super::sensitivity::SensitivityGridInput;

/// Base deal plus an optional waterfall; the common head of every
/// scenario-style request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealInput {
    pub base: UnderwritingAssumptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall: Option<WaterfallStructure>,
}

impl DealInput {
    pub fn into_runner(self) -> UnderwriteResult<ScenarioRunner> {
        ScenarioRunner::new(self.base, self.waterfall)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSetRequest {
    #[serde(flatten)]
    pub deal: DealInput,
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityRequest {
    #[serde(flatten)]
    pub deal: DealInput,
    pub grid: SensitivityGridInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldPeriodRequest {
    #[serde(flatten)]
    pub deal: DealInput,
    #[serde(flatten)]
    pub range: HoldPeriodInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_period_request_from_flat_json() {
        let json = r#"{
            "base": {
                "purchase_price": "5000000",
                "gross_potential_rent": "500000",
                "vacancy_rate": "0.05",
                "operating_expenses": {
                    "taxes": "60000", "insurance": "15000", "management": "20000",
                    "reserves": "10000", "repairs": "15000"
                },
                "loan_amount": "3500000",
                "interest_rate": "0.06",
                "amortization_years": 30,
                "loan_term_years": 10,
                "hold_period_years": 5,
                "exit_cap_rate": "0.065",
                "selling_cost_rate": "0.02",
                "rent_growth_rate": "0.03",
                "expense_growth_rate": "0.03"
            },
            "min_years": 3,
            "max_years": 7
        }"#;
        let req: HoldPeriodRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.range.min_years, 3);
        assert!(req.deal.waterfall.is_none());
        assert!(req.deal.into_runner().is_ok());
    }
}
