//! Intake form -> raw record mapping.
//!
//! A customer assessment carries far fewer fields than the policy dataset; the
//! rest are filled with neutral values for a brand-new policy starting on the
//! supplied date.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::RawRecord;

/// Placeholder identifier for single assessments.
pub const ASSESSMENT_USER_ID: &str = "U0001";

/// One customer assessment, as submitted by the intake form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentInput {
    pub age: u32,
    pub occupation: String,
    pub income: f64,
    pub marital_status: String,
    pub dependents: u32,
    pub has_children: bool,
    pub home_owner: bool,
    pub vehicles: u32,
    pub property_value: f64,
    pub current_insurance: String,
    pub claims_history: u32,
    pub risk_tolerance: String,
}

impl Default for AssessmentInput {
    fn default() -> Self {
        Self {
            age: 35,
            occupation: "employee".to_string(),
            income: 75_000.0,
            marital_status: String::new(),
            dependents: 0,
            has_children: false,
            home_owner: false,
            vehicles: 1,
            property_value: 0.0,
            current_insurance: "none".to_string(),
            claims_history: 0,
            risk_tolerance: "medium".to_string(),
        }
    }
}

/// Response body for a single assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub bundle_id: u8,
}

fn employment_status(occupation: &str) -> &'static str {
    match occupation {
        "business" | "self-employed" => "Self-Employed",
        "retired" => "Retired",
        _ => "Employed",
    }
}

/// Lower risk appetite buys a higher deductible.
fn deductible_tier(risk_tolerance: &str) -> &'static str {
    match risk_tolerance {
        "low" => "High",
        "high" => "Low",
        _ => "Medium",
    }
}

impl AssessmentInput {
    pub fn has_existing_policy(&self) -> bool {
        !matches!(self.current_insurance.as_str(), "" | "none")
    }

    /// Map to a raw record for a policy starting on `start`.
    ///
    /// Age, marital status, home ownership and property value have no
    /// counterpart in the policy dataset and are not used.
    pub fn to_record(&self, start: NaiveDate) -> RawRecord {
        let existing = self.has_existing_policy();
        let child = i64::from(self.has_children);
        let adult = (i64::from(self.dependents) - child).max(0);
        let claims = i64::from(self.claims_history);

        RawRecord::new()
            .with("User_ID", ASSESSMENT_USER_ID)
            .with("Policy_Cancelled_Post_Purchase", 0i64)
            .with("Policy_Start_Month", start.format("%b").to_string())
            .with("Policy_Start_Year", i64::from(start.year()))
            .with("Policy_Start_Week", i64::from(start.iso_week().week()))
            .with("Policy_Start_Day", i64::from(start.day()))
            .with("Grace_Period_Extensions", 0i64)
            .with("Previous_Policy_Duration_Months", if existing { 12i64 } else { 0 })
            .with("Adult_Dependents", adult)
            .with("Child_Dependents", child)
            .with("Infant_Dependents", 0i64)
            .with("Existing_Policyholder", i64::from(existing))
            .with("Previous_Claims_Filed", claims)
            .with("Years_Without_Claims", (5 - claims).max(0))
            .with("Policy_Amendments_Count", 0i64)
            .with("Underwriting_Processing_Days", 5i64)
            .with("Vehicles_on_Policy", i64::from(self.vehicles))
            .with("Custom_Riders_Requested", 0i64)
            .with("Broker_Agency_Type", "Direct")
            .with("Deductible_Tier", deductible_tier(&self.risk_tolerance))
            .with("Acquisition_Channel", "Online")
            .with("Payment_Schedule", "Monthly")
            .with("Employment_Status", employment_status(&self.occupation))
            .with("Estimated_Annual_Income", self.income)
            .with("Days_Since_Quote", 0i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawValue;
    use crate::features::transform;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let input: AssessmentInput =
            serde_json::from_str(r#"{"income": 50000, "hasChildren": true, "riskTolerance": "low"}"#).unwrap();
        assert_eq!(input.income, 50_000.0);
        assert!(input.has_children);
        assert_eq!(input.occupation, "employee");
        assert_eq!(input.vehicles, 1);
    }

    #[test]
    fn maps_fields_like_the_intake_form() {
        let input = AssessmentInput {
            dependents: 2,
            has_children: true,
            current_insurance: "basic".to_string(),
            claims_history: 7,
            occupation: "business".to_string(),
            risk_tolerance: "high".to_string(),
            ..AssessmentInput::default()
        };
        let record = input.to_record(date());

        assert_eq!(record.get("Adult_Dependents"), &RawValue::Number(1.0));
        assert_eq!(record.get("Child_Dependents"), &RawValue::Number(1.0));
        assert_eq!(record.get("Existing_Policyholder"), &RawValue::Number(1.0));
        assert_eq!(record.get("Previous_Policy_Duration_Months"), &RawValue::Number(12.0));
        assert_eq!(record.get("Years_Without_Claims"), &RawValue::Number(0.0));
        assert_eq!(record.get("Employment_Status"), &RawValue::Text("Self-Employed".into()));
        assert_eq!(record.get("Deductible_Tier"), &RawValue::Text("Low".into()));
        assert_eq!(record.get("Policy_Start_Month"), &RawValue::Text("Mar".into()));
        assert_eq!(record.get("Policy_Start_Week"), &RawValue::Number(11.0));
        assert_eq!(record.get("Policy_Start_Day"), &RawValue::Number(14.0));
    }

    #[test]
    fn unknown_occupation_falls_back_to_employed() {
        let input = AssessmentInput {
            occupation: "astronaut".to_string(),
            ..AssessmentInput::default()
        };
        let record = input.to_record(date());
        assert_eq!(record.get("Employment_Status"), &RawValue::Text("Employed".into()));
    }

    #[test]
    fn mapped_records_pass_the_feature_transform() {
        let record = AssessmentInput::default().to_record(date());
        let batch = transform(&[record]).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.unknown_categories, 0);
    }
}
