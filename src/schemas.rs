use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: i64, min: i64, max: i64) -> i64 {
    limit.clamp(min, max)
}

fn default_house() -> String {
    "house".to_string()
}
fn default_active() -> String {
    "active".to_string()
}
fn default_pending() -> String {
    "pending".to_string()
}
fn default_open() -> String {
    "open".to_string()
}
fn default_medium() -> String {
    "medium".to_string()
}
fn default_false() -> bool {
    false
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[serde(default = "default_house")]
    pub property_type: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub city: String,
    pub state: String,
    pub address: String,
    pub zip_code: Option<String>,
    #[serde(default = "default_false")]
    pub has_units: bool,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdatePropertyInput {
    pub property_type: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub has_units: Option<bool>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateUnitInput {
    pub property_id: String,
    #[validate(length(min = 1, max = 32))]
    pub number: String,
    pub floor: Option<String>,
    pub area: Option<f64>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateUnitInput {
    pub number: Option<String>,
    pub floor: Option<String>,
    pub area: Option<f64>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub cpf: String,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateTenantInput {
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateContractInput {
    pub property_id: String,
    pub unit_id: Option<String>,
    pub tenant_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub rent_amount: f64,
    #[validate(range(min = 1, max = 31))]
    pub due_day: i16,
    pub index_type: Option<String>,
    pub guarantee_type: Option<String>,
    pub guarantee_details: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateContractInput {
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub rent_amount: Option<f64>,
    #[validate(range(min = 1, max = 31))]
    pub due_day: Option<i16>,
    pub index_type: Option<String>,
    pub guarantee_type: Option<String>,
    pub guarantee_details: Option<String>,
    pub status: Option<String>,
    pub observations: Option<String>,
}

/// Manual obligation entry, outside the generated schedule (e.g. a
/// pro-rated first month entered by hand).
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePaymentInput {
    pub contract_id: String,
    pub reference_month: NaiveDate,
    pub due_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[serde(default = "default_pending")]
    pub status: String,
    #[validate(range(min = 0.0))]
    pub discount: Option<f64>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdatePaymentInput {
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,
    #[validate(range(min = 0.0))]
    pub discount: Option<f64>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct MarkPaymentPaidInput {
    #[validate(range(min = 0.0))]
    pub paid_amount: f64,
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateExpenseInput {
    pub property_id: String,
    #[validate(length(min = 1, max = 64))]
    pub expense_type: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub reference_month: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateExpenseInput {
    pub expense_type: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub reference_month: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MarkExpensePaidInput {
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateMaintenanceTicketInput {
    pub property_id: String,
    pub unit_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_medium")]
    pub priority: String,
    #[serde(default = "default_open")]
    pub status: String,
    #[validate(range(min = 0.0))]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UpdateMaintenanceTicketInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub cost: Option<f64>,
    pub resolution_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{clamp_limit_in_range, validate_input, CreateContractInput, MarkPaymentPaidInput};

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(0, 1, 500), 1);
        assert_eq!(clamp_limit_in_range(200, 1, 500), 200);
        assert_eq!(clamp_limit_in_range(9999, 1, 500), 500);
    }

    #[test]
    fn contract_input_enforces_due_day_range() {
        let raw = serde_json::json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "tenant_id": "550e8400-e29b-41d4-a716-446655440001",
            "start_date": "2024-01-01",
            "rent_amount": 2500.0,
            "due_day": 31
        });
        let input: CreateContractInput = serde_json::from_value(raw).unwrap();
        assert!(validate_input(&input).is_ok());

        let raw = serde_json::json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "tenant_id": "550e8400-e29b-41d4-a716-446655440001",
            "start_date": "2024-01-01",
            "rent_amount": 2500.0,
            "due_day": 0
        });
        let input: CreateContractInput = serde_json::from_value(raw).unwrap();
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn rejects_negative_amounts() {
        let raw = serde_json::json!({ "paid_amount": -1.0 });
        let input: MarkPaymentPaidInput = serde_json::from_value(raw).unwrap();
        assert!(validate_input(&input).is_err());

        let raw = serde_json::json!({ "paid_amount": 2500.0, "paid_date": "2024-01-20" });
        let input: MarkPaymentPaidInput = serde_json::from_value(raw).unwrap();
        assert!(validate_input(&input).is_ok());
    }
}
