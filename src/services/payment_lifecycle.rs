use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::info;

use crate::error::AppError;
use crate::repository::table_service::{
    count_rows, count_rows_tx, create_rows_tx, get_row, update_row,
};
use crate::services::late_fee::settle_payment;
use crate::services::schedule::{generate_schedule, ContractTerms, ObligationDraft, PaymentStatus};

/// Result of an idempotent schedule-generation call.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct GenerationOutcome {
    pub created: u32,
    pub already_existed: i64,
}

/// Generate and persist the payment schedule for a contract, exactly once.
///
/// A contract that already has payments is a no-op reporting the existing
/// count. The batch goes in as a single statement inside a transaction that
/// re-checks the count first; the unique (contract_id, reference_month)
/// constraint closes the remaining race window, surfacing as Conflict.
pub async fn ensure_schedule_generated(
    pool: &PgPool,
    contract: &Value,
) -> Result<GenerationOutcome, AppError> {
    let contract_id = row_str(contract, "id");
    if contract_id.is_empty() {
        return Err(AppError::Internal("Contract record has no id.".to_string()));
    }
    let terms = contract_terms_from_row(contract)?;

    let mut filters = Map::new();
    filters.insert("contract_id".to_string(), Value::String(contract_id.clone()));

    let existing = count_rows(pool, "payments", Some(&filters)).await?;
    if existing > 0 {
        return Ok(GenerationOutcome {
            created: 0,
            already_existed: existing,
        });
    }

    let drafts = generate_schedule(&terms);
    if drafts.is_empty() {
        return Ok(GenerationOutcome {
            created: 0,
            already_existed: 0,
        });
    }

    let records = drafts
        .iter()
        .map(|draft| draft_record(&contract_id, draft))
        .collect::<Vec<_>>();

    let mut tx = pool
        .begin()
        .await
        .map_err(|error| AppError::Dependency(format!("Could not open transaction: {error}")))?;

    let in_tx = count_rows_tx(&mut *tx, "payments", Some(&filters)).await?;
    if in_tx > 0 {
        let _ = tx.rollback().await;
        return Ok(GenerationOutcome {
            created: 0,
            already_existed: in_tx,
        });
    }

    let inserted = create_rows_tx(&mut *tx, "payments", &records).await?;
    tx.commit()
        .await
        .map_err(|error| AppError::Dependency(format!("Could not commit schedule: {error}")))?;

    info!(
        contract_id = %contract_id,
        created = inserted.len(),
        "Payment schedule generated"
    );

    Ok(GenerationOutcome {
        created: inserted.len() as u32,
        already_existed: 0,
    })
}

/// Record a payment against an obligation, computing late charges when the
/// effective paid date falls after the due date.
pub async fn mark_payment_paid(
    pool: &PgPool,
    payment_id: &str,
    paid_amount: Decimal,
    paid_date: Option<NaiveDate>,
) -> Result<Value, AppError> {
    let payment = get_row(pool, "payments", payment_id, "id").await?;

    if PaymentStatus::parse(&row_str(&payment, "status")) == Some(PaymentStatus::Paid) {
        return Err(AppError::Conflict(
            "Payment has already been marked as paid.".to_string(),
        ));
    }

    let amount = row_decimal(&payment, "amount").ok_or_else(|| {
        AppError::Internal(format!("Payment {payment_id} has no valid amount."))
    })?;
    let due_date = row_date(&payment, "due_date").ok_or_else(|| {
        AppError::Internal(format!("Payment {payment_id} has no valid due_date."))
    })?;

    let effective_paid_date = paid_date.unwrap_or_else(|| Utc::now().date_naive());
    let settlement = settle_payment(amount, due_date, paid_amount, effective_paid_date);

    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(settlement.status.as_str().to_string()),
    );
    patch.insert("paid_amount".to_string(), decimal_json(settlement.paid_amount));
    patch.insert(
        "paid_date".to_string(),
        Value::String(settlement.paid_date.to_string()),
    );
    if let Some(late_fee) = settlement.late_fee {
        patch.insert("late_fee".to_string(), decimal_json(late_fee));
    }
    if let Some(interest) = settlement.interest {
        patch.insert("interest".to_string(), decimal_json(interest));
    }

    if settlement.days_late > 0 {
        info!(
            payment_id = %payment_id,
            days_late = settlement.days_late,
            "Late payment settled with charges"
        );
    }

    update_row(pool, "payments", payment_id, &patch, "id").await
}

/// Flip listed pending payments whose due date has passed to overdue, both in
/// the database and in the rows about to be returned.
///
/// The write is conditional on the row still being pending, so a concurrent
/// settlement wins and a repeated listing is a no-op.
pub async fn materialize_overdue(
    pool: &PgPool,
    payments: &mut [Value],
    today: NaiveDate,
) -> Result<u32, AppError> {
    let mut flipped = 0;

    for payment in payments.iter_mut() {
        if !is_due_for_overdue(payment, today) {
            continue;
        }
        let payment_id = row_str(payment, "id");
        if payment_id.is_empty() {
            continue;
        }

        let result = sqlx::query(
            "UPDATE payments SET status = 'overdue' WHERE id = $1::uuid AND status = 'pending'",
        )
        .bind(&payment_id)
        .execute(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("Could not update payment: {error}")))?;

        if result.rows_affected() > 0 {
            if let Some(object) = payment.as_object_mut() {
                object.insert("status".to_string(), Value::String("overdue".to_string()));
            }
            flipped += 1;
        }
    }

    if flipped > 0 {
        info!(flipped, "Payments transitioned to overdue");
    }

    Ok(flipped)
}

/// Overdue starts the day after the due date; a payment due today is still
/// pending.
pub fn is_due_for_overdue(payment: &Value, today: NaiveDate) -> bool {
    PaymentStatus::parse(&row_str(payment, "status")) == Some(PaymentStatus::Pending)
        && row_date(payment, "due_date").is_some_and(|due_date| due_date < today)
}

/// Parse the generator's inputs out of a contract row.
pub fn contract_terms_from_row(contract: &Value) -> Result<ContractTerms, AppError> {
    let contract_id = row_str(contract, "id");

    let start_date = row_date(contract, "start_date").ok_or_else(|| {
        AppError::Internal(format!("Contract {contract_id} has no valid start_date."))
    })?;
    let rent_amount = row_decimal(contract, "rent_amount").ok_or_else(|| {
        AppError::Internal(format!("Contract {contract_id} has no valid rent_amount."))
    })?;
    let due_day = contract
        .as_object()
        .and_then(|object| object.get("due_day"))
        .and_then(Value::as_u64)
        .filter(|day| (1..=31).contains(day))
        .ok_or_else(|| {
            AppError::Internal(format!("Contract {contract_id} has an invalid due_day."))
        })?;

    Ok(ContractTerms {
        start_date,
        end_date: row_date(contract, "end_date"),
        rent_amount,
        due_day: due_day as u32,
    })
}

fn draft_record(contract_id: &str, draft: &ObligationDraft) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert(
        "contract_id".to_string(),
        Value::String(contract_id.to_string()),
    );
    record.insert(
        "reference_month".to_string(),
        Value::String(draft.reference_month.to_string()),
    );
    record.insert(
        "due_date".to_string(),
        Value::String(draft.due_date.to_string()),
    );
    record.insert("amount".to_string(), decimal_json(draft.amount));
    record.insert(
        "status".to_string(),
        Value::String(draft.status.as_str().to_string()),
    );
    record
}

pub fn decimal_json(value: Decimal) -> Value {
    value
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

pub fn row_decimal(row: &Value, key: &str) -> Option<Decimal> {
    match row.as_object()?.get(key)? {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

pub fn row_date(row: &Value, key: &str) -> Option<NaiveDate> {
    let raw = row.as_object()?.get(key)?.as_str()?;
    // date columns render as plain dates, timestamps with a time suffix
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

fn row_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|object| object.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    use super::{
        contract_terms_from_row, decimal_json, draft_record, is_due_for_overdue, row_date,
        row_decimal,
    };
    use crate::services::schedule::{ObligationDraft, PaymentStatus};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn parses_contract_terms() {
        let contract = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "start_date": "2024-01-01",
            "end_date": "2024-12-31",
            "rent_amount": 2500.0,
            "due_day": 10
        });

        let terms = contract_terms_from_row(&contract).unwrap();
        assert_eq!(terms.start_date, date(2024, 1, 1));
        assert_eq!(terms.end_date, Some(date(2024, 12, 31)));
        assert_eq!(terms.rent_amount, dec!(2500));
        assert_eq!(terms.due_day, 10);
    }

    #[test]
    fn open_ended_contract_has_no_end_date() {
        let contract = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "start_date": "2024-01-01",
            "end_date": null,
            "rent_amount": "1800.50",
            "due_day": 5
        });

        let terms = contract_terms_from_row(&contract).unwrap();
        assert_eq!(terms.end_date, None);
        assert_eq!(terms.rent_amount, dec!(1800.50));
    }

    #[test]
    fn rejects_contract_without_start_date() {
        let contract = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "rent_amount": 2500.0,
            "due_day": 10
        });
        assert!(contract_terms_from_row(&contract).is_err());
    }

    #[test]
    fn rejects_out_of_range_due_day() {
        let contract = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "start_date": "2024-01-01",
            "rent_amount": 2500.0,
            "due_day": 32
        });
        assert!(contract_terms_from_row(&contract).is_err());
    }

    #[test]
    fn draft_record_shape() {
        let draft = ObligationDraft {
            reference_month: date(2024, 2, 1),
            due_date: date(2024, 2, 29),
            amount: dec!(2500.00),
            status: PaymentStatus::Pending,
        };
        let record = draft_record("550e8400-e29b-41d4-a716-446655440000", &draft);

        assert_eq!(
            record.get("reference_month"),
            Some(&Value::String("2024-02-01".to_string()))
        );
        assert_eq!(
            record.get("due_date"),
            Some(&Value::String("2024-02-29".to_string()))
        );
        assert_eq!(
            record.get("status"),
            Some(&Value::String("pending".to_string()))
        );
        assert_eq!(record.get("amount").and_then(Value::as_f64), Some(2500.0));
    }

    #[test]
    fn overdue_predicate_is_strict_and_status_aware() {
        let today = date(2024, 1, 15);
        let pending_past = json!({ "status": "pending", "due_date": "2024-01-10" });
        let pending_today = json!({ "status": "pending", "due_date": "2024-01-15" });
        let pending_future = json!({ "status": "pending", "due_date": "2024-01-20" });
        let paid_past = json!({ "status": "paid", "due_date": "2024-01-10" });
        let overdue_past = json!({ "status": "overdue", "due_date": "2024-01-10" });

        assert!(is_due_for_overdue(&pending_past, today));
        assert!(!is_due_for_overdue(&pending_today, today));
        assert!(!is_due_for_overdue(&pending_future, today));
        assert!(!is_due_for_overdue(&paid_past, today));
        assert!(!is_due_for_overdue(&overdue_past, today));
    }

    #[test]
    fn decimal_row_helpers_roundtrip() {
        let row = json!({ "amount": 2500.75, "quoted": "8.25", "timestamp": "2024-01-10T12:30:00Z" });
        assert_eq!(row_decimal(&row, "amount"), Some(dec!(2500.75)));
        assert_eq!(row_decimal(&row, "quoted"), Some(dec!(8.25)));
        assert_eq!(row_decimal(&row, "missing"), None);

        assert_eq!(row_date(&row, "timestamp"), Some(date(2024, 1, 10)));

        assert_eq!(decimal_json(dec!(50.00)).as_f64(), Some(50.0));
    }
}
