use axum::{extract::State, http::HeaderMap, Json};
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user,
    error::{AppError, AppResult},
    repository::table_service::{count_rows, list_rows},
    services::payment_lifecycle::{decimal_json, row_decimal},
    services::schedule::{first_day_of_month, last_day_of_month},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/dashboard/overview", axum::routing::get(overview))
        .route(
            "/dashboard/recent-activity",
            axum::routing::get(recent_activity),
        )
}

/// Month-to-date financial snapshot: expected vs received rent, expense
/// totals and net profit, plus headline entity counts.
async fn overview(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let today = Utc::now().date_naive();
    let (month_start, month_end) = month_window(today);

    let total_properties = count_rows(pool, "properties", None).await?;
    let total_tenants = count_rows(pool, "tenants", None).await?;

    let mut contract_filters = Map::new();
    contract_filters.insert("status".to_string(), Value::String("active".to_string()));
    let active_contracts = count_rows(pool, "contracts", Some(&contract_filters)).await?;

    let payments = list_month_rows(pool, "payments", month_start, month_end).await?;
    let expected = sum_amounts(&payments, "amount", None);
    let received = sum_amounts(&payments, "paid_amount", Some("paid"));
    let pending = sum_amounts(&payments, "amount", Some("pending"));
    let overdue = sum_amounts(&payments, "amount", Some("overdue"));

    let received_percentage = if expected > Decimal::ZERO {
        (received / expected * Decimal::from(100))
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    let expenses = list_month_rows(pool, "expenses", month_start, month_end).await?;
    let expenses_total = sum_amounts(&expenses, "amount", None);
    let expenses_paid = sum_where_paid(&expenses, true);
    let expenses_pending = sum_where_paid(&expenses, false);

    let net_profit = received - expenses_paid;

    let mut ticket_filters = Map::new();
    ticket_filters.insert(
        "status__in".to_string(),
        Value::Array(vec![
            Value::String("open".to_string()),
            Value::String("in_progress".to_string()),
        ]),
    );
    let open_tickets = count_rows(pool, "maintenance_tickets", Some(&ticket_filters)).await?;

    Ok(Json(json!({
        "properties": { "total": total_properties },
        "contracts": { "active": active_contracts },
        "tenants": { "total": total_tenants },
        "payments": {
            "expected": decimal_json(expected),
            "received": decimal_json(received),
            "pending": decimal_json(pending),
            "overdue": decimal_json(overdue),
            "received_percentage": received_percentage,
        },
        "expenses": {
            "total": decimal_json(expenses_total),
            "paid": decimal_json(expenses_paid),
            "pending": decimal_json(expenses_pending),
        },
        "net_profit": decimal_json(net_profit),
        "maintenance": { "open_tickets": open_tickets },
        "period": {
            "start": month_start.to_string(),
            "end": month_end.to_string(),
        },
    })))
}

async fn recent_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut paid_filter = Map::new();
    paid_filter.insert("status".to_string(), Value::String("paid".to_string()));
    let recent_payments =
        list_rows(pool, "payments", Some(&paid_filter), 10, 0, "paid_date", false).await?;

    let mut expense_filter = Map::new();
    expense_filter.insert("is_paid".to_string(), Value::Bool(true));
    let recent_expenses =
        list_rows(pool, "expenses", Some(&expense_filter), 10, 0, "paid_date", false).await?;

    let recent_maintenance =
        list_rows(pool, "maintenance_tickets", None, 10, 0, "created_at", false).await?;

    Ok(Json(json!({
        "recent_payments": recent_payments,
        "recent_expenses": recent_expenses,
        "recent_maintenance": recent_maintenance,
    })))
}

async fn list_month_rows(
    pool: &sqlx::PgPool,
    table: &str,
    month_start: NaiveDate,
    month_end: NaiveDate,
) -> Result<Vec<Value>, AppError> {
    let mut filters = Map::new();
    filters.insert(
        "reference_month__gte".to_string(),
        Value::String(month_start.to_string()),
    );
    filters.insert(
        "reference_month__lte".to_string(),
        Value::String(month_end.to_string()),
    );
    list_rows(pool, table, Some(&filters), 1000, 0, "reference_month", true).await
}

fn month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = first_day_of_month(today);
    (start, last_day_of_month(start))
}

/// Sum a decimal column, optionally restricted to one status.
fn sum_amounts(rows: &[Value], key: &str, status: Option<&str>) -> Decimal {
    rows.iter()
        .filter(|row| {
            status.is_none_or(|wanted| {
                row.as_object()
                    .and_then(|object| object.get("status"))
                    .and_then(Value::as_str)
                    == Some(wanted)
            })
        })
        .filter_map(|row| row_decimal(row, key))
        .sum()
}

fn sum_where_paid(rows: &[Value], is_paid: bool) -> Decimal {
    rows.iter()
        .filter(|row| {
            row.as_object()
                .and_then(|object| object.get("is_paid"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
                == is_paid
        })
        .filter_map(|row| row_decimal(row, "amount"))
        .sum()
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::{month_window, sum_amounts, sum_where_paid};

    #[test]
    fn month_window_spans_the_calendar_month() {
        let (start, end) = month_window(NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn sums_by_status() {
        let rows = vec![
            json!({ "status": "paid", "amount": 2500.0, "paid_amount": 2550.0 }),
            json!({ "status": "pending", "amount": 1800.0 }),
            json!({ "status": "overdue", "amount": 900.0 }),
        ];

        assert_eq!(sum_amounts(&rows, "amount", None), dec!(5200));
        assert_eq!(sum_amounts(&rows, "paid_amount", Some("paid")), dec!(2550));
        assert_eq!(sum_amounts(&rows, "amount", Some("pending")), dec!(1800));
        assert_eq!(sum_amounts(&rows, "amount", Some("overdue")), dec!(900));
    }

    #[test]
    fn splits_expenses_by_paid_flag() {
        let rows = vec![
            json!({ "is_paid": true, "amount": 300.0 }),
            json!({ "is_paid": false, "amount": 120.5 }),
            json!({ "amount": 80.0 }),
        ];

        assert_eq!(sum_where_paid(&rows, true), dec!(300));
        assert_eq!(sum_where_paid(&rows, false), dec!(200.5));
    }
}
