use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, validate_input, CreatePaymentInput, MarkPaymentPaidInput,
        UpdatePaymentInput,
    },
    services::audit::write_audit_log,
    services::payment_lifecycle::{mark_payment_paid, materialize_overdue},
    state::AppState,
};

const PAYMENT_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(create_payment),
        )
        .route(
            "/payments/{payment_id}",
            axum::routing::get(get_payment)
                .patch(update_payment)
                .delete(delete_payment),
        )
        .route(
            "/payments/{payment_id}/mark-as-paid",
            axum::routing::post(mark_as_paid),
        )
}

#[derive(Debug, serde::Deserialize)]
struct PaymentsQuery {
    status: Option<String>,
    contract_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct PaymentPath {
    payment_id: String,
}

/// List obligations, newest reference month first. Pending rows whose due
/// date has passed are flipped to overdue before the response is built, so
/// the transition is durable from the first listing on.
async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }
    if let Some(contract_id) = non_empty_opt(query.contract_id.as_deref()) {
        filters.insert("contract_id".to_string(), Value::String(contract_id));
    }

    let mut rows = list_rows(
        pool,
        "payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "reference_month",
        false,
    )
    .await?;

    materialize_overdue(pool, &mut rows, Utc::now().date_naive()).await?;

    Ok(Json(json!({ "data": rows })))
}

/// Manual obligation entry outside the generated schedule.
async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, PAYMENT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    get_row(pool, "contracts", &payload.contract_id, "id").await?;

    let record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .ok_or_else(|| AppError::BadRequest("Invalid payment payload.".to_string()))?;

    let created = create_row(pool, "payments", &record).await?;
    let entity_id = val_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "payments",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "payments", &path.payment_id, "id").await?;
    Ok(Json(record))
}

async fn update_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePaymentInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, PAYMENT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "payments", &path.payment_id, "id").await?;

    let patch = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .unwrap_or_default();
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let updated = update_row(pool, "payments", &path.payment_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "payments",
        Some(&path.payment_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

/// Record a payment against the obligation; late charges are computed when
/// the paid date (default: today) falls after the due date.
async fn mark_as_paid(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
    Json(payload): Json<MarkPaymentPaidInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, PAYMENT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let paid_amount = Decimal::from_f64_retain(payload.paid_amount)
        .ok_or_else(|| AppError::BadRequest("paid_amount is not a valid number.".to_string()))?;

    let before = get_row(pool, "payments", &path.payment_id, "id").await?;
    let updated = mark_payment_paid(pool, &path.payment_id, paid_amount, payload.paid_date).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "mark_as_paid",
        "payments",
        Some(&path.payment_id),
        Some(before),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "payments", &path.payment_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "payments",
        Some(&path.payment_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Payment removed." })))
}

fn strip_nulls(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect()
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn val_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}
