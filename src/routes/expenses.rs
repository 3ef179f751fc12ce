use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, validate_input, CreateExpenseInput, MarkExpensePaidInput,
        UpdateExpenseInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

const EXPENSE_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense)
                .patch(update_expense)
                .delete(delete_expense),
        )
        .route(
            "/expenses/{expense_id}/mark-as-paid",
            axum::routing::post(mark_expense_paid),
        )
}

#[derive(Debug, serde::Deserialize)]
struct ExpensesQuery {
    property_id: Option<String>,
    expense_type: Option<String>,
    is_paid: Option<bool>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct ExpensePath {
    expense_id: String,
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ExpensesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }
    if let Some(expense_type) = non_empty_opt(query.expense_type.as_deref()) {
        filters.insert("expense_type".to_string(), Value::String(expense_type));
    }
    if let Some(is_paid) = query.is_paid {
        filters.insert("is_paid".to_string(), Value::Bool(is_paid));
    }

    let rows = list_rows(
        pool,
        "expenses",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "due_date",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, EXPENSE_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    get_row(pool, "properties", &payload.property_id, "id").await?;

    let mut record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .ok_or_else(|| AppError::BadRequest("Invalid expense payload.".to_string()))?;
    record.insert("is_paid".to_string(), Value::Bool(false));

    let created = create_row(pool, "expenses", &record).await?;
    let entity_id = val_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "expenses",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "expenses", &path.expense_id, "id").await?;
    Ok(Json(record))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateExpenseInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, EXPENSE_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "expenses", &path.expense_id, "id").await?;

    let patch = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .unwrap_or_default();
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let updated = update_row(pool, "expenses", &path.expense_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "expenses",
        Some(&path.expense_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn mark_expense_paid(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
    Json(payload): Json<MarkExpensePaidInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, EXPENSE_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "expenses", &path.expense_id, "id").await?;

    let paid_date = payload
        .paid_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let mut patch = Map::new();
    patch.insert("is_paid".to_string(), Value::Bool(true));
    patch.insert(
        "paid_date".to_string(),
        Value::String(paid_date.to_string()),
    );

    let updated = update_row(pool, "expenses", &path.expense_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "mark_as_paid",
        "expenses",
        Some(&path.expense_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "expenses", &path.expense_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "expenses",
        Some(&path.expense_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Expense removed." })))
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
