use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::{require_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{clamp_limit_in_range, validate_input, CreateContractInput, UpdateContractInput},
    services::audit::write_audit_log,
    services::payment_lifecycle::ensure_schedule_generated,
    state::AppState,
};

const CONTRACT_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/contracts",
            axum::routing::get(list_contracts).post(create_contract),
        )
        .route(
            "/contracts/{contract_id}",
            axum::routing::get(get_contract)
                .patch(update_contract)
                .delete(delete_contract),
        )
        .route(
            "/contracts/{contract_id}/generate-payments",
            axum::routing::post(generate_payments),
        )
}

#[derive(Debug, serde::Deserialize)]
struct ContractsQuery {
    status: Option<String>,
    property_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct ContractPath {
    contract_id: String,
}

async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<ContractsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }

    let rows = list_rows(
        pool,
        "contracts",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_contract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateContractInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, CONTRACT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    if let Some(end_date) = payload.end_date {
        if end_date < payload.start_date {
            return Err(AppError::UnprocessableEntity(
                "end_date must not precede start_date.".to_string(),
            ));
        }
    }

    // Referenced records must exist before the insert.
    get_row(pool, "properties", &payload.property_id, "id").await?;
    if let Some(unit_id) = non_empty_opt(payload.unit_id.as_deref()) {
        get_row(pool, "units", &unit_id, "id").await?;
    }
    get_row(pool, "tenants", &payload.tenant_id, "id").await?;

    let record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .ok_or_else(|| AppError::BadRequest("Invalid contract payload.".to_string()))?;

    let created = create_row(pool, "contracts", &record).await?;
    let entity_id = val_str(&created, "id");

    // The payment schedule is NOT generated here; callers trigger it with
    // POST /contracts/{id}/generate-payments and handle that error visibly.
    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "contracts",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut record = get_row(pool, "contracts", &path.contract_id, "id").await?;

    let mut filters = Map::new();
    filters.insert(
        "contract_id".to_string(),
        Value::String(path.contract_id.clone()),
    );
    let payments = list_rows(
        pool,
        "payments",
        Some(&filters),
        500,
        0,
        "reference_month",
        false,
    )
    .await?;
    if let Some(object) = record.as_object_mut() {
        object.insert("payments".to_string(), Value::Array(payments));
    }

    Ok(Json(record))
}

async fn update_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateContractInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, CONTRACT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "contracts", &path.contract_id, "id").await?;

    let patch = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .unwrap_or_default();
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let updated = update_row(pool, "contracts", &path.contract_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "contracts",
        Some(&path.contract_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    // Payments go with the contract (ON DELETE CASCADE).
    let removed = delete_row(pool, "contracts", &path.contract_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "contracts",
        Some(&path.contract_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Contract removed." })))
}

/// Derive and persist the contract's payment schedule. Idempotent: a
/// contract that already has payments reports `count: 0` with the existing
/// total.
async fn generate_payments(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, CONTRACT_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let contract = get_row(pool, "contracts", &path.contract_id, "id").await?;
    let outcome = ensure_schedule_generated(pool, &contract).await?;

    let message = if outcome.created > 0 {
        "Payment schedule generated."
    } else if outcome.already_existed > 0 {
        "Payment schedule already exists."
    } else {
        "Contract period yields no payments."
    };

    if outcome.created > 0 {
        write_audit_log(
            state.db_pool.as_ref(),
            Some(&user.id),
            "generate_payments",
            "contracts",
            Some(&path.contract_id),
            None,
            Some(json!({ "created": outcome.created })),
        )
        .await;
    }

    Ok(Json(json!({
        "message": message,
        "count": outcome.created,
        "already_existed": outcome.already_existed,
    })))
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
