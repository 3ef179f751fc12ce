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
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{clamp_limit_in_range, validate_input, CreateUnitInput, UpdateUnitInput},
    services::audit::write_audit_log,
    state::AppState,
};

const UNIT_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/units", axum::routing::get(list_units).post(create_unit))
        .route(
            "/units/{unit_id}",
            axum::routing::get(get_unit)
                .patch(update_unit)
                .delete(delete_unit),
        )
}

#[derive(Debug, serde::Deserialize)]
struct UnitsQuery {
    property_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct UnitPath {
    unit_id: String,
}

async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }

    let rows = list_rows(
        pool,
        "units",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, UNIT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    // Parent must exist; NotFound reads better than a bare FK violation.
    get_row(pool, "properties", &payload.property_id, "id").await?;

    let mut filters = Map::new();
    filters.insert(
        "property_id".to_string(),
        Value::String(payload.property_id.clone()),
    );
    filters.insert("number".to_string(), Value::String(payload.number.clone()));
    if count_rows(pool, "units", Some(&filters)).await? > 0 {
        return Err(AppError::Conflict(
            "A unit with this number already exists in this property.".to_string(),
        ));
    }

    let record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .ok_or_else(|| AppError::BadRequest("Invalid unit payload.".to_string()))?;

    let created = create_row(pool, "units", &record).await?;
    let entity_id = val_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "units",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "units", &path.unit_id, "id").await?;
    Ok(Json(record))
}

async fn update_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUnitInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, UNIT_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "units", &path.unit_id, "id").await?;

    if let Some(number) = non_empty_opt(payload.number.as_deref()) {
        let property_id = val_str(&existing, "property_id");
        let mut filters = Map::new();
        filters.insert("property_id".to_string(), Value::String(property_id));
        filters.insert("number".to_string(), Value::String(number));
        let duplicates = list_rows(pool, "units", Some(&filters), 2, 0, "created_at", true).await?;
        if duplicates
            .iter()
            .any(|row| val_str(row, "id") != path.unit_id)
        {
            return Err(AppError::Conflict(
                "A unit with this number already exists in this property.".to_string(),
            ));
        }
    }

    let patch = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .unwrap_or_default();
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let updated = update_row(pool, "units", &path.unit_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "units",
        Some(&path.unit_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert("unit_id".to_string(), Value::String(path.unit_id.clone()));
    let contracts = count_rows(pool, "contracts", Some(&filters)).await?;
    if contracts > 0 {
        return Err(AppError::Conflict(format!(
            "Unit has {contracts} contract(s); remove them first."
        )));
    }

    let removed = delete_row(pool, "units", &path.unit_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "units",
        Some(&path.unit_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Unit removed." })))
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
