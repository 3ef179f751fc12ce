use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::Row;

use crate::{
    auth::{require_role, require_user, ROLE_ADMIN, ROLE_MANAGER},
    error::{AppError, AppResult},
    repository::table_service::{count_rows, create_row, delete_row, get_row, list_rows, update_row},
    schemas::{clamp_limit_in_range, validate_input, CreateTenantInput, UpdateTenantInput},
    services::audit::write_audit_log,
    state::AppState,
};

const TENANT_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

#[derive(Debug, serde::Deserialize)]
struct TenantsQuery {
    search: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct TenantPath {
    tenant_id: String,
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;
    let limit = clamp_limit_in_range(query.limit, 1, 500);

    // Free-text search fans out across name/cpf/email, so it bypasses the
    // generic single-column filters.
    if let Some(search) = non_empty_opt(query.search.as_deref()) {
        let pattern = format!("%{search}%");
        let rows = sqlx::query(
            "SELECT row_to_json(t) AS row
             FROM tenants t
             WHERE t.name ILIKE $1 OR t.cpf ILIKE $1 OR t.email ILIKE $1
             ORDER BY t.created_at DESC
             LIMIT $2",
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("Tenant search failed: {error}")))?;

        let data = rows
            .into_iter()
            .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
            .collect::<Vec<_>>();
        return Ok(Json(json!({ "data": data })));
    }

    let rows = list_rows(pool, "tenants", None, limit, 0, "created_at", false).await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, TENANT_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert("cpf".to_string(), Value::String(payload.cpf.clone()));
    if count_rows(pool, "tenants", Some(&filters)).await? > 0 {
        return Err(AppError::Conflict("CPF is already registered.".to_string()));
    }

    let record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .ok_or_else(|| AppError::BadRequest("Invalid tenant payload.".to_string()))?;

    let created = create_row(pool, "tenants", &record).await?;
    let entity_id = val_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "tenants",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut record = get_row(pool, "tenants", &path.tenant_id, "id").await?;

    // Attach the tenant's contracts, newest first.
    let mut filters = Map::new();
    filters.insert(
        "tenant_id".to_string(),
        Value::String(path.tenant_id.clone()),
    );
    let contracts = list_rows(pool, "contracts", Some(&filters), 100, 0, "created_at", false).await?;
    if let Some(object) = record.as_object_mut() {
        object.insert("contracts".to_string(), Value::Array(contracts));
    }

    Ok(Json(record))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, TENANT_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "tenants", &path.tenant_id, "id").await?;

    if let Some(cpf) = non_empty_opt(payload.cpf.as_deref()) {
        let mut filters = Map::new();
        filters.insert("cpf".to_string(), Value::String(cpf));
        let duplicates = list_rows(pool, "tenants", Some(&filters), 2, 0, "created_at", true).await?;
        if duplicates
            .iter()
            .any(|row| val_str(row, "id") != path.tenant_id)
        {
            return Err(AppError::Conflict("CPF is already registered.".to_string()));
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

    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "tenants",
        Some(&path.tenant_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "tenant_id".to_string(),
        Value::String(path.tenant_id.clone()),
    );
    let contracts = count_rows(pool, "contracts", Some(&filters)).await?;
    if contracts > 0 {
        return Err(AppError::Conflict(format!(
            "Tenant has {contracts} contract(s); remove them first."
        )));
    }

    let removed = delete_row(pool, "tenants", &path.tenant_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "tenants",
        Some(&path.tenant_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Tenant removed." })))
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
