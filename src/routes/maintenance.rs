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
        clamp_limit_in_range, validate_input, CreateMaintenanceTicketInput,
        UpdateMaintenanceTicketInput,
    },
    services::audit::write_audit_log,
    state::AppState,
};

const MAINTENANCE_EDIT_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_MANAGER];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/maintenance-tickets",
            axum::routing::get(list_tickets).post(create_ticket),
        )
        .route(
            "/maintenance-tickets/{ticket_id}",
            axum::routing::get(get_ticket)
                .patch(update_ticket)
                .delete(delete_ticket),
        )
}

#[derive(Debug, serde::Deserialize)]
struct TicketsQuery {
    property_id: Option<String>,
    status: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, serde::Deserialize)]
struct TicketPath {
    ticket_id: String,
}

async fn list_tickets(
    State(state): State<AppState>,
    Query(query): Query<TicketsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }

    let rows = list_rows(
        pool,
        "maintenance_tickets",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMaintenanceTicketInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers)?;
    require_role(&user, MAINTENANCE_EDIT_ROLES)?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    get_row(pool, "properties", &payload.property_id, "id").await?;
    if let Some(unit_id) = non_empty_opt(payload.unit_id.as_deref()) {
        get_row(pool, "units", &unit_id, "id").await?;
    }

    let record = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .ok_or_else(|| AppError::BadRequest("Invalid maintenance payload.".to_string()))?;

    let created = create_row(pool, "maintenance_tickets", &record).await?;
    let entity_id = val_str(&created, "id");

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "create",
        "maintenance_tickets",
        Some(&entity_id),
        None,
        Some(created.clone()),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(path): Path<TicketPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user(&state, &headers)?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "maintenance_tickets", &path.ticket_id, "id").await?;
    Ok(Json(record))
}

async fn update_ticket(
    State(state): State<AppState>,
    Path(path): Path<TicketPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMaintenanceTicketInput>,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, MAINTENANCE_EDIT_ROLES)?;
    let pool = db_pool(&state)?;

    let existing = get_row(pool, "maintenance_tickets", &path.ticket_id, "id").await?;

    let mut patch = serde_json::to_value(&payload)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .map(strip_nulls)
        .unwrap_or_default();

    // Stamp completion when the ticket is being closed out.
    if let Some(status) = payload.status.as_deref() {
        if matches!(status, "completed" | "canceled") {
            patch.insert(
                "closed_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
    }

    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let updated = update_row(pool, "maintenance_tickets", &path.ticket_id, &patch, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "update",
        "maintenance_tickets",
        Some(&path.ticket_id),
        Some(existing),
        Some(updated.clone()),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_ticket(
    State(state): State<AppState>,
    Path(path): Path<TicketPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers)?;
    require_role(&user, &[ROLE_ADMIN])?;
    let pool = db_pool(&state)?;

    let removed = delete_row(pool, "maintenance_tickets", &path.ticket_id, "id").await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user.id),
        "delete",
        "maintenance_tickets",
        Some(&path.ticket_id),
        Some(removed),
        None,
    )
    .await;

    Ok(Json(json!({ "message": "Maintenance ticket removed." })))
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
