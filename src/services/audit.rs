use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::warn;

use crate::repository::table_service::create_row;

/// Best-effort audit trail write. Failures are logged and never bubble up —
/// a broken audit table must not block the mutation it describes.
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    before_data: Option<Value>,
    after_data: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let mut record = Map::new();
    record.insert("action".to_string(), Value::String(action.to_string()));
    record.insert(
        "entity_type".to_string(),
        Value::String(entity_type.to_string()),
    );
    if let Some(user_id) = user_id {
        record.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    if let Some(entity_id) = entity_id {
        record.insert(
            "entity_id".to_string(),
            Value::String(entity_id.to_string()),
        );
    }
    if let Some(before) = before_data {
        record.insert("before_data".to_string(), before);
    }
    if let Some(after) = after_data {
        record.insert("after_data".to_string(), after);
    }

    if let Err(error) = create_row(pool, "audit_logs", &record).await {
        warn!(action, entity_type, "Failed to write audit log: {error}");
    }
}
