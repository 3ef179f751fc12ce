use axum::{routing::get, Router};

use crate::state::AppState;

pub mod contracts;
pub mod dashboard;
pub mod expenses;
pub mod health;
pub mod maintenance;
pub mod payments;
pub mod properties;
pub mod tenants;
pub mod units;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(units::router())
        .merge(tenants::router())
        .merge(contracts::router())
        .merge(payments::router())
        .merge(expenses::router())
        .merge(maintenance::router())
        .merge(dashboard::router())
}
