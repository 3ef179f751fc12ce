use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::build_pool;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config);
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set — all persistence-backed routes will fail");
        }
        Ok(Self { config, db_pool })
    }
}
