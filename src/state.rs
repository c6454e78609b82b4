use std::sync::Arc;

use sqlx::AnyPool;

use crate::{
    config::Config,
    db::{self, error::DatabaseError},
    sync::{Clock, SyncEngine, SystemClock},
};

pub struct AppState {
    pub pool: AnyPool,
    pub sync: SyncEngine,
    pub config: Config,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub async fn init(config: Config) -> Result<Self, DatabaseError> {
        Self::init_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn init_with_clock(
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DatabaseError> {
        let (pool, dialect) = db::connect(&config.database).await?;

        if config.application.run_migration {
            tracing::warn!("Running database migrations...");
            db::run_migrations(&pool, dialect.backend()).await?;
        }

        let sync = SyncEngine::new(pool.clone(), dialect, clock);

        Ok(AppState { pool, sync, config })
    }
}
