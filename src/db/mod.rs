use std::{path::Path, sync::Arc, time::Duration};

use secrecy::ExposeSecret;
use sqlx::{Any, AnyPool, Transaction, any::AnyPoolOptions, migrate::Migrator};

use crate::config;

use dialect::{Backend, Dialect, dialect_for};
use error::DatabaseError;

pub mod dialect;
pub mod error;
pub mod manga;
pub mod user;

pub type SyncTransaction = Transaction<'static, Any>;

static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");
static MYSQL_MIGRATOR: Migrator = sqlx::migrate!("./migrations/mysql");

#[tracing::instrument(name = "connect database", skip_all, fields(backend))]
pub async fn connect(
    config: &config::Database,
) -> Result<(AnyPool, Arc<dyn Dialect>), DatabaseError> {
    sqlx::any::install_default_drivers();

    let url = config.url.expose_secret();
    let backend = Backend::from_url(url)?;
    tracing::Span::current().record("backend", backend.as_str());

    if backend == Backend::Sqlite {
        create_sqlite_directory(url)?;
    }

    let dialect = dialect_for(backend, Duration::from_millis(config.busy_timeout_ms));
    let session = Arc::new(dialect.session_statements());

    let pool = AnyPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .after_connect(move |conn, _meta| {
            let session = Arc::clone(&session);
            Box::pin(async move {
                for statement in session.iter() {
                    sqlx::query(statement.as_str()).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect_lazy(url)
        .map_err(DatabaseError::DatabaseError)?;

    Ok((pool, dialect))
}

#[tracing::instrument(name = "run migrations", skip(pool))]
pub async fn run_migrations(pool: &AnyPool, backend: Backend) -> Result<(), DatabaseError> {
    let migrator = match backend {
        Backend::Sqlite => &SQLITE_MIGRATOR,
        Backend::MySql => &MYSQL_MIGRATOR,
    };

    migrator.run(pool).await.map_err(DatabaseError::Migration)
}

fn create_sqlite_directory(url: &str) -> Result<(), DatabaseError> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }

    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| DatabaseError::DatabaseError(sqlx::Error::Io(e))),
        _ => Ok(()),
    }
}
