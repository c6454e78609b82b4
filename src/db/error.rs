#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Database error")]
    DatabaseError(sqlx::Error),
    #[error("Migration error")]
    Migration(sqlx::migrate::MigrateError),
    #[error("Unsupported database url, expected sqlite: or mysql:")]
    UnsupportedBackend,
}
