use anyhow::Context;
use secrecy::SecretString;
use sqlx::{AnyPool, Row};

use crate::{
    auth::{compute_password_hash, error::AuthError},
    error::Error,
    model::{ResourceKind, User},
    telemetry::spawn_blocking_with_tracing,
};

use super::{SyncTransaction, error::DatabaseError};

#[tracing::instrument(
    name = "get or create user",
    skip_all,
    fields(email = %email, allow_registration)
)]
pub async fn get_or_create_user(
    pool: &AnyPool,
    email: String,
    password: SecretString,
    allow_registration: bool,
) -> Result<(User, String), Error> {
    let row = sqlx::query(
        r#"
        SELECT
            id, email, nickname, password_hash
        FROM
            users
        WHERE
            email = ?
    "#,
    )
    .bind(&email)
    .fetch_optional(pool)
    .await
    .map_err(DatabaseError::DatabaseError)?;

    if let Some(row) = row {
        let password_hash: String = row
            .try_get("password_hash")
            .map_err(DatabaseError::DatabaseError)?;
        let user = User {
            id: row.try_get("id").map_err(DatabaseError::DatabaseError)?,
            email: row.try_get("email").map_err(DatabaseError::DatabaseError)?,
            nickname: row.try_get("nickname").map_err(DatabaseError::DatabaseError)?,
        };

        return Ok((user, password_hash));
    }

    if !allow_registration {
        return Err(Error::Auth(AuthError::UserNotFound));
    }

    create_user(pool, email, password).await
}

#[tracing::instrument(name = "create user", skip_all, fields(email = %email))]
pub async fn create_user(
    pool: &AnyPool,
    email: String,
    password: SecretString,
) -> Result<(User, String), Error> {
    let taken = sqlx::query("SELECT 1 FROM users WHERE email = ? LIMIT 1")
        .bind(&email)
        .fetch_optional(pool)
        .await
        .map_err(DatabaseError::DatabaseError)?
        .is_some();
    if taken {
        return Err(Error::Auth(AuthError::EmailTaken));
    }

    let password_hash = spawn_blocking_with_tracing(move || compute_password_hash(password))
        .await
        .context("compute password hash")
        .map_err(Error::Other)??;

    sqlx::query(
        r#"
        INSERT INTO users
            (email, password_hash)
        VALUES
            (?, ?)
    "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref database_error) if database_error.is_unique_violation() => {
            Error::Auth(AuthError::EmailTaken)
        }
        e => Error::Database(DatabaseError::DatabaseError(e)),
    })?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            id, email, nickname
        FROM
            users
        WHERE
            email = ?
    "#,
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .map_err(DatabaseError::DatabaseError)?;

    Ok((user, password_hash))
}

#[tracing::instrument(name = "get user by id", skip(pool))]
pub async fn get_user_by_id_optional(pool: &AnyPool, user_id: i64) -> Result<Option<User>, Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT
            id, email, nickname
        FROM
            users
        WHERE
            id = ?
    "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::Database(DatabaseError::DatabaseError(e)))
}

fn sync_timestamp_column(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::History => "history_sync_timestamp",
        ResourceKind::Favourites => "favourites_sync_timestamp",
    }
}

/// Raises the user's sync timestamp for `kind` to `now`. An already larger
/// value is kept.
pub async fn touch_sync_timestamp(
    tx: &mut SyncTransaction,
    user_id: i64,
    kind: ResourceKind,
    now: i64,
) -> Result<(), sqlx::Error> {
    let column = sync_timestamp_column(kind);
    let sql = format!(
        "UPDATE users SET {column} = CASE WHEN {column} IS NULL OR {column} < ? THEN ? ELSE {column} END WHERE id = ?"
    );

    sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub async fn get_sync_timestamp(
    pool: &AnyPool,
    user_id: i64,
    kind: ResourceKind,
) -> Result<Option<i64>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM users WHERE id = ?",
        sync_timestamp_column(kind)
    );

    let timestamp = sqlx::query_scalar::<_, Option<i64>>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(timestamp.flatten())
}
