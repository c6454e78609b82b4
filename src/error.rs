use axum::{http::StatusCode, response::IntoResponse};
use validator::ValidationErrors;

use crate::{auth::error::AuthError, db::error::DatabaseError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database error")]
    Database(DatabaseError),

    #[error("Auth error")]
    Auth(AuthError),

    #[error("Validation error")]
    Validation(ValidationErrors),

    #[error("Other error: {0}")]
    Other(anyhow::Error),
}

impl From<DatabaseError> for Error {
    fn from(value: DatabaseError) -> Self {
        Self::Database(value)
    }
}

impl Error {
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            Error::Database(database_error) => match database_error {
                DatabaseError::DatabaseError(error) => {
                    tracing::error!(err.msg = %error, err.details = ?error, "Database Error");

                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                DatabaseError::Migration(error) => {
                    tracing::error!(err.msg = %error, err.details = ?error, "Migration Error");

                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                DatabaseError::UnsupportedBackend => {
                    tracing::error!("Unsupported database backend");

                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
            Error::Auth(auth_error) => match auth_error {
                AuthError::JwtError(error) => {
                    tracing::error!(err.msg = %error, err.details = ?error, "JWT Error");

                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                AuthError::PasswordError(error) => {
                    tracing::error!(err.msg = %error, err.details = ?error, "Password Hash Error");

                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
                AuthError::Unauthenticated
                | AuthError::UserNotFound
                | AuthError::IncorrectCredential => StatusCode::UNAUTHORIZED.into_response(),
                AuthError::EmailTaken => StatusCode::CONFLICT.into_response(),
                AuthError::RegistrationClosed => StatusCode::FORBIDDEN.into_response(),
            },
            Error::Other(error) => {
                tracing::error!(err.msg = %error, err.details = ?error, "Other Error");

                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Error::Validation(validation_error) => {
                tracing::warn!(err.msg = %validation_error, err.details = ?validation_error, "Validation Error");

                (StatusCode::BAD_REQUEST, validation_error.to_string()).into_response()
            }
        }
    }
}
