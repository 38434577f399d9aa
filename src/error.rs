use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;
use tracing::error;

/// MySQL error number for an insert/update pointing at a missing parent row.
const ER_NO_REFERENCED_ROW: u16 = 1452;

/// Per-field validation messages, keyed by form field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Single-field validation error.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    /// Maps MySQL integrity violations (SQLSTATE 23000): a dangling
    /// foreign key is a validation error, anything else (duplicate key) a
    /// `Conflict`. Other errors stay `Database`.
    pub fn from_write(e: sqlx::Error, conflict: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("23000") {
                let number = db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number);
                if number == Some(ER_NO_REFERENCED_ROW) {
                    return AppError::field(
                        "__all__",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                }
                return AppError::Conflict(conflict.to_string());
            }
        }
        AppError::Database(e)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Validation(errors) => json!({ "errors": errors }),
            AppError::Database(e) => {
                error!(error = %e, "Database error");
                json!({ "error": "Something went wrong, Contact with system admin" })
            }
            AppError::Internal(e) => {
                error!(error = %e, "Internal error");
                json!({ "error": "Something went wrong, Contact with system admin" })
            }
            other => json!({ "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(
            AppError::field("username", "x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PermissionDenied("no".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_database_errors_stay_database_errors() {
        let err = AppError::from_write(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(err, AppError::Database(_)));
    }

    #[derive(Debug)]
    struct DuplicateKey;

    impl std::fmt::Display for DuplicateKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Duplicate entry 'zhangsan' for key 'users.username'")
        }
    }

    impl std::error::Error for DuplicateKey {}

    impl sqlx::error::DatabaseError for DuplicateKey {
        fn message(&self) -> &str {
            "Duplicate entry 'zhangsan' for key 'users.username'"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some("23000".into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn duplicate_key_becomes_conflict() {
        let err = AppError::from_write(
            sqlx::Error::Database(Box::new(DuplicateKey)),
            "A user with that username already exists.",
        );
        match err {
            AppError::Conflict(message) => {
                assert_eq!(message, "A user with that username already exists.")
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn validation_body_lists_field_messages() {
        let resp = AppError::field("password2", "The two password fields didn't match.")
            .error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value["errors"]["password2"][0],
            "The two password fields didn't match."
        );
    }

    #[actix_web::test]
    async fn database_details_are_hidden() {
        let resp = AppError::Database(sqlx::Error::PoolTimedOut).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("pool"));
    }
}
