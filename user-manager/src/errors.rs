use crate::db::errors::DbError;
use crate::manager::UserError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body could not be parsed as JSON at all
    #[error("Invalid JSON body: {message}")]
    UnsupportedPayload { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Email already registered
    #[error("User already taken")]
    AlreadyTaken,

    /// Unknown email or wrong password. Which one is never revealed to the client.
    #[error("Wrong email or password")]
    LoginFailed,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::AlreadyTaken | Error::LoginFailed => StatusCode::BAD_REQUEST,
            Error::UnsupportedPayload { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } | DbError::InvalidQuery { .. } | DbError::PageOutOfRange { .. } => {
                    StatusCode::BAD_REQUEST
                }
                DbError::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DbError::ManagerNotFound { .. } | DbError::AlreadyConfigured { .. } | DbError::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::UnsupportedPayload { .. } => "Unsupported Media Type".to_string(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::AlreadyTaken => "User already taken".to_string(),
            Error::LoginFailed => "Wrong email or password".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "User already taken".to_string(),
                DbError::InvalidQuery { reason } => reason.clone(),
                DbError::PageOutOfRange { .. } => "page: out of range".to_string(),
                DbError::EngineUnavailable { .. } => "Database temporarily unavailable".to_string(),
                DbError::ManagerNotFound { .. } | DbError::AlreadyConfigured { .. } | DbError::Other(_) => {
                    "Database error occurred".to_string()
                }
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl From<UserError> for Error {
    fn from(err: UserError) -> Self {
        match err {
            UserError::AlreadyTaken => Error::AlreadyTaken,
            UserError::NotFound => Error::NotFound {
                resource: "User".to_string(),
                id: "unknown".to_string(),
            },
            UserError::WrongPassword => Error::LoginFailed,
            UserError::Password(e) => Error::Internal {
                operation: format!("process credentials: {e}"),
            },
            UserError::Database(e) => Error::Database(e),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::EngineUnavailable { .. }) => {
                tracing::error!("Database unavailable: {}", self);
            }
            Error::Database(DbError::Other(_) | DbError::ManagerNotFound { .. } | DbError::AlreadyConfigured { .. })
            | Error::Internal { .. }
            | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::BadRequest { .. }
            | Error::UnsupportedPayload { .. }
            | Error::NotFound { .. }
            | Error::AlreadyTaken
            | Error::LoginFailed => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
