use crate::types::{ConnectionIdentity, ConnectionRole};
use thiserror::Error;

/// Unified error type for the data-access layer
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// The engine could not build its pool within the attempt budget. Fatal: callers must not
    /// retry on top of the engine's own retries.
    #[error("Database engine {identity} unavailable after {attempts} attempts")]
    EngineUnavailable { identity: ConnectionIdentity, attempts: u32 },

    /// No connection is configured for the requested identity
    #[error("No manager found with name {name} and role {role}")]
    ManagerNotFound { name: String, role: ConnectionRole },

    /// Settings were supplied for an identity whose manager already exists
    #[error("Cannot specify new settings for already constructed manager {identity}")]
    AlreadyConfigured { identity: ConnectionIdentity },

    /// The requested page starts past the largest representable row offset
    #[error("Page {page} of {limit} rows is out of range")]
    PageOutOfRange { limit: u32, page: u64 },

    /// The query builder refused to build a statement
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation {
                constraint: db_err.constraint().map(|s| s.to_string()),
                table: db_err.table().map(|s| s.to_string()),
                message: db_err.message().to_string(),
            },
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

impl DbError {
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        DbError::InvalidQuery { reason: reason.into() }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
