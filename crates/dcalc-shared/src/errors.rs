//! # Error Types
//!
//! One top-level error for fallible cross-component paths plus small domain
//! enums where callers match on individual failure modes. Background loops
//! log `DcalcError`s and continue; request handlers map them onto HTTP
//! statuses.

use thiserror::Error;

/// Result alias used across the workspace.
pub type DcalcResult<T> = Result<T, DcalcError>;

/// Top-level error for orchestrator and agent operations.
#[derive(Debug, Error)]
pub enum DcalcError {
    /// Task store failure (connection, query, decode)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failure at startup
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Broker command or subscription failure
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Malformed wire payload
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Expression rejected by validation or decomposition
    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] ExpressionError),

    /// Authentication or credential failure
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Missing or malformed environment configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DcalcError {
    /// Whether the underlying database error is a unique-constraint violation.
    ///
    /// Duplicate expression ids and usernames are idempotent-replay cases,
    /// not failures, so the API layer needs to tell them apart.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DcalcError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

/// Failure modes of expression validation and decomposition.
///
/// All of these are terminal for the submitted expression: the orchestrator
/// marks it INVALID and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("unary operations are not supported")]
    UnaryOperation,

    #[error("not enough values")]
    NotEnoughValues,

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression leaves dangling operands")]
    DanglingOperands,
}

/// Authentication failures surfaced by the API layer.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed authorization header")]
    MissingBearer,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("unknown user")]
    UnknownUser,

    #[error("wrong username or password")]
    WrongCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}
