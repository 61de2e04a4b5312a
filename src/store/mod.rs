// Board data access - every function takes a borrowed connection so callers
// decide how long a pooled connection is held.
pub mod comments;
pub mod posts;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// True when `err` is a UNIQUE/PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

/// Trim `value` and enforce a non-empty, bounded length.
pub(crate) fn required_text(field: &str, value: &str, max_chars: usize) -> StoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Invalid(format!("{field} cannot be empty")));
    }
    bounded_text(field, value, max_chars)
}

pub(crate) fn bounded_text(field: &str, value: &str, max_chars: usize) -> StoreResult<String> {
    if value.chars().count() > max_chars {
        return Err(StoreError::Invalid(format!(
            "{field} must be {max_chars} characters or less"
        )));
    }
    Ok(value.to_string())
}
