// crates/intake-core/src/error.rs

use thiserror::Error;

/// The upload could not be tokenized as delimited text. Always fatal.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("upload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("upload is empty; expected a header row")]
    Empty,

    #[error("upload contains an unterminated quoted field")]
    UnterminatedQuote,

    #[error("line {line}: unexpected text after a closing quote")]
    TextAfterClosingQuote { line: u64 },

    #[error("line {line}: expected {expected} fields, found {found}")]
    UnequalLengths { line: u64, expected: u64, found: u64 },

    #[error("CSV parsing error: {0}")]
    Csv(#[source] csv::Error),
}

impl From<csv::Error> for DecodeError {
    fn from(err: csv::Error) -> Self {
        if let csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } = err.kind()
        {
            return DecodeError::UnequalLengths {
                line: pos.as_ref().map(|p| p.line()).unwrap_or_default(),
                expected: *expected_len,
                found: *len,
            };
        }
        DecodeError::Csv(err)
    }
}

/// A decoded row carried a field the staging schema can never accept.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("line {line}: {field} value '{value}' is not an integer")]
    NotAnInteger {
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: {field} is missing")]
    Missing { line: u64, field: &'static str },

    #[error("line {line}: {field} value {value} is outside {min}..={max}")]
    OutOfRange {
        line: u64,
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("constraint violated: {0}")]
    Constraint(String),
}

impl StoreError {
    /// Reclassifies CHECK / NOT NULL violations reported by the database so
    /// callers can tell a rejected generation from an unavailable store.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &err {
            if matches!(
                db_err.kind(),
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation
            ) {
                return StoreError::Constraint(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Fatal outcomes of a single upload. Dispatch problems are not in here; they
/// are reported through [`crate::dispatch::DispatchReport`].
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("failed to decode upload: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid request row: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to replace staged requests: {0}")]
    StoreReplace(#[source] StoreError),

    #[error("staging store error: {0}")]
    Store(#[source] StoreError),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
