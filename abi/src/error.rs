use std::time::Duration;

use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

/// Unique index backing the per-day capacity lock.
pub const CAPACITY_SLOT_CONSTRAINT: &str = "bookings_capacity_slot_key";

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("booking conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("database error")]
    DbError(sqlx::Error),

    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl Error {
    /// Input was rejected before any persisted state was consulted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidDate(_)
                | Error::InvalidTime(_)
                | Error::InvalidTimeRange(_)
                | Error::MissingField(_)
                | Error::UnknownProvider(_)
        )
    }

    /// Only store failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DbError(_))
    }

    /// The resolver's reason text for a lost booking race.
    pub fn conflict_reason(&self) -> Option<&str> {
        match self {
            Error::Conflict(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(e) => {
                let slot_taken = e
                    .try_downcast_ref::<PgDatabaseError>()
                    .map(|err| {
                        err.code() == "23505" && err.constraint() == Some(CAPACITY_SLOT_CONSTRAINT)
                    })
                    .unwrap_or(false);
                if slot_taken {
                    Error::Conflict("capacity was taken by a concurrent booking".to_string())
                } else {
                    Error::DbError(sqlx::Error::Database(e))
                }
            }
            sqlx::Error::RowNotFound => Error::NotFound,
            _ => Error::DbError(e),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidDate(a), Self::InvalidDate(b)) => a == b,
            (Self::InvalidTime(a), Self::InvalidTime(b)) => a == b,
            (Self::InvalidTimeRange(a), Self::InvalidTimeRange(b)) => a == b,
            (Self::MissingField(a), Self::MissingField(b)) => a == b,
            (Self::UnknownProvider(a), Self::UnknownProvider(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::NotFound, Self::NotFound) => true,
            // database errors are opaque
            (Self::DbError(_), Self::DbError(_)) => true,
            (Self::ConfigRead(a), Self::ConfigRead(b)) => a.kind() == b.kind(),
            (Self::ConfigParse(a), Self::ConfigParse(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Failures of the best-effort notification path. Logged, never returned to
/// the booking caller.
#[derive(Error, Debug, PartialEq)]
pub enum NotificationError {
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_should_be_classified() {
        assert!(Error::InvalidTime("25:00".into()).is_validation());
        assert!(Error::MissingField("date".into()).is_validation());
        assert!(!Error::Conflict("taken".into()).is_validation());
        assert!(Error::DbError(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::Conflict("taken".into()).is_retryable());
    }

    #[test]
    fn row_not_found_should_map_to_not_found() {
        assert_eq!(Error::from(sqlx::Error::RowNotFound), Error::NotFound);
        assert_eq!(
            Error::from(sqlx::Error::PoolClosed),
            Error::DbError(sqlx::Error::PoolClosed)
        );
    }

    #[test]
    fn conflict_should_expose_reason() {
        let err = Error::Conflict("full day blocked".into());
        assert_eq!(err.conflict_reason(), Some("full day blocked"));
        assert_eq!(err.to_string(), "booking conflict: full day blocked");
    }
}
