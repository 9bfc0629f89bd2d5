//! Mapping of storage errors onto [`AppError`].

use ballotbox_common::AppError;
use sea_orm::{DbErr, RuntimeErr, SqlErr, sqlx};

/// Database error codes worth retrying.
///
/// `PostgreSQL` serialization failure, deadlock, lock timeout, statement
/// timeout, admin shutdown and connection exhaustion, plus `SQLite` busy.
const TRANSIENT_CODES: [&str; 8] = [
    "40001", "40P01", "55P03", "57014", "57P01", "53300", "5", "517",
];

/// Classify a sea-orm error.
///
/// Pool exhaustion, lost connections and transient statement failures are
/// retryable and become [`AppError::StorageUnavailable`]. Unique-index
/// violations become [`AppError::Conflict`] and a dangling reference becomes
/// [`AppError::NotFound`]. Anything else is a plain [`AppError::Database`].
#[must_use]
pub fn db_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => return AppError::Conflict(detail),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            return AppError::NotFound(format!("Referenced record: {detail}"));
        }
        _ => {}
    }

    if is_transient(&err) {
        return AppError::StorageUnavailable(err.to_string());
    }

    match err {
        DbErr::ConnectionAcquire(e) => AppError::StorageUnavailable(e.to_string()),
        DbErr::Conn(e) => AppError::StorageUnavailable(e.to_string()),
        other => AppError::Database(other.to_string()),
    }
}

fn is_transient(err: &DbErr) -> bool {
    let (DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e))) = err
    else {
        return false;
    };

    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_CODES.contains(&code.as_ref())),
        _ => false,
    }
}
