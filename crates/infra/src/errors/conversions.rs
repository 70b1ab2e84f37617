//! Conversions from external infrastructure errors into domain errors.

use punchsync_domain::PunchSyncError;
use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PunchSyncError);

impl From<InfraError> for PunchSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PunchSyncError> for InfraError {
    fn from(value: PunchSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPunchSyncError {
    fn into_punchsync(self) -> PunchSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PunchSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPunchSyncError for SqlError {
    fn into_punchsync(self) -> PunchSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        PunchSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        PunchSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        PunchSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        PunchSyncError::Database("foreign key constraint violation".into())
                    }
                    _ => PunchSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => PunchSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                PunchSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                PunchSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                PunchSyncError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                PunchSyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => PunchSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => PunchSyncError::Database("invalid SQL query".into()),
            other => PunchSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_punchsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PunchSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPunchSyncError for PoolError {
    fn into_punchsync(self) -> PunchSyncError {
        PunchSyncError::Database(format!("connection pool error: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(value.into_punchsync())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PunchSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPunchSyncError for HttpError {
    fn into_punchsync(self) -> PunchSyncError {
        if self.is_timeout() {
            return PunchSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return PunchSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => PunchSyncError::Auth(message),
                404 => PunchSyncError::NotFound(message),
                429 => PunchSyncError::Network(message),
                400..=499 => PunchSyncError::InvalidInput(message),
                500..=599 => PunchSyncError::Network(message),
                _ => PunchSyncError::Network(message),
            };
        }

        PunchSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_punchsync())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → PunchSyncError */
/* -------------------------------------------------------------------------- */

impl IntoPunchSyncError for JoinError {
    fn into_punchsync(self) -> PunchSyncError {
        if self.is_cancelled() {
            PunchSyncError::Internal("blocking task cancelled".into())
        } else {
            PunchSyncError::Internal(format!("blocking task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_punchsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
