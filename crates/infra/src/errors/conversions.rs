//! Conversions from external infrastructure errors into domain errors.

use keyring::Error as KeyringError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tandem_domain::TandemError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TandemError);

impl From<InfraError> for TandemError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TandemError> for InfraError {
    fn from(value: TandemError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoTandemError {
    fn into_tandem(self) -> TandemError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TandemError */
/* -------------------------------------------------------------------------- */

impl IntoTandemError for SqlError {
    fn into_tandem(self) -> TandemError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TandemError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TandemError::Database("database is locked".into())
                    }
                    // 2067 = unique index, 1555 = primary key
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        TandemError::Conflict("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        TandemError::Database("foreign key constraint violation".into())
                    }
                    _ => TandemError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TandemError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TandemError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                TandemError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                TandemError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                TandemError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => TandemError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => TandemError::Database("invalid SQL query".into()),
            other => TandemError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_tandem())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TandemError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(TandemError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → TandemError */
/* -------------------------------------------------------------------------- */

impl IntoTandemError for KeyringError {
    fn into_tandem(self) -> TandemError {
        use KeyringError::{
            Ambiguous, BadEncoding, Invalid, NoEntry, NoStorageAccess, PlatformFailure, TooLong,
        };

        let description = self.to_string();

        match self {
            NoEntry => TandemError::NotFound("keychain entry not found".into()),
            BadEncoding(_) => {
                TandemError::Auth("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => TandemError::Auth(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                TandemError::Auth(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            Ambiguous(entries) => TandemError::Auth(format!(
                "multiple keychain entries matched request ({} results)",
                entries.len()
            )),
            PlatformFailure(err) => TandemError::Auth(format!("keychain platform error: {err}")),
            NoStorageAccess(err) => {
                TandemError::Auth(format!("unable to access secure storage: {err}"))
            }
            _ => TandemError::Auth(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_tandem())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TandemError */
/* -------------------------------------------------------------------------- */

impl IntoTandemError for HttpError {
    fn into_tandem(self) -> TandemError {
        if self.is_timeout() {
            return TandemError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TandemError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => TandemError::Auth(message),
                404 => TandemError::NotFound(message),
                409 => TandemError::Conflict(message),
                429 => TandemError::Network(message),
                400..=499 => TandemError::Validation(message),
                500..=599 => TandemError::Network(message),
                _ => TandemError::Network(message),
            };
        }

        TandemError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_tandem())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
