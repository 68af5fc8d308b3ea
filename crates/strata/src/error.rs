use derive_more::Display;
use serde::{Deserialize, Serialize};
use strata_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use strata_schema::SchemaError;
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::NotFound => ErrorKind::NotFound,
            ErrorClass::ConstraintViolation => ErrorKind::ConstraintViolation,
            ErrorClass::Conflict => ErrorKind::Conflict,
            ErrorClass::SchemaInconsistency => ErrorKind::Schema,
            ErrorClass::DataSource => ErrorKind::DataSource,
            ErrorClass::Hook => ErrorKind::Hook,
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::InvariantViolation => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::new(ErrorKind::Schema, ErrorOrigin::Schema, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// No row exists for the requested key.
    NotFound,

    /// A commit-time check failed; nothing was saved.
    ConstraintViolation,

    /// Duplicate key, already-set key, or a write to a deleted object.
    Conflict,

    /// The schema document or a name looked up in it is invalid.
    Schema,

    DataSource,
    Hook,
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Schema,
    Object,
    Transaction,
    Cache,
    DataSource,
    Hook,
    Filter,
    Config,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Schema => Self::Schema,
            CoreErrorOrigin::Object => Self::Object,
            CoreErrorOrigin::Transaction => Self::Transaction,
            CoreErrorOrigin::Cache => Self::Cache,
            CoreErrorOrigin::DataSource => Self::DataSource,
            CoreErrorOrigin::Hook => Self::Hook,
            CoreErrorOrigin::Filter => Self::Filter,
            CoreErrorOrigin::Config => Self::Config,
        }
    }
}
