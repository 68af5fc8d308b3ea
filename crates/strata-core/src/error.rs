use std::fmt;
use strata_schema::SchemaError;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// `class` says what went wrong, `origin` says which layer noticed.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// No row exists for the requested key.
    pub fn not_found(class: impl Into<String>, key: impl fmt::Display) -> Self {
        let class = class.into();
        let key = key.to_string();

        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Object,
            message: format!("object not found: {class}[{key}]"),
            detail: Some(ErrorDetail::NotFound { class, key }),
        }
    }

    /// A commit-time constraint failed for one field of one object.
    pub(crate) fn constraint(
        class: impl Into<String>,
        field: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        let class = class.into();
        let field = field.into();

        Self {
            class: ErrorClass::ConstraintViolation,
            origin: ErrorOrigin::Transaction,
            message: format!("constraint violation on {class}.{field}: {message}"),
            detail: Some(ErrorDetail::Constraint { class, field }),
        }
    }

    /// Cross-field assertion failure raised by user code.
    pub fn assertion(class: impl Into<String>, message: impl Into<String>) -> Self {
        let class = class.into();
        let message = message.into();

        Self {
            class: ErrorClass::ConstraintViolation,
            origin: ErrorOrigin::Hook,
            message: format!("assertion failed on {class}: {message}"),
            detail: Some(ErrorDetail::Constraint {
                class,
                field: String::new(),
            }),
        }
    }

    /// Wrap a hook failure with the hook name and (for field hooks) the field.
    pub(crate) fn hook(hook: &'static str, field: Option<&str>, source: Self) -> Self {
        let message = match field {
            Some(field) => format!("hook '{hook}' failed for field '{field}': {source}"),
            None => format!("hook '{hook}' failed: {source}"),
        };

        Self {
            class: ErrorClass::Hook,
            origin: ErrorOrigin::Hook,
            message,
            detail: Some(ErrorDetail::Hook {
                hook,
                field: field.map(str::to_string),
                source: Box::new(source),
            }),
        }
    }

    /// Wrap a driver error, keeping the original as the error source.
    pub fn data_source(
        source: impl Into<String>,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let err = err.into();

        Self {
            class: ErrorClass::DataSource,
            origin: ErrorOrigin::DataSource,
            message: format!("data source '{}' failed: {err}", source.into()),
            detail: Some(ErrorDetail::DataSource(err)),
        }
    }

    pub(crate) fn conflict(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Conflict, origin, message)
    }

    pub(crate) fn invariant(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, origin, message)
    }

    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    /// Schema lookups that fail at runtime (unknown class or field name).
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::SchemaInconsistency, ErrorOrigin::Schema, message)
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Config, message)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::NotFound { .. }))
    }

    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(self.class, ErrorClass::ConstraintViolation)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<SchemaError> for InternalError {
    fn from(err: SchemaError) -> Self {
        Self {
            class: ErrorClass::SchemaInconsistency,
            origin: ErrorOrigin::Schema,
            message: err.to_string(),
            detail: Some(ErrorDetail::Schema(err)),
        }
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum ErrorDetail {
    #[error("constraint on {class}.{field}")]
    Constraint { class: String, field: String },

    #[error("{0}")]
    DataSource(Box<dyn std::error::Error + Send + Sync>),

    #[error("hook '{hook}' failed: {source}")]
    Hook {
        hook: &'static str,
        field: Option<String>,
        source: Box<InternalError>,
    },

    #[error("{class}[{key}] not found")]
    NotFound { class: String, key: String },

    #[error("{0}")]
    Schema(SchemaError),
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorClass {
    Conflict,
    ConstraintViolation,
    DataSource,
    Hook,
    InvariantViolation,
    NotFound,
    SchemaInconsistency,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SchemaInconsistency => "schema_inconsistency",
            Self::NotFound => "not_found",
            Self::ConstraintViolation => "constraint_violation",
            Self::DataSource => "data_source",
            Self::Hook => "hook",
            Self::Conflict => "conflict",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorOrigin {
    Cache,
    Config,
    DataSource,
    Filter,
    Hook,
    Object,
    Schema,
    Transaction,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Object => "object",
            Self::Transaction => "transaction",
            Self::Cache => "cache",
            Self::DataSource => "data_source",
            Self::Hook => "hook",
            Self::Filter => "filter",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}
