mod key;
mod storage;


use crate::error::{ErrorOrigin, InternalError};
use chrono::NaiveDateTime;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::{borrow::Cow, cmp::Ordering, fmt};
use strata_schema::{node::FieldInfo, types::FieldDataType};
use uuid::Uuid;

// re-exports
pub use key::{KeyBuilder, PrimaryKey};
pub use storage::{DirtyFlags, FieldStorage};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

///
/// TextMode
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TextMode {
    #[default]
    Cs, // case-sensitive
    Ci, // case-insensitive
}

///
/// Value
///
/// One field value. Every `FieldDataType` maps onto exactly one variant;
/// `Image` shares `Blob` and `BooleanAsInteger` shares `Boolean`.
///
/// Null → SQL NULL, legal for any declared type.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    Blob(Vec<u8>),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    Guid(Uuid),
    Integer(i32),
    Long(i64),
    #[default]
    Null,
    String(String),

    /// Milliseconds.
    TimeSpan(i64),
}

impl Value {
    ///
    /// CONSTRUCTION
    ///

    /// Non-null value assigned to fields of freshly created objects.
    #[must_use]
    pub fn default_for(data_type: FieldDataType) -> Self {
        match data_type {
            FieldDataType::Blob | FieldDataType::Image => Self::Blob(Vec::new()),
            FieldDataType::Boolean | FieldDataType::BooleanAsInteger => Self::Boolean(false),
            FieldDataType::DateTime => Self::DateTime(NaiveDateTime::default()),
            FieldDataType::Decimal => Self::Decimal(Decimal::ZERO),
            FieldDataType::Double => Self::Double(0.0),
            FieldDataType::Float => Self::Float(0.0),
            FieldDataType::Guid => Self::Guid(Uuid::nil()),
            FieldDataType::Integer => Self::Integer(0),
            FieldDataType::Long => Self::Long(0),
            FieldDataType::String => Self::String(String::new()),
            FieldDataType::TimeSpan => Self::TimeSpan(0),
        }
    }

    /// Value a new object starts with for `field`. Nullable fields and
    /// text or binary fields start null and must be assigned explicitly;
    /// other non-null fields start at their type default.
    #[must_use]
    pub fn initial_for(field: &FieldInfo) -> Self {
        let by_reference = matches!(
            field.data_type,
            FieldDataType::String | FieldDataType::Blob | FieldDataType::Image
        );
        if field.nullable || by_reference {
            Self::Null
        } else {
            Self::default_for(field.data_type)
        }
    }

    /// Parse declared text (constants, selector values, literals) as `data_type`.
    pub fn parse(data_type: FieldDataType, text: &str) -> Result<Self, InternalError> {
        let text = text.trim();
        let invalid = |err: &dyn fmt::Display| {
            InternalError::unsupported(
                ErrorOrigin::Object,
                format!("cannot parse '{text}' as {data_type}: {err}"),
            )
        };

        let value = match data_type {
            FieldDataType::Blob | FieldDataType::Image => {
                return Err(invalid(&"binary values have no text form"));
            }
            FieldDataType::Boolean | FieldDataType::BooleanAsInteger => {
                match text.to_ascii_lowercase().as_str() {
                    "true" | "1" => Self::Boolean(true),
                    "false" | "0" => Self::Boolean(false),
                    _ => return Err(invalid(&"expected true/false")),
                }
            }
            FieldDataType::DateTime => Self::DateTime(
                NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT).map_err(|e| invalid(&e))?,
            ),
            FieldDataType::Decimal => Self::Decimal(text.parse().map_err(|e| invalid(&e))?),
            FieldDataType::Double => Self::Double(text.parse().map_err(|e| invalid(&e))?),
            FieldDataType::Float => Self::Float(text.parse().map_err(|e| invalid(&e))?),
            FieldDataType::Guid => Self::Guid(Uuid::parse_str(text).map_err(|e| invalid(&e))?),
            FieldDataType::Integer => Self::Integer(text.parse().map_err(|e| invalid(&e))?),
            FieldDataType::Long => Self::Long(text.parse().map_err(|e| invalid(&e))?),
            FieldDataType::String => Self::String(text.to_string()),
            FieldDataType::TimeSpan => Self::TimeSpan(text.parse().map_err(|e| invalid(&e))?),
        };

        Ok(value)
    }

    ///
    /// TYPES
    ///

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True when the variant is the storage form of `data_type` (or Null).
    #[must_use]
    pub const fn conforms_to(&self, data_type: FieldDataType) -> bool {
        matches!(
            (self, data_type),
            (Self::Null, _)
                | (Self::Blob(_), FieldDataType::Blob | FieldDataType::Image)
                | (
                    Self::Boolean(_),
                    FieldDataType::Boolean | FieldDataType::BooleanAsInteger
                )
                | (Self::DateTime(_), FieldDataType::DateTime)
                | (Self::Decimal(_), FieldDataType::Decimal)
                | (Self::Double(_), FieldDataType::Double)
                | (Self::Float(_), FieldDataType::Float)
                | (Self::Guid(_), FieldDataType::Guid)
                | (Self::Integer(_), FieldDataType::Integer)
                | (Self::Long(_), FieldDataType::Long)
                | (Self::String(_), FieldDataType::String)
                | (Self::TimeSpan(_), FieldDataType::TimeSpan)
        )
    }

    /// Convert to the storage form of `data_type`.
    ///
    /// Lossless numeric conversions, integer booleans and text parsing are
    /// accepted; anything else is rejected rather than silently truncated.
    pub fn coerce_to(self, data_type: FieldDataType) -> Result<Self, InternalError> {
        if self.conforms_to(data_type) {
            return Ok(self);
        }

        let coerced = match (&self, data_type) {
            (Self::String(text), _) => return Self::parse(data_type, text),
            (Self::Integer(v), FieldDataType::Long) => Some(Self::Long(i64::from(*v))),
            (Self::Long(v), FieldDataType::Integer) => i32::try_from(*v).ok().map(Self::Integer),
            (Self::Integer(v), FieldDataType::Decimal) => Some(Self::Decimal(Decimal::from(*v))),
            (Self::Long(v), FieldDataType::Decimal) => Some(Self::Decimal(Decimal::from(*v))),
            (Self::Integer(v), FieldDataType::Double) => Some(Self::Double(f64::from(*v))),
            (Self::Float(v), FieldDataType::Double) => Some(Self::Double(f64::from(*v))),
            (Self::Integer(v), FieldDataType::BooleanAsInteger) => Some(Self::Boolean(*v != 0)),
            (Self::Long(v), FieldDataType::BooleanAsInteger) => Some(Self::Boolean(*v != 0)),
            (Self::Long(v), FieldDataType::TimeSpan) => Some(Self::TimeSpan(*v)),
            _ => None,
        };

        coerced.ok_or_else(|| {
            InternalError::unsupported(
                ErrorOrigin::Object,
                format!("cannot convert {} to {data_type}", self.type_name()),
            )
        })
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Blob(_) => "Blob",
            Self::Boolean(_) => "Boolean",
            Self::DateTime(_) => "DateTime",
            Self::Decimal(_) => "Decimal",
            Self::Double(_) => "Double",
            Self::Float(_) => "Float",
            Self::Guid(_) => "Guid",
            Self::Integer(_) => "Integer",
            Self::Long(_) => "Long",
            Self::Null => "Null",
            Self::String(_) => "String",
            Self::TimeSpan(_) => "TimeSpan",
        }
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(i64::from(*v)),
            Self::Long(v) | Self::TimeSpan(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    ///
    /// COMPARISON
    ///

    fn numeric(&self) -> Option<Decimal> {
        match self {
            Self::Integer(v) => Some(Decimal::from(*v)),
            Self::Long(v) => Some(Decimal::from(*v)),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    fn approximate(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(f64::from(*v)),
            Self::Long(v) => v.to_f64(),
            Self::Decimal(v) => v.to_f64(),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn text_with_mode(s: &str, mode: TextMode) -> Cow<'_, str> {
        match mode {
            TextMode::Cs => Cow::Borrowed(s),
            TextMode::Ci => Cow::Owned(s.to_lowercase()),
        }
    }

    /// Order two values the way a where-clause does.
    ///
    /// Exact numerics compare as decimals, approximate numerics as `f64`.
    /// Null and mismatched variants are unordered.
    #[must_use]
    pub fn compare(&self, other: &Self, mode: TextMode) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::String(a), Self::String(b)) => {
                Some(Self::text_with_mode(a, mode).cmp(&Self::text_with_mode(b, mode)))
            }
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Guid(a), Self::Guid(b)) => Some(a.cmp(b)),
            (Self::TimeSpan(a), Self::TimeSpan(b)) => Some(a.cmp(b)),
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => self.approximate()?.partial_cmp(&other.approximate()?),
            },
        }
    }

    /// Equality under `mode`; Null equals nothing.
    #[must_use]
    pub fn eq_with(&self, other: &Self, mode: TextMode) -> bool {
        self.compare(other, mode) == Some(Ordering::Equal)
    }

    /// Substring/prefix match with SQL `%` and `_` wildcards.
    #[must_use]
    pub fn like(&self, pattern: &str, mode: TextMode) -> Option<bool> {
        let text = self.as_str()?;
        let text: Vec<char> = Self::text_with_mode(text, mode).chars().collect();
        let pattern: Vec<char> = Self::text_with_mode(pattern, mode).chars().collect();

        Some(like_match(&text, &pattern))
    }
}

fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_match(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_match(&text[1..], rest),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.format(DATE_TIME_FORMAT)),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Guid(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) | Self::TimeSpan(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

///
/// Conversions
///

macro_rules! impl_from_for_value {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Boolean,
    Decimal => Decimal,
    f32 => Float,
    f64 => Double,
    i32 => Integer,
    i64 => Long,
    NaiveDateTime => DateTime,
    String => String,
    &str => String,
    Uuid => Guid,
    Vec<u8> => Blob,
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_try_from_value {
    ( $( $type:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl TryFrom<Value> for $type {
                type Error = InternalError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(InternalError::unsupported(
                            ErrorOrigin::Object,
                            format!(
                                "expected {} value, found {}",
                                stringify!($variant),
                                other.type_name()
                            ),
                        )),
                    }
                }
            }
        )*
    };
}

impl_try_from_value! {
    bool => Boolean,
    Decimal => Decimal,
    f32 => Float,
    f64 => Double,
    i32 => Integer,
    NaiveDateTime => DateTime,
    String => String,
    Uuid => Guid,
    Vec<u8> => Blob,
}

impl TryFrom<Value> for i64 {
    type Error = InternalError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| {
            InternalError::unsupported(
                ErrorOrigin::Object,
                format!("expected Long value, found {}", value.type_name()),
            )
        })
    }
}
