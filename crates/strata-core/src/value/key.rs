use crate::{
    error::{ErrorOrigin, InternalError},
    value::Value,
};
use std::{
    fmt,
    hash::{Hash, Hasher},
};
use strata_schema::node::ClassInfo;

///
/// PrimaryKey
///
/// Identity-map key: one value, or the ordered components of a composite
/// key. Equality is ordinal (case-sensitive for text). Approximate
/// numerics are never valid key components.
///

#[derive(Clone, Debug)]
pub enum PrimaryKey {
    Single(Value),
    Composite(Vec<Value>),
}

impl PrimaryKey {
    /// Build a key from its components; one component yields `Single`.
    #[must_use]
    pub fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Composite(values)
        }
    }

    #[must_use]
    pub fn components(&self) -> &[Value] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Composite(values) => values,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components().is_empty()
    }

    /// Check the key against `class` and convert every component to the
    /// declared type of its primary-key field.
    pub fn for_class(self, class: &ClassInfo) -> Result<Self, InternalError> {
        let fields = class.primary_key_fields();
        let components = match self {
            Self::Single(value) => vec![value],
            Self::Composite(values) => values,
        };

        if components.len() != fields.len() {
            return Err(InternalError::unsupported(
                ErrorOrigin::Object,
                format!(
                    "{} expects a {}-part key, got {}",
                    class.name,
                    fields.len(),
                    components.len()
                ),
            ));
        }

        let mut coerced = Vec::with_capacity(components.len());
        for (field, value) in fields.iter().zip(components) {
            if value.is_null() {
                return Err(InternalError::unsupported(
                    ErrorOrigin::Object,
                    format!("key component {}.{} is null", class.name, field.name),
                ));
            }
            coerced.push(value.coerce_to(field.data_type)?);
        }

        Ok(Self::from_values(coerced))
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.components() == other.components()
    }
}

impl Eq for PrimaryKey {}

impl Hash for PrimaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let components = self.components();
        components.len().hash(state);
        for value in components {
            hash_value(value, state);
        }
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Blob(v) => v.hash(state),
        Value::Boolean(v) => v.hash(state),
        Value::DateTime(v) => v.hash(state),
        Value::Decimal(v) => v.hash(state),
        Value::Double(v) => v.to_bits().hash(state),
        Value::Float(v) => v.to_bits().hash(state),
        Value::Guid(v) => v.hash(state),
        Value::Integer(v) => v.hash(state),
        Value::Long(v) | Value::TimeSpan(v) => v.hash(state),
        Value::Null => {}
        Value::String(v) => v.hash(state),
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{value}"),
            Self::Composite(values) => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! impl_from_for_key {
    ( $( $type:ty ),* $(,)? ) => {
        $(
            impl From<$type> for PrimaryKey {
                fn from(value: $type) -> Self {
                    Self::Single(value.into())
                }
            }
        )*
    };
}

impl_from_for_key!(Value, i32, i64, String, &str, uuid::Uuid);

///
/// KeyBuilder
///
/// Primary-key components of one object, filled in whole or one
/// component at a time. Complete once every component is non-null.
///

#[derive(Clone, Debug)]
pub struct KeyBuilder {
    components: Vec<Value>,
}

impl KeyBuilder {
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            components: vec![Value::Null; width],
        }
    }

    #[must_use]
    pub fn from_key(key: &PrimaryKey) -> Self {
        Self {
            components: key.components().to_vec(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.components.is_empty() && self.components.iter().all(|v| !v.is_null())
    }

    #[must_use]
    pub fn component(&self, index: usize) -> Option<&Value> {
        self.components.get(index)
    }

    /// Set one component. Fails once the key is complete.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), InternalError> {
        if self.is_complete() {
            return Err(InternalError::conflict(
                ErrorOrigin::Object,
                "primary key is already set",
            ));
        }
        let slot = self.components.get_mut(index).ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Object,
                format!("key component {index} out of range"),
            )
        })?;
        *slot = value;

        Ok(())
    }

    /// The finished key, once every component is set.
    #[must_use]
    pub fn build(&self) -> Option<PrimaryKey> {
        self.is_complete()
            .then(|| PrimaryKey::from_values(self.components.clone()))
    }
}
