//! Structured where-clause and order-by expressions.
//!
//! Conditions are evaluated with SQL three-valued logic: `Ok(None)` is
//! UNKNOWN, and only `Some(true)` selects a row.


use crate::{
    error::InternalError,
    value::{TextMode, Value},
};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// FieldSource
///
/// Supplies field values by name to the evaluator. Takes `&mut self`
/// because the transaction may lazily load the requested table.
///

pub trait FieldSource {
    fn field_value(&mut self, field: &str) -> Result<Value, InternalError>;
}

impl FieldSource for BTreeMap<String, Value> {
    fn field_value(&mut self, field: &str) -> Result<Value, InternalError> {
        Ok(self.get(field).cloned().unwrap_or_default())
    }
}

///
/// Condition
///

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    True,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    Like(String, String),
    IsNull(String),
    IsNotNull(String),
    In(String, Vec<Value>),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl Condition {
    ///
    /// CONSTRUCTION
    ///

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like(field.into(), pattern.into())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::True => other,
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    ///
    /// EVALUATION
    ///

    /// Evaluate against one candidate.
    pub fn evaluate(
        &self,
        source: &mut dyn FieldSource,
        mode: TextMode,
    ) -> Result<Option<bool>, InternalError> {
        let result = match self {
            Self::True => Some(true),
            Self::Eq(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_eq),
            Self::Ne(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_ne),
            Self::Lt(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_lt),
            Self::Le(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_le),
            Self::Gt(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_gt),
            Self::Ge(field, value) => compare_field(source, field, value, mode)?.map(Ordering::is_ge),
            Self::Like(field, pattern) => source.field_value(field)?.like(pattern, mode),
            Self::IsNull(field) => Some(source.field_value(field)?.is_null()),
            Self::IsNotNull(field) => Some(!source.field_value(field)?.is_null()),
            Self::In(field, values) => {
                let actual = source.field_value(field)?;
                if actual.is_null() {
                    None
                } else if values.iter().any(|v| actual.eq_with(v, mode)) {
                    Some(true)
                } else if values.iter().any(Value::is_null) {
                    None
                } else {
                    Some(false)
                }
            }
            Self::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.evaluate(source, mode)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Self::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.evaluate(source, mode)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Self::Not(inner) => inner.evaluate(source, mode)?.map(|b| !b),
        };

        Ok(result)
    }

    /// True when the candidate is selected (UNKNOWN rejects).
    pub fn matches(
        &self,
        source: &mut dyn FieldSource,
        mode: TextMode,
    ) -> Result<bool, InternalError> {
        Ok(self.evaluate(source, mode)? == Some(true))
    }

    /// Field names referenced anywhere in the condition.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::True => {}
            Self::Eq(field, _)
            | Self::Ne(field, _)
            | Self::Lt(field, _)
            | Self::Le(field, _)
            | Self::Gt(field, _)
            | Self::Ge(field, _)
            | Self::Like(field, _)
            | Self::IsNull(field)
            | Self::IsNotNull(field)
            | Self::In(field, _) => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.collect_fields(out);
                }
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare_field(
    source: &mut dyn FieldSource,
    field: &str,
    value: &Value,
    mode: TextMode,
) -> Result<Option<Ordering>, InternalError> {
    Ok(source.field_value(field)?.compare(value, mode))
}

///
/// OrderBy
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Compare two candidates' sort values (one per `order` entry).
    /// Nulls sort first in ascending order.
    #[must_use]
    pub fn compare_rows(order: &[Self], left: &[Value], right: &[Value]) -> Ordering {
        for (i, term) in order.iter().enumerate() {
            let (a, b) = (&left[i], &right[i]);
            let ordering = match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.compare(b, TextMode::Cs).unwrap_or(Ordering::Equal),
            };
            let ordering = if term.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

/// Sort candidates by pre-extracted order values, stable for ties.
pub fn sort_by_order<T>(rows: &mut [(T, Vec<Value>)], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|(_, a), (_, b)| OrderBy::compare_rows(order, a, b));
}

/// Extract one sort value per `order` entry from a candidate.
pub fn order_values(
    source: &mut dyn FieldSource,
    order: &[OrderBy],
) -> Result<Vec<Value>, InternalError> {
    order.iter().map(|o| source.field_value(&o.field)).collect()
}
