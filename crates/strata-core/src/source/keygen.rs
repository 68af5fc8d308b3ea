use crate::{
    error::{ErrorOrigin, InternalError},
    source::MemoryStore,
    value::{PrimaryKey, Value},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use strata_schema::{node::ClassInfo, types::FieldDataType};

///
/// KeyGenerator
///
/// Supplies primary keys for newly created objects. `Ok(None)` means the
/// class's key cannot be generated and must be set by the caller.
///

pub trait KeyGenerator: Send + Sync {
    fn next_key(&self, class: &ClassInfo) -> Result<Option<PrimaryKey>, InternalError>;
}

///
/// SequenceKeyGenerator
///
/// One counter per root table, so a class and its subclasses draw from the
/// same sequence. Guid keys get a random v4 uuid; composite and text keys
/// are left to the caller.
///

#[derive(Debug, Default)]
pub struct SequenceKeyGenerator {
    counters: Mutex<HashMap<String, i64>>,
}

impl SequenceKeyGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start every root table's sequence after the largest integral key
    /// already committed to `store`.
    #[must_use]
    pub fn seeded_from(store: &MemoryStore, classes: &[ClassInfo]) -> Self {
        let generator = Self::new();
        {
            let mut counters = generator.counters.lock();
            for class in classes.iter().filter(|c| c.inherits_from.is_none()) {
                let table = &class.root_table().name;
                let max = store.max_integral_key(table);
                if let Some(max) = max {
                    counters.insert(table.clone(), max);
                }
            }
        }

        generator
    }

    /// Advance `table`'s counter and return the new value.
    fn bump(&self, table: &str) -> i64 {
        let mut counters = self.counters.lock();
        let next = counters.entry(table.to_string()).or_insert(0);
        *next = next.saturating_add(1);

        *next
    }
}

impl KeyGenerator for SequenceKeyGenerator {
    fn next_key(&self, class: &ClassInfo) -> Result<Option<PrimaryKey>, InternalError> {
        let [field] = class.primary_key_fields()[..] else {
            return Ok(None);
        };

        let value = match field.data_type {
            FieldDataType::Integer => {
                let next = self.bump(&class.root_table().name);
                let next = i32::try_from(next).map_err(|_| {
                    InternalError::conflict(
                        ErrorOrigin::DataSource,
                        format!("key sequence for '{}' overflowed", class.name),
                    )
                })?;
                Value::Integer(next)
            }
            FieldDataType::Long => Value::Long(self.bump(&class.root_table().name)),
            FieldDataType::Guid => Value::Guid(uuid::Uuid::new_v4()),
            _ => return Ok(None),
        };

        Ok(Some(PrimaryKey::Single(value)))
    }
}
