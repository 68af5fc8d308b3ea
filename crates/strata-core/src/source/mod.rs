//! Data-source contract consumed by the commit engine and object lifecycle.
//!
//! A data source owns one connection for one transaction. Everything the
//! engine needs from a database goes through `DataSource`; SQL generation,
//! drivers and wire protocols live behind it.

mod keygen;
mod memory;

#[cfg(test)]
mod tests;

use crate::{
    config::{DataSourceConfig, IsolationLevel},
    error::{ErrorOrigin, InternalError},
    filter::{Condition, OrderBy},
    obs::SaveKind,
    value::{PrimaryKey, Value},
};
use std::{collections::HashMap, fmt, sync::Arc};
use strata_schema::{
    node::{ClassInfo, RelationInfo},
    types::{TableOrdinal, UnifiedFieldOrdinal},
};

// re-exports
pub use keygen::{KeyGenerator, SequenceKeyGenerator};
pub use memory::{MemoryDataSource, MemoryDataSourceFactory, MemoryStore, SharedMemoryStore};

///
/// FieldChange
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange {
    pub field: UnifiedFieldOrdinal,
    pub value: Value,
}

///
/// SaveRequest
///
/// One object's pending changes. Updates carry only dirty fields; inserts
/// carry every field; deletes carry none.
///

#[derive(Clone, Copy, Debug)]
pub struct SaveRequest<'a> {
    pub class: &'a ClassInfo,
    pub key: &'a PrimaryKey,
    pub kind: SaveKind,
    pub changes: &'a [FieldChange],
}

///
/// LoadedRow
///
/// Values indexed by the requested class's unified ordinals, plus the mask
/// of tables actually read. Fields of unread tables are `Null`.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedRow {
    pub values: Vec<Value>,
    pub tables: u32,
}

///
/// TupleChanges
///
/// Accumulated many-to-many edits for one relation. Each tuple holds the
/// side-0 key then the side-1 key.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TupleChanges {
    pub added: Vec<[PrimaryKey; 2]>,
    pub removed: Vec<[PrimaryKey; 2]>,
}

impl TupleChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Record an addition, cancelling a pending removal of the same tuple.
    pub fn add(&mut self, tuple: [PrimaryKey; 2]) {
        if let Some(pos) = self.removed.iter().position(|t| *t == tuple) {
            self.removed.remove(pos);
        } else if !self.added.contains(&tuple) {
            self.added.push(tuple);
        }
    }

    /// Record a removal, cancelling a pending addition of the same tuple.
    pub fn remove(&mut self, tuple: [PrimaryKey; 2]) {
        if let Some(pos) = self.added.iter().position(|t| *t == tuple) {
            self.added.remove(pos);
        } else if !self.removed.contains(&tuple) {
            self.removed.push(tuple);
        }
    }
}

///
/// DataSource
///

pub trait DataSource: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<(), InternalError>;
    fn close(&mut self) -> Result<(), InternalError>;
    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), InternalError>;
    fn commit(&mut self) -> Result<(), InternalError>;
    fn rollback(&mut self) -> Result<(), InternalError>;

    fn begin_save_changes(&mut self) -> Result<(), InternalError>;
    fn save_object_changes(&mut self, request: &SaveRequest<'_>) -> Result<(), InternalError>;
    fn finish_save_changes(&mut self) -> Result<(), InternalError>;

    /// Load every table of `class` (`table == None`) or exactly one table.
    /// `Ok(None)` means no row exists for `key`.
    fn load_object(
        &mut self,
        class: &ClassInfo,
        key: &PrimaryKey,
        table: Option<TableOrdinal>,
    ) -> Result<Option<LoadedRow>, InternalError>;

    /// Keys of `class` rows (subclass rows included) matching `condition`.
    fn load_keys(
        &mut self,
        class: &ClassInfo,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<PrimaryKey>, InternalError>;

    /// Raw parametrized query.
    fn execute_query(&mut self, query: &str, params: &[Value])
    -> Result<Vec<Vec<Value>>, InternalError>;

    fn save_tuples(
        &mut self,
        relation: &RelationInfo,
        changes: &TupleChanges,
    ) -> Result<(), InternalError>;

    /// Keys on the other side of every tuple whose `side` equals `key`.
    fn load_tuples(
        &mut self,
        relation: &RelationInfo,
        side: usize,
        key: &PrimaryKey,
    ) -> Result<Vec<PrimaryKey>, InternalError>;
}

///
/// DataSourceFactory
///
/// Opens a fresh connection for one transaction.
///

pub trait DataSourceFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Box<dyn DataSource>, InternalError>;
}

impl<F> DataSourceFactory for F
where
    F: Fn(&str) -> Result<Box<dyn DataSource>, InternalError> + Send + Sync,
{
    fn create(&self, name: &str) -> Result<Box<dyn DataSource>, InternalError> {
        self(name)
    }
}

///
/// DataSourceRegistry
///
/// Data-source name → factory. Shared by every transaction of a database.
///

#[derive(Clone, Default)]
pub struct DataSourceRegistry {
    factories: HashMap<String, Arc<dyn DataSourceFactory>>,
    configs: HashMap<String, DataSourceConfig>,
}

impl DataSourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build factories for every configured source. Only the `memory` kind
    /// ships with the runtime; other kinds must be registered by the caller.
    pub fn from_config(
        sources: &std::collections::BTreeMap<String, DataSourceConfig>,
    ) -> Result<Self, InternalError> {
        let mut registry = Self::new();
        for (name, config) in sources {
            match config.kind.as_str() {
                "memory" => {
                    registry.register(name, MemoryDataSourceFactory::new(MemoryStore::shared()));
                }
                other => {
                    return Err(InternalError::config(format!(
                        "data source '{name}' has unsupported kind '{other}'"
                    )));
                }
            }
            registry.configs.insert(name.clone(), config.clone());
        }

        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, factory: impl DataSourceFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Per-source isolation override, if configured.
    #[must_use]
    pub fn isolation_override(&self, name: &str) -> Option<IsolationLevel> {
        self.configs.get(name).and_then(|c| c.isolation_level)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DataSource>, InternalError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            InternalError::unsupported(
                ErrorOrigin::DataSource,
                format!("no data source registered under '{name}'"),
            )
        })?;

        factory.create(name)
    }
}

impl fmt::Debug for DataSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceRegistry")
            .field("sources", &self.factories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
