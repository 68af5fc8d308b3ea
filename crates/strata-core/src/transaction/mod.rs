//! Transaction-scoped identity map and commit engine.
//!
//! A `Transaction` owns every object it hands out. Objects are addressed by
//! `ObjectHandle`; each (class, primary key) resolves to at most one live
//! handle. Field writes mark objects dirty, and `commit` turns the dirty
//! worklist into per-table saves across the data sources involved.
//!
//! The API is synchronous and `&mut self` throughout; a transaction is never
//! shared between threads.

mod commit;
mod delete;
mod fields;
mod identity;
mod query;

#[cfg(test)]
mod tests;

use crate::{
    config::{IsolationLevel, TransactionOptions},
    error::{ErrorOrigin, InternalError},
    object::{ObjectArena, ObjectData, ObjectHandle},
    obs::{MetricsEvent, MetricsSink, TransactionStats},
    runtime::Runtime,
    source::{DataSource, TupleChanges},
    value::{PrimaryKey, Value},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use strata_schema::{
    node::{ClassInfo, SchemaInfo},
    types::{ClassId, RelationId},
};

// re-exports
pub use query::ObjectFieldSource;

///
/// Transaction
///

pub struct Transaction {
    runtime: Arc<Runtime>,
    schema: Arc<SchemaInfo>,
    options: TransactionOptions,
    metrics: Arc<dyn MetricsSink>,

    arena: ObjectArena,

    /// Every registered object appears under its own class and each ancestor.
    identity: HashMap<ClassId, HashMap<PrimaryKey, ObjectHandle>>,

    /// Objects with pending inserts, updates or deletes, in first-dirtied order.
    worklist: Vec<ObjectHandle>,

    /// Open connections by data-source name.
    connections: BTreeMap<String, Box<dyn DataSource>>,

    tuples: HashMap<RelationId, TupleChanges>,
    persistent: HashMap<ObjectHandle, BTreeMap<String, Value>>,

    stats: TransactionStats,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(runtime: Arc<Runtime>, options: TransactionOptions) -> Self {
        let schema = Arc::clone(&runtime.schema);
        let metrics = Arc::clone(&runtime.metrics);
        metrics.record(MetricsEvent::TransactionBegin);

        Self {
            runtime,
            schema,
            options,
            metrics,
            arena: ObjectArena::default(),
            identity: HashMap::new(),
            worklist: Vec::new(),
            connections: BTreeMap::new(),
            tuples: HashMap::new(),
            persistent: HashMap::new(),
            stats: TransactionStats::default(),
            closed: false,
        }
    }

    /// Replace the metrics sink for the rest of this transaction.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaInfo> {
        &self.schema
    }

    #[must_use]
    pub const fn options(&self) -> &TransactionOptions {
        &self.options
    }

    #[must_use]
    pub const fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    /// Number of objects currently live in the arena.
    #[must_use]
    pub const fn live_objects(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.worklist.is_empty() || self.tuples.values().any(|t| !t.is_empty())
    }

    /// Change isolation for this transaction and every open connection.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), InternalError> {
        self.options.isolation_level = level;
        for (name, connection) in &mut self.connections {
            let effective = self.runtime.sources.isolation_override(name).unwrap_or(level);
            connection.set_isolation_level(effective)?;
        }

        Ok(())
    }

    ///
    /// PERSISTENT VALUES
    ///
    /// Named side values attached to an object for the lifetime of the
    /// transaction. Never saved; discarded by rollback.
    ///

    pub fn set_persistent_value(
        &mut self,
        object: ObjectHandle,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        self.persistent
            .entry(object)
            .or_default()
            .insert(name.into(), value.into());

        Ok(())
    }

    pub fn persistent_value(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<Option<Value>, InternalError> {
        let object = self.resolve_handle(object)?;

        Ok(self
            .persistent
            .get(&object)
            .and_then(|values| values.get(name))
            .cloned())
    }

    ///
    /// RAW QUERIES
    ///

    pub fn execute_query(
        &mut self,
        data_source: &str,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<Vec<Value>>, InternalError> {
        self.stats.record_query();
        self.metrics.record(MetricsEvent::Query {
            source: data_source,
        });

        self.connection(data_source)?.execute_query(query, params)
    }

    ///
    /// LIFECYCLE
    ///

    /// Roll back pending work and close every connection.
    pub fn close(mut self) -> Result<(), InternalError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), InternalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        for (name, connection) in &mut self.connections {
            let result = connection.rollback().and_then(|()| connection.close());
            if let Err(err) = result {
                tracing::warn!(source = %name, error = %err, "closing data source failed");
                first_error.get_or_insert(err);
            }
        }
        self.connections.clear();
        self.discard_objects();

        first_error.map_or(Ok(()), Err)
    }

    /// Drop every object and pending change without touching data sources.
    fn discard_objects(&mut self) {
        self.arena.clear();
        self.identity.clear();
        self.worklist.clear();
        self.tuples.clear();
        self.persistent.clear();
    }

    ///
    /// INTERNALS
    ///

    /// Connection for `name`, opened on first use with the current isolation.
    fn connection(&mut self, name: &str) -> Result<&mut Box<dyn DataSource>, InternalError> {
        if self.closed {
            return Err(InternalError::invariant(
                ErrorOrigin::Transaction,
                "transaction is closed",
            ));
        }

        if !self.connections.contains_key(name) {
            let mut connection = self.runtime.sources.create(name)?;
            connection.open()?;
            let level = self
                .runtime
                .sources
                .isolation_override(name)
                .unwrap_or(self.options.isolation_level);
            connection.set_isolation_level(level)?;
            tracing::debug!(source = %name, isolation = %level, "data source opened");
            self.connections.insert(name.to_string(), connection);
        }

        self.connections.get_mut(name).ok_or_else(|| {
            InternalError::invariant(ErrorOrigin::Transaction, "connection vanished")
        })
    }

    fn class_named(&self, name: &str) -> Result<&ClassInfo, InternalError> {
        self.schema
            .class(name)
            .ok_or_else(|| InternalError::schema(format!("unknown class '{name}'")))
    }

    fn data(&self, object: ObjectHandle) -> Result<&ObjectData, InternalError> {
        self.arena.get(object).ok_or_else(|| detached(object))
    }

    fn data_mut(&mut self, object: ObjectHandle) -> Result<&mut ObjectData, InternalError> {
        self.arena.get_mut(object).ok_or_else(|| detached(object))
    }

    /// Class of a live object. The schema is shared, so the borrow does not
    /// pin `self`.
    fn class_of(&self, object: ObjectHandle) -> Result<(Arc<SchemaInfo>, ClassId), InternalError> {
        let class = self.data(object)?.class;

        Ok((Arc::clone(&self.schema), class))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(error = %err, "transaction dropped with a failing data source");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("live_objects", &self.arena.len())
            .field("pending", &self.worklist.len())
            .field("connections", &self.connections.keys().collect::<Vec<_>>())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn detached(object: ObjectHandle) -> InternalError {
    InternalError::invariant(
        ErrorOrigin::Object,
        format!("object {object} is not live in this transaction"),
    )
}
