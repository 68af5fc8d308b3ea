//! Commit and rollback.
//!
//! Commit phases, in order:
//! 1. precommit hooks, repeated until no new dirty objects appear
//! 2. constraint checks, before any I/O
//! 3. saves: inserts and updates in worklist order, deletes in reverse,
//!    then relation tuples
//! 4. data-source commit
//! 5. cache invalidation
//! 6. postcommit: flags cleared, deleted objects dropped, after-commit hooks
//!
//! A failure in phases 1–4 leaves every object dirty, so the commit can be
//! retried after the cause is fixed.

use crate::{
    cache::InvalidationBatch,
    error::{ErrorOrigin, InternalError},
    object::ObjectHandle,
    obs::{MetricsEvent, SaveKind},
    source::{DataSource, FieldChange, SaveRequest},
    transaction::Transaction,
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc, time::Instant};
use strata_schema::types::{ClassId, UnifiedFieldOrdinal};

///
/// SaveSummary
///

#[derive(Clone, Copy, Debug, Default)]
struct SaveSummary {
    inserts: u64,
    updates: u64,
    deletes: u64,
}

impl SaveSummary {
    const fn total(self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}

impl Transaction {
    pub fn commit(&mut self) -> Result<(), InternalError> {
        if self.closed {
            return Err(InternalError::invariant(
                ErrorOrigin::Transaction,
                "transaction is closed",
            ));
        }
        let started = Instant::now();

        tracing::debug!(pending = self.worklist.len(), "commit: precommit");
        let result = self.precommit().and_then(|()| {
            tracing::debug!("commit: constraints");
            self.check_constraints()
        });
        if let Err(err) = result {
            self.reset_commit_flags();
            return Err(err);
        }

        tracing::debug!("commit: save");
        let summary = match self.save_all() {
            Ok(summary) => summary,
            Err(err) => {
                self.rollback_connections();
                self.reset_commit_flags();
                return Err(err);
            }
        };

        tracing::debug!(sources = self.connections.len(), "commit: data sources");
        if let Err(err) = self.commit_connections() {
            self.reset_commit_flags();
            return Err(err);
        }

        tracing::debug!("commit: cache invalidation");
        self.invalidate_cache();

        tracing::debug!("commit: postcommit");
        let saved = self.finish_commit();

        let elapsed = started.elapsed();
        self.stats
            .record_commit(summary.inserts, summary.updates, summary.deletes, elapsed);
        self.metrics.record(MetricsEvent::Commit {
            objects: summary.total(),
            elapsed,
        });
        tracing::debug!(
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            ?elapsed,
            "commit: done"
        );

        self.run_after_commit(saved)
    }

    /// Discard every object and pending change, and roll back every open
    /// data source. Connections stay open for reuse.
    pub fn rollback(&mut self) -> Result<(), InternalError> {
        let mut first_error = None;
        for (name, connection) in &mut self.connections {
            if let Err(err) = connection.rollback() {
                tracing::warn!(source = %name, error = %err, "rollback failed");
                first_error.get_or_insert(err);
            }
        }
        self.discard_objects();
        self.stats.record_rollback();
        self.metrics.record(MetricsEvent::Rollback);
        tracing::debug!("rolled back");

        first_error.map_or(Ok(()), Err)
    }

    ///
    /// PHASE 1
    ///

    fn precommit(&mut self) -> Result<(), InternalError> {
        loop {
            let pending: Vec<(ObjectHandle, ClassId, bool)> = self
                .worklist
                .iter()
                .filter_map(|object| {
                    let data = self.arena.get(*object)?;
                    (!data.precommitted && !data.delete_marked)
                        .then_some((*object, data.class, data.insert_mode))
                })
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            for (object, class, inserted) in pending {
                self.data_mut(object)?.precommitted = true;
                let Some(hooks) = self.runtime.hooks.object(class) else {
                    continue;
                };
                if inserted {
                    hooks
                        .before_commit_insert(self, object)
                        .map_err(|err| InternalError::hook("before_commit_insert", None, err))?;
                } else {
                    hooks
                        .before_commit_update(self, object)
                        .map_err(|err| InternalError::hook("before_commit_update", None, err))?;
                }
            }
        }
    }

    ///
    /// PHASE 2
    ///

    fn check_constraints(&mut self) -> Result<(), InternalError> {
        let schema = Arc::clone(&self.schema);
        let mut checked = Vec::with_capacity(self.worklist.len());

        for object in &self.worklist {
            let Some(data) = self.arena.get(*object) else {
                continue;
            };
            if data.delete_marked {
                continue;
            }
            let class = schema.class_by_id(data.class);

            if !data.key.is_complete() {
                let field = class
                    .primary_key_fields()
                    .iter()
                    .zip(0..)
                    .find(|(_, index)| data.key.component(*index).is_none_or(Value::is_null))
                    .map(|(field, _)| field.name.clone())
                    .unwrap_or_default();
                return Err(InternalError::constraint(&class.name, field, "primary key is not set"));
            }

            for (index, field) in class.unified_fields.iter().enumerate() {
                if !data.is_table_loaded(field.table) {
                    continue;
                }
                let value = data
                    .storage
                    .as_ref()
                    .and_then(|storage| storage.get(UnifiedFieldOrdinal::new(index)));
                let value = value.unwrap_or(&Value::Null);

                if field.requires_value() && value.is_null() {
                    return Err(InternalError::constraint(
                        &class.name,
                        &field.name,
                        "value is required",
                    ));
                }
                if let (Some(size), Value::String(text)) = (field.size, value)
                    && text.chars().count() > size as usize
                {
                    return Err(InternalError::constraint(
                        &class.name,
                        &field.name,
                        format!("value exceeds {size} characters"),
                    ));
                }
            }
            checked.push((*object, data.class));
        }

        for (object, class) in checked {
            if let Some(hooks) = self.runtime.hooks.object(class) {
                hooks
                    .check_assertions(self, object)
                    .map_err(|err| InternalError::hook("check_assertions", None, err))?;
            }
        }

        Ok(())
    }

    ///
    /// PHASE 3
    ///

    fn save_all(&mut self) -> Result<SaveSummary, InternalError> {
        let schema = Arc::clone(&self.schema);
        let worklist = self.worklist.clone();
        let mut batches = BTreeSet::new();
        let mut summary = SaveSummary::default();

        // inserts and updates, first-dirtied first
        for object in &worklist {
            let Some(data) = self.arena.get(*object) else {
                continue;
            };
            if data.delete_marked || data.visited_on_commit {
                continue;
            }
            let class = schema.class_by_id(data.class);
            let key = data.key.build().ok_or_else(|| {
                InternalError::invariant(ErrorOrigin::Transaction, "saving an object without a key")
            })?;

            let kind = if data.insert_mode {
                SaveKind::Insert
            } else {
                SaveKind::Update
            };
            let changes: Vec<FieldChange> = match kind {
                SaveKind::Insert => class
                    .unified_fields
                    .iter()
                    .enumerate()
                    .map(|(index, _)| {
                        let field = UnifiedFieldOrdinal::new(index);
                        let value = data
                            .storage
                            .as_ref()
                            .and_then(|storage| storage.get(field))
                            .cloned()
                            .unwrap_or_default();
                        FieldChange { field, value }
                    })
                    .collect(),
                _ => data
                    .dirty_fields
                    .iter()
                    .flat_map(|flags| flags.iter())
                    .map(|field| FieldChange {
                        field,
                        value: data
                            .storage
                            .as_ref()
                            .and_then(|storage| storage.get(field))
                            .cloned()
                            .unwrap_or_default(),
                    })
                    .collect(),
            };

            self.data_mut(*object)?.visited_on_commit = true;
            if kind == SaveKind::Update && changes.is_empty() {
                continue;
            }

            let request = SaveRequest {
                class,
                key: &key,
                kind,
                changes: &changes,
            };
            self.batch(&class.data_source, &mut batches)?
                .save_object_changes(&request)?;
            self.record_save(&class.name, kind, &mut summary);
        }

        // deletes, dependents first
        for object in worklist.iter().rev() {
            let Some(data) = self.arena.get(*object) else {
                continue;
            };
            if !data.delete_marked || data.visited_on_commit {
                continue;
            }
            let inserted = data.insert_mode;
            let class = schema.class_by_id(data.class);
            let key = data.key.build();
            self.data_mut(*object)?.visited_on_commit = true;

            // never saved, nothing to delete
            let Some(key) = key.filter(|_| !inserted) else {
                continue;
            };
            let request = SaveRequest {
                class,
                key: &key,
                kind: SaveKind::Delete,
                changes: &[],
            };
            self.batch(&class.data_source, &mut batches)?
                .save_object_changes(&request)?;
            self.record_save(&class.name, SaveKind::Delete, &mut summary);
        }

        // relation tuples
        let mut relations: Vec<_> = self
            .tuples
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(id, changes)| (*id, changes.clone()))
            .collect();
        relations.sort_by_key(|(id, _)| id.index());
        for (id, changes) in relations {
            let relation = schema.relation_by_id(id);
            self.batch(&relation.data_source, &mut batches)?
                .save_tuples(relation, &changes)?;
        }

        for name in &batches {
            self.connection(name)?.finish_save_changes()?;
        }

        Ok(summary)
    }

    /// Connection for `name` with its save batch open.
    fn batch(
        &mut self,
        name: &str,
        batches: &mut BTreeSet<String>,
    ) -> Result<&mut Box<dyn DataSource>, InternalError> {
        let begin = batches.insert(name.to_string());
        let connection = self.connection(name)?;
        if begin {
            connection.begin_save_changes()?;
        }

        Ok(connection)
    }

    fn record_save(&self, class: &str, kind: SaveKind, summary: &mut SaveSummary) {
        match kind {
            SaveKind::Insert => summary.inserts += 1,
            SaveKind::Update => summary.updates += 1,
            SaveKind::Delete => summary.deletes += 1,
        }
        self.metrics.record(MetricsEvent::ObjectSave { class, kind });
    }

    ///
    /// PHASE 4
    ///

    /// Commit every open connection. After the first failure the remaining
    /// connections are rolled back.
    fn commit_connections(&mut self) -> Result<(), InternalError> {
        let mut failure = None;
        for (name, connection) in &mut self.connections {
            if failure.is_some() {
                if let Err(err) = connection.rollback() {
                    tracing::warn!(source = %name, error = %err, "rollback failed");
                }
                continue;
            }
            if let Err(err) = connection.commit() {
                tracing::warn!(source = %name, error = %err, "commit failed");
                failure = Some(err);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn rollback_connections(&mut self) {
        for (name, connection) in &mut self.connections {
            if let Err(err) = connection.rollback() {
                tracing::warn!(source = %name, error = %err, "rollback failed");
            }
        }
    }

    fn reset_commit_flags(&mut self) {
        for object in &self.worklist {
            if let Some(data) = self.arena.get_mut(*object) {
                data.visited_on_commit = false;
                data.precommitted = false;
            }
        }
    }

    ///
    /// PHASE 5
    ///

    fn invalidate_cache(&self) {
        let mut batch = InvalidationBatch::default();
        for object in &self.worklist {
            let Some(data) = self.arena.get(*object) else {
                continue;
            };
            if !data.visited_on_commit || (data.insert_mode && data.delete_marked) {
                continue;
            }
            let class = self.schema.class_by_id(data.class);
            if let Some(key) = data.key.build() {
                let root = &self.schema.class_by_id(class.root).name;
                batch.objects.push((root.clone(), key));
            }
            for id in &class.inheritance_chain {
                batch.add_class(&self.schema.class_by_id(*id).name);
            }
        }
        for (id, changes) in &self.tuples {
            if !changes.is_empty() {
                batch.add_relation(&self.schema.relation_by_id(*id).name);
            }
        }

        if !batch.is_empty() {
            self.runtime.cache.invalidate(&batch);
        }
    }

    ///
    /// PHASE 6
    ///

    /// Clear commit state. Returns the saved objects that survive, with
    /// whether each was an insert.
    fn finish_commit(&mut self) -> Vec<(ObjectHandle, ClassId, bool)> {
        let worklist = std::mem::take(&mut self.worklist);
        self.tuples.clear();

        let mut saved = Vec::with_capacity(worklist.len());
        for object in worklist {
            let Some(data) = self.arena.get_mut(object) else {
                continue;
            };
            if data.delete_marked {
                self.discard(object);
                continue;
            }
            let (class, inserted) = (data.class, data.insert_mode);
            data.reset_after_commit();
            saved.push((object, class, inserted));
        }

        saved
    }

    fn run_after_commit(
        &mut self,
        saved: Vec<(ObjectHandle, ClassId, bool)>,
    ) -> Result<(), InternalError> {
        for (object, class, inserted) in saved {
            let Some(hooks) = self.runtime.hooks.object(class) else {
                continue;
            };
            if inserted {
                hooks
                    .after_commit_insert(self, object)
                    .map_err(|err| InternalError::hook("after_commit_insert", None, err))?;
            } else {
                hooks
                    .after_commit_update(self, object)
                    .map_err(|err| InternalError::hook("after_commit_update", None, err))?;
            }
        }

        Ok(())
    }
}
