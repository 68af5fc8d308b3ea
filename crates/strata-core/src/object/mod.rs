//! Per-transaction object slots.

mod arena;

use crate::value::{DirtyFlags, FieldStorage, KeyBuilder, PrimaryKey, Value};
use derive_more::Display;
use std::collections::HashMap;
use strata_schema::{
    node::ClassInfo,
    types::{ClassId, TableOrdinal, UnifiedFieldOrdinal},
};

pub(crate) use arena::ObjectArena;

///
/// ObjectHandle
///
/// Generational index into a transaction's object arena. A handle outlives
/// its slot when the object is released or deleted; the transaction then
/// either rehydrates it or reports it as detached.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("#{index}.{generation}")]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) const fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) const fn generation(self) -> u32 {
        self.generation
    }
}

///
/// ObjectState
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ObjectState {
    /// Allocated, primary key not fully set.
    Uninitialized,

    /// New object, every field considered loaded, saved by the next commit.
    InsertPending,

    /// Existing object referenced by key, nothing loaded yet.
    UpdatePending,

    /// A data-source fetch is in progress.
    Materializing,

    Clean,
    Dirty,
    MarkedForDelete,

    /// Released, deleted by a commit, or discarded by a rollback.
    Detached,
}

///
/// ObjectData
///

#[derive(Clone, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct ObjectData {
    pub class: ClassId,
    pub key: KeyBuilder,
    pub registered: bool,

    /// Created on first field access.
    pub storage: Option<FieldStorage>,
    pub dirty_fields: Option<DirtyFlags>,
    pub loaded_tables: u32,

    /// Resolved targets of reference fields, cleared on reassignment.
    pub references: HashMap<UnifiedFieldOrdinal, ObjectHandle>,

    pub insert_mode: bool,
    pub dirty: bool,
    pub queued: bool,
    pub delete_marked: bool,
    pub visited_on_commit: bool,
    pub precommitted: bool,
    pub disable_triggers: bool,
    pub from_cache: bool,
    pub materializing: bool,
}

impl ObjectData {
    fn blank(class: &ClassInfo) -> Self {
        Self {
            class: class.id,
            key: KeyBuilder::new(class.primary_key.len()),
            registered: false,
            storage: None,
            dirty_fields: None,
            loaded_tables: 0,
            references: HashMap::new(),
            insert_mode: false,
            dirty: false,
            queued: false,
            delete_marked: false,
            visited_on_commit: false,
            precommitted: false,
            disable_triggers: false,
            from_cache: false,
            materializing: false,
        }
    }

    /// New object: every table loaded, every field dirty, initial values set.
    pub fn new_insert(class: &ClassInfo) -> Self {
        let values: Vec<Value> = class.unified_fields.iter().map(Value::initial_for).collect();

        Self {
            storage: Some(FieldStorage::Owned(values)),
            dirty_fields: Some(DirtyFlags::all(class.field_count())),
            loaded_tables: class.all_tables_mask(),
            insert_mode: true,
            dirty: true,
            ..Self::blank(class)
        }
    }

    /// Existing object known only by key.
    pub fn new_stub(class: &ClassInfo, key: &PrimaryKey) -> Self {
        Self {
            key: KeyBuilder::from_key(key),
            ..Self::blank(class)
        }
    }

    pub const fn is_table_loaded(&self, table: TableOrdinal) -> bool {
        self.insert_mode || self.loaded_tables & table.mask_bit() != 0
    }

    pub fn is_field_dirty(&self, field: UnifiedFieldOrdinal) -> bool {
        self.dirty_fields.as_ref().is_some_and(|d| d.is_set(field))
    }

    /// Storage, created as all-null on first use.
    pub fn storage_mut(&mut self, len: usize) -> &mut FieldStorage {
        self.storage.get_or_insert_with(|| FieldStorage::nulls(len))
    }

    pub fn dirty_fields_mut(&mut self, len: usize) -> &mut DirtyFlags {
        self.dirty_fields.get_or_insert_with(|| DirtyFlags::new(len))
    }

    pub const fn state(&self) -> ObjectState {
        if self.delete_marked {
            ObjectState::MarkedForDelete
        } else if !self.registered {
            ObjectState::Uninitialized
        } else if self.materializing {
            ObjectState::Materializing
        } else if self.insert_mode {
            ObjectState::InsertPending
        } else if self.dirty {
            ObjectState::Dirty
        } else if self.loaded_tables == 0 {
            ObjectState::UpdatePending
        } else {
            ObjectState::Clean
        }
    }

    /// Forget commit-cycle bookkeeping after a successful commit.
    pub fn reset_after_commit(&mut self) {
        self.insert_mode = false;
        self.dirty = false;
        self.queued = false;
        self.visited_on_commit = false;
        self.precommitted = false;
        if let Some(flags) = self.dirty_fields.as_mut() {
            flags.clear_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn new_objects_are_fully_loaded_and_dirty() {
        let schema = test_support::company();
        let manager = schema.class("Manager").expect("Manager should exist");
        let data = ObjectData::new_insert(manager);

        assert_eq!(data.state(), ObjectState::Uninitialized);
        assert!(data.is_table_loaded(TableOrdinal::new(2)));
        assert!(data.dirty_fields.as_ref().is_some_and(DirtyFlags::any));

        let budget = manager.field("Budget").and_then(|f| f.unified_ordinal);
        let name = manager.field("Name").and_then(|f| f.unified_ordinal);
        let storage = data.storage.as_ref().expect("storage is eager for inserts");
        assert_eq!(
            storage.get(budget.expect("Budget is unified")),
            Some(&Value::Long(0))
        );
        assert_eq!(storage.get(name.expect("Name is unified")), Some(&Value::Null));
    }

    #[test]
    fn stubs_report_update_pending_then_clean() {
        let schema = test_support::company();
        let person = schema.class("Person").expect("Person should exist");
        let mut data = ObjectData::new_stub(person, &PrimaryKey::from(1i64));
        data.registered = true;

        assert_eq!(data.state(), ObjectState::UpdatePending);
        data.loaded_tables = 1;
        assert_eq!(data.state(), ObjectState::Clean);
        data.dirty = true;
        assert_eq!(data.state(), ObjectState::Dirty);
        data.delete_marked = true;
        assert_eq!(data.state(), ObjectState::MarkedForDelete);
    }

    #[test]
    fn handles_display_index_and_generation() {
        assert_eq!(ObjectHandle::new(3, 1).to_string(), "#3.1");
    }
}
