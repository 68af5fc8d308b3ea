//! Identity map, object creation, lazy materialization and weak release.

use crate::{
    cache::CachedObject,
    config::ReferenceMode,
    error::{ErrorOrigin, InternalError},
    hooks::Entity,
    object::{ObjectData, ObjectHandle, ObjectState},
    obs::MetricsEvent,
    transaction::{Transaction, detached},
    value::{FieldStorage, KeyBuilder, PrimaryKey, Value},
};
use std::sync::Arc;
use strata_schema::{
    node::{ClassInfo, FieldInfo},
    types::{ClassId, TableOrdinal, UnifiedFieldOrdinal},
};

impl Transaction {
    ///
    /// CREATION
    ///

    /// Create a new object of `class`. The key comes from the key generator
    /// when the class has a generated key; otherwise set it with
    /// `set_primary_key` before committing.
    pub fn create(&mut self, class: &str) -> Result<ObjectHandle, InternalError> {
        let id = self.class_named(class)?.id;
        self.create_object(id, None)
    }

    pub fn create_with_key(
        &mut self,
        class: &str,
        key: impl Into<PrimaryKey>,
    ) -> Result<ObjectHandle, InternalError> {
        let id = self.class_named(class)?.id;
        self.create_object(id, Some(key.into()))
    }

    fn create_object(
        &mut self,
        class_id: ClassId,
        key: Option<PrimaryKey>,
    ) -> Result<ObjectHandle, InternalError> {
        let schema = Arc::clone(&self.schema);
        let class = schema.class_by_id(class_id);
        if class.read_only {
            return Err(InternalError::unsupported(
                ErrorOrigin::Transaction,
                format!("class '{}' is read-only", class.name),
            ));
        }

        let mut data = ObjectData::new_insert(class);
        data.disable_triggers = self.options.disable_triggers;
        if let (Some(selector), Some(raw)) = (
            class.subclass_selector_field,
            class.subclass_selector_value.as_deref(),
        ) && let Some(field) = class.unified_field(selector)
        {
            let value = Value::parse(field.data_type, raw)?;
            data.storage_mut(class.field_count()).set(selector, value);
        }

        let key = match key {
            Some(key) => Some(key),
            None => self.runtime.key_generator.next_key(class)?,
        };

        let object = self.arena.insert(data);
        self.enqueue(object);
        if let Some(key) = key
            && let Err(err) = self.set_primary_key(object, key)
        {
            self.discard(object);
            return Err(err);
        }

        if let Some(hooks) = self.runtime.hooks.object(class_id) {
            hooks
                .on_create(self, object)
                .map_err(|err| InternalError::hook("on_create", None, err))?;
        }

        Ok(object)
    }

    ///
    /// PRIMARY KEYS
    ///

    /// Set the whole key of an object whose key is not yet set. The object
    /// joins the identity map immediately.
    pub fn set_primary_key(
        &mut self,
        object: ObjectHandle,
        key: impl Into<PrimaryKey>,
    ) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let key = key.into().for_class(class)?;

        let data = self.data_mut(object)?;
        if data.key.is_complete() {
            return Err(key_already_set(class, object));
        }
        data.key = KeyBuilder::from_key(&key);
        let storage = data.storage_mut(class.field_count());
        for (ordinal, value) in class.primary_key.iter().zip(key.components()) {
            storage.set(*ordinal, value.clone());
        }

        self.register_or_reset(object, class)
    }

    /// Set one component of a composite key. The object registers once the
    /// last component is set.
    pub fn set_primary_key_component(
        &mut self,
        object: ObjectHandle,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);

        let ordinal = *class.primary_key.get(index).ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Object,
                format!("{} has no key component {index}", class.name),
            )
        })?;
        let field = unified_field(class, ordinal)?;
        let value = value.into();
        if value.is_null() {
            return Err(InternalError::unsupported(
                ErrorOrigin::Object,
                format!("key component {}.{} is null", class.name, field.name),
            ));
        }
        let value = value.coerce_to(field.data_type)?;

        let data = self.data_mut(object)?;
        if data.key.is_complete() {
            return Err(key_already_set(class, object));
        }
        data.key.set(index, value.clone())?;
        data.storage_mut(class.field_count()).set(ordinal, value);

        if data.key.is_complete() {
            self.register_or_reset(object, class)?;
        }

        Ok(())
    }

    /// The object's key, once every component is set.
    pub fn primary_key(&mut self, object: ObjectHandle) -> Result<Option<PrimaryKey>, InternalError> {
        let object = self.resolve_handle(object)?;

        Ok(self.data(object)?.key.build())
    }

    fn register_or_reset(
        &mut self,
        object: ObjectHandle,
        class: &ClassInfo,
    ) -> Result<(), InternalError> {
        if let Err(err) = self.register(object) {
            let data = self.data_mut(object)?;
            data.key = KeyBuilder::new(class.primary_key.len());
            for ordinal in &class.primary_key {
                data.storage_mut(class.field_count()).set(*ordinal, Value::Null);
            }
            return Err(err);
        }

        Ok(())
    }

    ///
    /// IDENTITY MAP
    ///

    /// Add an object with a complete key to the identity map, under its own
    /// class and every ancestor. Registering twice is a no-op; a different
    /// object already holding the key is a conflict.
    pub fn register(&mut self, object: ObjectHandle) -> Result<(), InternalError> {
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let data = self.data(object)?;
        if data.registered {
            return Ok(());
        }
        let key = data.key.build().ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Object,
                format!("cannot register {} {object} without a key", class.name),
            )
        })?;

        for id in &class.inheritance_chain {
            if let Some(existing) = self.identity.get(id).and_then(|keys| keys.get(&key))
                && *existing != object
            {
                return Err(InternalError::conflict(
                    ErrorOrigin::Transaction,
                    format!(
                        "{}[{key}] is already registered as {existing}",
                        schema.class_by_id(*id).name
                    ),
                ));
            }
        }
        for id in &class.inheritance_chain {
            self.identity
                .entry(*id)
                .or_default()
                .insert(key.clone(), object);
        }
        self.data_mut(object)?.registered = true;
        tracing::trace!(class = %class.name, %key, %object, "registered");

        self.release_over_limit(object);

        Ok(())
    }

    /// Remove an object from the identity map. The handle stays usable
    /// until the object is discarded.
    pub fn unregister(&mut self, object: ObjectHandle) -> Result<(), InternalError> {
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let data = self.data_mut(object)?;
        if !data.registered {
            return Ok(());
        }
        data.registered = false;

        if let Some(key) = data.key.build() {
            for id in &class.inheritance_chain {
                if let Some(keys) = self.identity.get_mut(id)
                    && keys.get(&key) == Some(&object)
                {
                    keys.remove(&key);
                }
            }
            tracing::trace!(class = %class.name, %key, %object, "unregistered");
        }

        Ok(())
    }

    /// Look up a registered object without touching any data source.
    pub fn find(
        &self,
        class: &str,
        key: impl Into<PrimaryKey>,
    ) -> Result<Option<ObjectHandle>, InternalError> {
        let class = self.class_named(class)?;
        let key = key.into().for_class(class)?;

        Ok(self
            .identity
            .get(&class.id)
            .and_then(|keys| keys.get(&key))
            .copied())
    }

    /// The registered object for `key`, or a new unloaded stub.
    ///
    /// Classes with subclasses and a discriminator read the discriminator's
    /// table first so the stub has its concrete class; that read reports
    /// `NotFound` when no row exists. Other classes defer all I/O to the
    /// first field access.
    pub fn get_ref(
        &mut self,
        class: &str,
        key: impl Into<PrimaryKey>,
    ) -> Result<ObjectHandle, InternalError> {
        let class = self.class_named(class)?;
        let (id, key) = (class.id, key.into().for_class(class)?);

        self.get_ref_by_id(id, key)
    }

    /// Get the object and load every table.
    pub fn load(
        &mut self,
        class: &str,
        key: impl Into<PrimaryKey>,
    ) -> Result<ObjectHandle, InternalError> {
        let object = self.get_ref(class, key)?;
        self.materialize(object, None)?;

        Ok(object)
    }

    /// Like `load`, with a missing row reported as `None`.
    pub fn try_load(
        &mut self,
        class: &str,
        key: impl Into<PrimaryKey>,
    ) -> Result<Option<ObjectHandle>, InternalError> {
        match self.load(class, key) {
            Ok(object) => Ok(Some(object)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn get_ref_by_id(
        &mut self,
        class_id: ClassId,
        key: PrimaryKey,
    ) -> Result<ObjectHandle, InternalError> {
        if let Some(object) = self.identity.get(&class_id).and_then(|keys| keys.get(&key)) {
            return Ok(*object);
        }

        let schema = Arc::clone(&self.schema);
        let class = schema.class_by_id(class_id);
        if !class.subclasses.is_empty() && class.subclass_selector_field.is_some() {
            return self.get_concrete_ref(class, key);
        }

        let mut data = ObjectData::new_stub(class, &key);
        data.disable_triggers = self.options.disable_triggers;
        let object = self.arena.insert(data);
        self.register_stub(object)
    }

    /// Resolve the concrete class of a polymorphic reference.
    fn get_concrete_ref(
        &mut self,
        class: &ClassInfo,
        key: PrimaryKey,
    ) -> Result<ObjectHandle, InternalError> {
        let schema = Arc::clone(&self.schema);

        if let Some(cached) = self.cached_object(class, &key)
            && schema.class_by_id(cached.class).is_subclass_of(class.id)
        {
            let concrete = schema.class_by_id(cached.class);
            let mut data = ObjectData::new_stub(concrete, &key);
            data.disable_triggers = self.options.disable_triggers;
            data.storage = Some(FieldStorage::SharedFromCache(cached.values));
            data.loaded_tables = cached.loaded_tables;
            data.from_cache = true;
            let object = self.arena.insert(data);
            return self.register_stub(object);
        }

        let Some(selector) = class.subclass_selector_field else {
            return Err(InternalError::invariant(
                ErrorOrigin::Object,
                format!("class '{}' has no discriminator", class.name),
            ));
        };
        let table = unified_field(class, selector)?.table;
        let row = self
            .connection(&class.data_source)?
            .load_object(class, &key, Some(table))?;
        self.record_load(class, table.mask_bit());
        let Some(row) = row else {
            return Err(InternalError::not_found(&class.name, &key));
        };

        let raw = row.values.get(selector.index()).cloned().unwrap_or_default();
        let concrete_id = if raw.is_null() {
            class.id
        } else {
            schema
                .subclass_for_selector(class.id, &raw.to_string())
                .unwrap_or_else(|| {
                    tracing::warn!(class = %class.name, %key, selector = %raw, "unknown discriminator");
                    class.id
                })
        };
        let concrete = schema.class_by_id(concrete_id);

        // a subclass's unified fields start with its ancestor's
        let mut values = vec![Value::Null; concrete.field_count()];
        for (slot, value) in values.iter_mut().zip(row.values) {
            *slot = value;
        }

        let mut data = ObjectData::new_stub(concrete, &key);
        data.disable_triggers = self.options.disable_triggers;
        data.storage = Some(FieldStorage::Owned(values));
        data.loaded_tables = row.tables;
        let object = self.arena.insert(data);

        self.register_stub(object)
    }

    fn register_stub(&mut self, object: ObjectHandle) -> Result<ObjectHandle, InternalError> {
        if let Err(err) = self.register(object) {
            self.arena.remove(object);
            return Err(err);
        }

        Ok(object)
    }

    ///
    /// STATE
    ///

    #[must_use]
    pub fn object_state(&self, object: ObjectHandle) -> ObjectState {
        self.arena
            .get(object)
            .map_or(ObjectState::Detached, ObjectData::state)
    }

    /// True while the object has a pending insert, update or delete.
    #[must_use]
    pub fn is_object_dirty(&self, object: ObjectHandle) -> bool {
        self.arena
            .get(object)
            .is_some_and(|data| data.insert_mode || data.dirty || data.delete_marked)
    }

    /// Name of the object's concrete class.
    pub fn class_name(&mut self, object: ObjectHandle) -> Result<&str, InternalError> {
        let object = self.resolve_handle(object)?;
        let class = self.data(object)?.class;

        Ok(&self.schema.class_by_id(class).name)
    }

    /// Map a possibly stale handle to a live one. Released objects are
    /// looked up again by key; deleted or discarded objects are an error.
    pub fn resolve_handle(&mut self, object: ObjectHandle) -> Result<ObjectHandle, InternalError> {
        if self.arena.contains(object) {
            return Ok(object);
        }
        let Some((class, key)) = self.arena.released(object) else {
            return Err(detached(object));
        };

        self.get_ref_by_id(class, key)
    }

    pub(crate) fn enqueue(&mut self, object: ObjectHandle) {
        if let Some(data) = self.arena.get_mut(object)
            && !data.queued
        {
            data.queued = true;
            self.worklist.push(object);
        }
    }

    /// Drop an object from the identity map and the arena.
    pub(crate) fn discard(&mut self, object: ObjectHandle) {
        if self.unregister(object).is_ok() {
            self.arena.remove(object);
        }
        self.worklist.retain(|h| *h != object);
        self.persistent.remove(&object);
    }

    ///
    /// WEAK RELEASE
    ///

    /// Release every clean object so later access reloads it. A no-op in
    /// strong reference mode. Returns the number of objects released.
    pub fn release_clean_objects(&mut self) -> usize {
        self.release_clean_except(None)
    }

    fn release_over_limit(&mut self, keep: ObjectHandle) {
        if let Some(max) = self.options.max_live_objects
            && self.arena.len() > max
        {
            let released = self.release_clean_except(Some(keep));
            tracing::trace!(released, max, "released clean objects over limit");
        }
    }

    fn release_clean_except(&mut self, keep: Option<ObjectHandle>) -> usize {
        if self.options.reference_mode == ReferenceMode::Strong {
            return 0;
        }

        let releasable: Vec<_> = self
            .arena
            .handles()
            .into_iter()
            .filter(|handle| Some(*handle) != keep && !self.persistent.contains_key(handle))
            .filter(|handle| {
                self.arena.get(*handle).is_some_and(|data| {
                    data.registered
                        && !data.queued
                        && !data.materializing
                        && matches!(data.state(), ObjectState::Clean | ObjectState::UpdatePending)
                })
            })
            .collect();

        for handle in &releasable {
            let Some(data) = self.arena.get(*handle) else {
                continue;
            };
            let (class, key) = (data.class, data.key.build());
            if self.unregister(*handle).is_err() {
                continue;
            }
            if let Some(key) = key {
                self.arena.release(*handle, class, key);
            } else {
                self.arena.remove(*handle);
            }
        }

        releasable.len()
    }

    ///
    /// MATERIALIZATION
    ///

    pub(crate) fn ensure_table_loaded(
        &mut self,
        object: ObjectHandle,
        table: TableOrdinal,
    ) -> Result<(), InternalError> {
        if self.data(object)?.is_table_loaded(table) {
            return Ok(());
        }

        self.materialize(object, Some(table))
    }

    /// Load one table (`Some`) or every table (`None`) of an object, cache
    /// first. Fields already written in this transaction are kept. On a
    /// missing row or a data-source error the object is discarded.
    pub(crate) fn materialize(
        &mut self,
        object: ObjectHandle,
        table: Option<TableOrdinal>,
    ) -> Result<(), InternalError> {
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let data = self.data(object)?;
        if data.insert_mode {
            return Ok(());
        }
        let wanted = table.map_or_else(|| class.all_tables_mask(), TableOrdinal::mask_bit);
        if data.loaded_tables & wanted == wanted {
            return Ok(());
        }
        let already_loaded = data.loaded_tables;
        let key = data.key.build().ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Object,
                format!("cannot load {} {object} without a key", class.name),
            )
        })?;

        if let Some(cached) = self.cached_object(class, &key)
            && cached.class == class_id
        {
            let data = self.data_mut(object)?;
            merge_cached(data, class, cached);
            if data.loaded_tables & wanted == wanted {
                return Ok(());
            }
        }

        self.data_mut(object)?.materializing = true;
        let request = if already_loaded == 0 { None } else { table };
        let result = self
            .connection(&class.data_source)
            .and_then(|connection| connection.load_object(class, &key, request));

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.discard(object);
                return Err(InternalError::not_found(&class.name, &key));
            }
            Err(err) => {
                self.discard(object);
                return Err(err);
            }
        };
        self.record_load(class, row.tables);
        tracing::trace!(class = %class.name, %key, tables = row.tables, "materialized");

        let use_cache = self.options.use_cache;
        let data = self.data_mut(object)?;
        data.materializing = false;
        let len = class.field_count();
        for (index, value) in row.values.into_iter().enumerate() {
            let ordinal = UnifiedFieldOrdinal::new(index);
            let Some(field) = class.unified_field(ordinal) else {
                continue;
            };
            if row.tables & field.table.mask_bit() == 0 || data.is_field_dirty(ordinal) {
                continue;
            }
            data.storage_mut(len).set(ordinal, value);
        }
        data.loaded_tables |= row.tables;

        let complete = data.loaded_tables & class.all_tables_mask() == class.all_tables_mask();
        let untouched = !data.dirty_fields.as_ref().is_some_and(|d| d.any());
        if use_cache && class.cached && complete && untouched {
            let values = data.storage_mut(len).to_shared();
            data.storage = Some(FieldStorage::SharedFromCache(Arc::clone(&values)));
            let entry = CachedObject {
                class: class_id,
                values,
                loaded_tables: data.loaded_tables,
            };
            let root = &schema.class_by_id(class.root).name;
            self.runtime.cache.put_object(root, &key, entry);
        }

        Ok(())
    }

    /// Cache lookup for cached classes, counted as a hit or miss.
    fn cached_object(&mut self, class: &ClassInfo, key: &PrimaryKey) -> Option<CachedObject> {
        if !self.options.use_cache || !class.cached {
            return None;
        }

        let root = &self.schema.class_by_id(class.root).name;
        let cached = self.runtime.cache.get_object(root, key);
        let hit = cached.is_some();
        self.stats.record_cache_lookup(hit);
        self.metrics.record(MetricsEvent::CacheLookup {
            class: &class.name,
            hit,
        });

        cached
    }

    fn record_load(&mut self, class: &ClassInfo, tables: u32) {
        self.stats.record_load();
        self.metrics.record(MetricsEvent::ObjectLoad {
            class: &class.name,
            tables,
        });
    }

    ///
    /// TYPED ACCESS
    ///

    pub fn get<E: Entity>(&mut self, key: impl Into<PrimaryKey>) -> Result<E, InternalError> {
        self.get_ref(E::CLASS, key).map(E::from_handle)
    }

    pub fn load_entity<E: Entity>(
        &mut self,
        key: impl Into<PrimaryKey>,
    ) -> Result<E, InternalError> {
        self.load(E::CLASS, key).map(E::from_handle)
    }

    pub fn create_entity<E: Entity>(&mut self) -> Result<E, InternalError> {
        self.create(E::CLASS).map(E::from_handle)
    }
}

/// Fill an object from a cache entry. Untouched objects share the entry's
/// buffer; objects with local writes copy the fields they have not written.
fn merge_cached(data: &mut ObjectData, class: &ClassInfo, cached: CachedObject) {
    let dirty = data.dirty_fields.as_ref().is_some_and(|d| d.any());
    if dirty {
        let storage = data.storage.get_or_insert_with(|| FieldStorage::nulls(class.field_count()));
        for (index, value) in cached.values.iter().enumerate() {
            let ordinal = UnifiedFieldOrdinal::new(index);
            let written = data.dirty_fields.as_ref().is_some_and(|d| d.is_set(ordinal));
            if !written {
                storage.set(ordinal, value.clone());
            }
        }
    } else {
        data.storage = Some(FieldStorage::SharedFromCache(cached.values));
    }
    data.loaded_tables |= cached.loaded_tables;
    data.from_cache = true;
}

pub(super) fn unified_field(
    class: &ClassInfo,
    ordinal: UnifiedFieldOrdinal,
) -> Result<&FieldInfo, InternalError> {
    class.unified_field(ordinal).ok_or_else(|| {
        InternalError::schema(format!("{} has no field at {}", class.name, ordinal.index()))
    })
}

fn key_already_set(class: &ClassInfo, object: ObjectHandle) -> InternalError {
    InternalError::conflict(
        ErrorOrigin::Object,
        format!("primary key of {} {object} is already set", class.name),
    )
}
