//! Field reads and writes, references, and the per-write hook contract.

use crate::{
    error::{ErrorOrigin, InternalError},
    hooks::{FieldHooks, ObjectHooks},
    object::ObjectHandle,
    transaction::Transaction,
    value::{PrimaryKey, Value},
};
use strata_schema::{
    node::{ClassInfo, FieldInfo},
    types::{ClassId, UnifiedFieldOrdinal},
};

impl Transaction {
    ///
    /// READS
    ///

    /// Current value of `field`, loading its table on first access.
    pub fn get_value(&mut self, object: ObjectHandle, field: &str) -> Result<Value, InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let (field, ordinal) = field_named(class, field)?;

        self.value_at(object, class, field, ordinal)
    }

    pub(crate) fn value_at(
        &mut self,
        object: ObjectHandle,
        class: &ClassInfo,
        field: &FieldInfo,
        ordinal: UnifiedFieldOrdinal,
    ) -> Result<Value, InternalError> {
        // key components never need I/O
        if let Some(index) = class.primary_key.iter().position(|pk| *pk == ordinal)
            && let Some(value) = self.data(object)?.key.component(index)
            && !value.is_null()
        {
            return Ok(value.clone());
        }

        self.ensure_table_loaded(object, field.table)?;

        Ok(self
            .data(object)?
            .storage
            .as_ref()
            .and_then(|storage| storage.get(ordinal))
            .cloned()
            .unwrap_or_default())
    }

    pub fn is_field_dirty(&mut self, object: ObjectHandle, field: &str) -> Result<bool, InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let (_, ordinal) = field_named(schema.class_by_id(class_id), field)?;

        Ok(self.data(object)?.is_field_dirty(ordinal))
    }

    ///
    /// WRITES
    ///

    /// Assign `field`.
    ///
    /// In order: storage is created, the field's table is loaded (unless
    /// triggers are disabled), an unchanged value returns early (with
    /// triggers disabled only when the table was already loaded), the
    /// before-update hooks run, the value is written (copying a buffer
    /// shared with the cache), the field is flagged dirty, the after-update
    /// hooks run, and the object joins the commit worklist.
    pub fn set_value(
        &mut self,
        object: ObjectHandle,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let (field, ordinal) = field_named(class, field)?;

        if class.read_only || field.read_only {
            return Err(InternalError::unsupported(
                ErrorOrigin::Object,
                format!("{}.{} is read-only", class.name, field.name),
            ));
        }
        let value = value.into().coerce_to(field.data_type)?;

        if field.primary_key {
            let index = class
                .primary_key
                .iter()
                .position(|pk| *pk == ordinal)
                .unwrap_or_default();
            return self.set_primary_key_component(object, index, value);
        }

        let data = self.data_mut(object)?;
        if data.delete_marked {
            return Err(InternalError::conflict(
                ErrorOrigin::Object,
                format!("{} {object} is marked for delete", class.name),
            ));
        }
        let triggers = !data.disable_triggers || field.force_trigger;
        let loaded = data.is_table_loaded(field.table);
        let storage = data.storage_mut(class.field_count());
        let stored =
            (!triggers && loaded).then(|| storage.get(ordinal).cloned().unwrap_or_default());

        let old = match stored {
            Some(old) => old,
            None if triggers => self.value_at(object, class, field, ordinal)?,
            None => Value::Null,
        };
        if (triggers || loaded) && old == value {
            return Ok(());
        }

        let (object_hooks, field_hooks) = if triggers {
            (
                self.runtime.hooks.object(class_id),
                self.runtime.hooks.field(class_id, ordinal),
            )
        } else {
            (None, None)
        };

        if let Some(hooks) = &field_hooks {
            hooks
                .before_update(self, object, &old, &value)
                .map_err(|err| InternalError::hook("before_update", Some(&field.name), err))?;
        }
        if let Some(hooks) = &object_hooks {
            hooks
                .before_field_update(self, object, field, &old, &value)
                .map_err(|err| InternalError::hook("before_field_update", Some(&field.name), err))?;
        }

        // hooks may have released the object
        let object = self.resolve_handle(object)?;
        let data = self.data_mut(object)?;
        let len = class.field_count();
        data.storage_mut(len).set(ordinal, value.clone());
        data.dirty_fields_mut(len).set(ordinal);
        if field.is_reference() {
            data.references.remove(&ordinal);
        }

        let after = self.run_after_update(
            object,
            field,
            (&old, &value),
            object_hooks.as_deref(),
            field_hooks.as_deref(),
        );
        self.mark_dirty(object)?;

        after
    }

    fn run_after_update(
        &mut self,
        object: ObjectHandle,
        field: &FieldInfo,
        (old, new): (&Value, &Value),
        object_hooks: Option<&dyn ObjectHooks>,
        field_hooks: Option<&dyn FieldHooks>,
    ) -> Result<(), InternalError> {
        if let Some(hooks) = field_hooks {
            hooks
                .after_update(self, object, old, new)
                .map_err(|err| InternalError::hook("after_update", Some(&field.name), err))?;
        }
        if let Some(hooks) = object_hooks {
            hooks
                .after_field_update(self, object, field, old, new)
                .map_err(|err| InternalError::hook("after_field_update", Some(&field.name), err))?;
            if field.is_reference() {
                hooks
                    .on_collection_changed(self, object, field, old, new)
                    .map_err(|err| {
                        InternalError::hook("on_collection_changed", Some(&field.name), err)
                    })?;
            }
        }

        Ok(())
    }

    /// Queue an object for the next commit even without field changes.
    pub fn mark_dirty(&mut self, object: ObjectHandle) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let data = self.data_mut(object)?;
        if !data.delete_marked {
            data.dirty = true;
        }
        self.enqueue(object);

        Ok(())
    }

    ///
    /// REFERENCES
    ///

    /// Target of a reference field, `None` when the field is null.
    pub fn get_reference(
        &mut self,
        object: ObjectHandle,
        field: &str,
    ) -> Result<Option<ObjectHandle>, InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let (field, ordinal) = field_named(class, field)?;
        let target_class = reference_target(class, field)?;

        if let Some(target) = self.data(object)?.references.get(&ordinal).copied()
            && let Ok(target) = self.resolve_handle(target)
        {
            return Ok(Some(target));
        }

        let value = self.value_at(object, class, field, ordinal)?;
        if value.is_null() {
            return Ok(None);
        }
        let key = PrimaryKey::Single(value).for_class(schema.class_by_id(target_class))?;
        let target = self.get_ref_by_id(target_class, key)?;

        let object = self.resolve_handle(object)?;
        self.data_mut(object)?.references.insert(ordinal, target);

        Ok(Some(target))
    }

    /// Point a reference field at `target` (or clear it with `None`).
    pub fn set_reference(
        &mut self,
        object: ObjectHandle,
        field: &str,
        target: Option<ObjectHandle>,
    ) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);
        let (info, ordinal) = field_named(class, field)?;
        let target_class = reference_target(class, info)?;

        let Some(target) = target else {
            return self.set_value(object, field, Value::Null);
        };
        let target = self.resolve_handle(target)?;
        let data = self.data(target)?;
        let target_info = schema.class_by_id(data.class);
        if !target_info.is_subclass_of(target_class) {
            return Err(InternalError::unsupported(
                ErrorOrigin::Object,
                format!(
                    "{}.{} cannot reference a {}",
                    class.name, info.name, target_info.name
                ),
            ));
        }
        let key = data.key.build().ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Object,
                format!("referenced {} {target} has no key", target_info.name),
            )
        })?;
        let [value] = key.components() else {
            return Err(InternalError::unsupported(
                ErrorOrigin::Object,
                format!("{}.{} cannot hold a composite key", class.name, info.name),
            ));
        };

        self.set_value(object, field, value.clone())?;
        let object = self.resolve_handle(object)?;
        self.data_mut(object)?.references.insert(ordinal, target);

        Ok(())
    }
}

/// Field by name with its unified ordinal.
pub(super) fn field_named<'a>(
    class: &'a ClassInfo,
    name: &str,
) -> Result<(&'a FieldInfo, UnifiedFieldOrdinal), InternalError> {
    let field = class
        .field(name)
        .ok_or_else(|| InternalError::schema(format!("unknown field '{}.{name}'", class.name)))?;
    let ordinal = field.unified_ordinal.ok_or_else(|| {
        InternalError::schema(format!("field '{}.{name}' is not unified", class.name))
    })?;

    Ok((field, ordinal))
}

fn reference_target(
    class: &ClassInfo,
    field: &FieldInfo,
) -> Result<ClassId, InternalError> {
    field.references.ok_or_else(|| {
        InternalError::unsupported(
            ErrorOrigin::Object,
            format!("{}.{} is not a reference field", class.name, field.name),
        )
    })
}
