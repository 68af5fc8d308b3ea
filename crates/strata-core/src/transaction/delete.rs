//! Delete marking and referential actions on dependents.

use crate::{
    error::{ErrorOrigin, InternalError},
    filter::Condition,
    object::ObjectHandle,
    transaction::Transaction,
    value::{TextMode, Value},
};
use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};
use strata_schema::{node::OuterReference, types::DeleteAction};

impl Transaction {
    /// Mark an object for delete at the next commit.
    ///
    /// Objects referencing it are visited through the outer references of
    /// its class and every ancestor: `Cascade` marks them for delete too,
    /// `Nullify` clears the referencing field. A pending insert that is
    /// marked for delete is simply never saved.
    pub fn mark_for_delete(&mut self, object: ObjectHandle) -> Result<(), InternalError> {
        let object = self.resolve_handle(object)?;
        let (schema, class_id) = self.class_of(object)?;
        let class = schema.class_by_id(class_id);

        let data = self.data_mut(object)?;
        if data.delete_marked {
            return Ok(());
        }
        if class.read_only {
            return Err(InternalError::unsupported(
                ErrorOrigin::Transaction,
                format!("class '{}' is read-only", class.name),
            ));
        }
        data.delete_marked = true;
        let (inserted, key) = (data.insert_mode, data.key.build());
        self.enqueue(object);

        if let Some(hooks) = self.runtime.hooks.object(class_id) {
            hooks
                .before_delete(self, object)
                .map_err(|err| InternalError::hook("before_delete", None, err))?;
        }

        let Some(key) = key else {
            return Ok(());
        };
        let [key_value] = key.components() else {
            // composite keys cannot be referenced by a single field
            return Ok(());
        };

        for ancestor in &class.inheritance_chain {
            for outer in &schema.class_by_id(*ancestor).outer_references {
                if outer.on_delete == DeleteAction::Nothing {
                    continue;
                }
                let dependents = self.dependents(outer, key_value, !inserted)?;
                tracing::trace!(
                    class = %class.name,
                    %key,
                    action = %outer.on_delete,
                    dependents = dependents.len(),
                    "referential action"
                );

                let referencing = schema.class_by_id(outer.class);
                let Some(field) = referencing.unified_field(outer.field) else {
                    continue;
                };
                for dependent in dependents {
                    match outer.on_delete {
                        DeleteAction::Cascade => self.mark_for_delete(dependent)?,
                        DeleteAction::Nullify => self.set_value(dependent, &field.name, Value::Null)?,
                        DeleteAction::Nothing => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// Objects whose `outer` field holds `key`, from the identity map and,
    /// when `stored` is set, from the referencing class's data source.
    fn dependents(
        &mut self,
        outer: &OuterReference,
        key: &Value,
        stored: bool,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let schema = Arc::clone(&self.schema);
        let class = schema.class_by_id(outer.class);
        let field = class.unified_field(outer.field).ok_or_else(|| {
            InternalError::schema(format!("{} has no referencing field", class.name))
        })?;
        let key = key.clone().coerce_to(field.data_type)?;

        let mut candidates: BTreeSet<ObjectHandle> = self
            .identity
            .get(&class.id)
            .map(|keys| keys.values().copied().collect())
            .unwrap_or_default();

        let mut from_store = HashSet::new();
        if stored {
            let keys = self.connection(&class.data_source)?.load_keys(
                class,
                &Condition::Eq(field.name.clone(), key.clone()),
                &[],
                None,
            )?;
            self.stats.record_query();
            for stored_key in keys {
                candidates.insert(self.get_ref_by_id(class.id, stored_key.clone())?);
                from_store.insert(stored_key);
            }
        }

        let mut dependents = Vec::new();
        for handle in candidates {
            let Ok(handle) = self.resolve_handle(handle) else {
                continue;
            };
            let data = self.data(handle)?;
            if data.delete_marked {
                continue;
            }
            // the stored value is authoritative until the field is loaded
            let matches = if data.is_table_loaded(field.table) || data.is_field_dirty(outer.field) {
                data.storage
                    .as_ref()
                    .and_then(|storage| storage.get(outer.field))
                    .is_some_and(|value| value.eq_with(&key, TextMode::Cs))
            } else {
                data.key.build().is_some_and(|k| from_store.contains(&k))
            };
            if matches && !dependents.contains(&handle) {
                dependents.push(handle);
            }
        }

        Ok(dependents)
    }
}
