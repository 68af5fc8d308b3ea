//! Per-class lifecycle and per-field update hooks.
//!
//! Hooks are registered up front through `ClassFactory` values and resolved
//! against the schema once, when the database is built. Dispatch is a table
//! lookup by class id and unified field ordinal; nothing is found by name at
//! runtime.

use crate::{
    error::InternalError,
    object::ObjectHandle,
    transaction::Transaction,
    value::Value,
};
use std::{collections::HashMap, fmt, sync::Arc};
use strata_schema::{
    node::{FieldInfo, SchemaInfo},
    types::{ClassId, UnifiedFieldOrdinal},
};

///
/// ObjectHooks
///
/// Every method defaults to a no-op. Hooks receive the transaction so they
/// can read and modify other objects; objects they dirty during precommit
/// join the same commit.
///

#[allow(unused_variables)]
pub trait ObjectHooks: Send + Sync {
    /// A new object was created (key may still be unset).
    fn on_create(&self, tx: &mut Transaction, object: ObjectHandle) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_field_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
        field: &FieldInfo,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn after_field_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
        field: &FieldInfo,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    /// A reference field changed, so the collections on both the old and
    /// new target may have changed.
    fn on_collection_changed(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
        field: &FieldInfo,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_commit_insert(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_commit_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn after_commit_insert(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn after_commit_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn before_delete(&self, tx: &mut Transaction, object: ObjectHandle) -> Result<(), InternalError> {
        Ok(())
    }

    /// Cross-field validation, run after non-null checks and before any save.
    fn check_assertions(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
    ) -> Result<(), InternalError> {
        Ok(())
    }
}

///
/// FieldHooks
///

#[allow(unused_variables)]
pub trait FieldHooks: Send + Sync {
    fn before_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        Ok(())
    }

    fn after_update(
        &self,
        tx: &mut Transaction,
        object: ObjectHandle,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        Ok(())
    }
}

///
/// ClassFactory
///
/// Hooks for one class. Subclasses inherit a factory's hooks unless they
/// register their own.
///

#[derive(Clone)]
pub struct ClassFactory {
    class: String,
    hooks: Option<Arc<dyn ObjectHooks>>,
    field_hooks: Vec<(String, Arc<dyn FieldHooks>)>,
}

impl ClassFactory {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            hooks: None,
            field_hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn hooks(mut self, hooks: impl ObjectHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    #[must_use]
    pub fn field_hooks(mut self, field: impl Into<String>, hooks: impl FieldHooks + 'static) -> Self {
        self.field_hooks.push((field.into(), Arc::new(hooks)));
        self
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }
}

impl fmt::Debug for ClassFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFactory")
            .field("class", &self.class)
            .field("hooks", &self.hooks.is_some())
            .field(
                "field_hooks",
                &self.field_hooks.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

///
/// FactoryRegistry
///

#[derive(Clone, Debug, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, ClassFactory>,
}

impl FactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for its class.
    pub fn register(&mut self, factory: ClassFactory) {
        self.factories.insert(factory.class.clone(), factory);
    }

    #[must_use]
    pub fn get(&self, class: &str) -> Option<&ClassFactory> {
        self.factories.get(class)
    }

    /// Bind every factory to schema ids. Unknown class or field names fail.
    pub(crate) fn resolve(&self, schema: &SchemaInfo) -> Result<HookTable, InternalError> {
        for factory in self.factories.values() {
            let class = schema.class(&factory.class).ok_or_else(|| {
                InternalError::schema(format!(
                    "hooks registered for unknown class '{}'",
                    factory.class
                ))
            })?;
            if let Some((field, _)) = factory
                .field_hooks
                .iter()
                .find(|(field, _)| class.field(field).is_none())
            {
                return Err(InternalError::schema(format!(
                    "hooks registered for unknown field '{}.{field}'",
                    class.name
                )));
            }
        }

        let mut classes = Vec::with_capacity(schema.classes.len());
        for class in &schema.classes {
            let mut resolved = ClassHooks::default();

            // nearest class in the chain wins
            for ancestor in &class.inheritance_chain {
                let Some(factory) = self.get(&schema.class_by_id(*ancestor).name) else {
                    continue;
                };
                if resolved.object.is_none() {
                    resolved.object.clone_from(&factory.hooks);
                }
                for (name, hooks) in &factory.field_hooks {
                    if let Some(ordinal) = class.field(name).and_then(|f| f.unified_ordinal) {
                        resolved
                            .fields
                            .entry(ordinal)
                            .or_insert_with(|| Arc::clone(hooks));
                    }
                }
            }
            classes.push(resolved);
        }

        Ok(HookTable { classes })
    }
}

///
/// HookTable
///
/// Hooks resolved per class id.
///

#[derive(Clone, Default)]
pub(crate) struct HookTable {
    classes: Vec<ClassHooks>,
}

#[derive(Clone, Default)]
struct ClassHooks {
    object: Option<Arc<dyn ObjectHooks>>,
    fields: HashMap<UnifiedFieldOrdinal, Arc<dyn FieldHooks>>,
}

impl HookTable {
    pub(crate) fn object(&self, class: ClassId) -> Option<Arc<dyn ObjectHooks>> {
        self.classes.get(class.index())?.object.clone()
    }

    pub(crate) fn field(
        &self,
        class: ClassId,
        field: UnifiedFieldOrdinal,
    ) -> Option<Arc<dyn FieldHooks>> {
        self.classes.get(class.index())?.fields.get(&field).cloned()
    }
}

///
/// Entity
///
/// Typed wrapper over an object handle, one per persistent class.
///

pub trait Entity: Sized {
    const CLASS: &'static str;

    fn from_handle(handle: ObjectHandle) -> Self;

    fn handle(&self) -> ObjectHandle;
}
