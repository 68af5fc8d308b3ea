mod class;
mod collection;
mod relation;
mod table;

pub use class::{ClassInfo, ConstantInfo, OuterReference};
pub use collection::CollectionInfo;
pub use relation::RelationInfo;
pub use table::{FieldInfo, TableInfo};

use crate::{
    SchemaError,
    def::SchemaDef,
    types::{ClassId, FieldDataType, RelationId},
};
use std::collections::HashMap;

///
/// SchemaInfo
///
/// Resolved class/table/relation graph. Immutable after `resolve`; share it
/// behind an `Arc`.
///

#[derive(Clone, Debug)]
pub struct SchemaInfo {
    pub namespace: Option<String>,
    pub data_sources: Vec<String>,
    pub classes: Vec<ClassInfo>,
    pub relations: Vec<RelationInfo>,

    /// Physical tables deduplicated by name across every class.
    pub merged_tables: Vec<TableInfo>,

    pub(crate) class_index: HashMap<String, ClassId>,
    pub(crate) relation_index: HashMap<String, RelationId>,
}

impl SchemaInfo {
    /// Resolve raw definitions into a linked schema.
    pub fn resolve(def: SchemaDef) -> Result<Self, SchemaError> {
        crate::resolve::resolve_schema(def)
    }

    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.class_index.get(name).map(|id| &self.classes[id.index()])
    }

    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class_index.get(name).copied()
    }

    /// Look up a class by id. Ids only come from this schema, so a miss is a
    /// programming error.
    #[must_use]
    pub fn class_by_id(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationInfo> {
        self.relation_index
            .get(name)
            .map(|id| &self.relations[id.index()])
    }

    #[must_use]
    pub fn relation_by_id(&self, id: RelationId) -> &RelationInfo {
        &self.relations[id.index()]
    }

    #[must_use]
    pub fn merged_table(&self, name: &str) -> Option<&TableInfo> {
        self.merged_tables.iter().find(|t| t.name == name)
    }

    /// All classes deriving from `id`, depth first, `id` included.
    #[must_use]
    pub fn descendants(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.class_by_id(next).subclasses.iter().rev().copied());
        }

        out
    }

    /// Pick the concrete class (among `id` and its descendants) whose selector
    /// value matches `raw`.
    ///
    /// String discriminators compare case-insensitively, integral ones
    /// numerically, everything else by exact text.
    #[must_use]
    pub fn subclass_for_selector(&self, id: ClassId, raw: &str) -> Option<ClassId> {
        let class = self.class_by_id(id);
        let selector = class.subclass_selector_field?;
        let data_type = class.unified_field(selector)?.data_type;

        self.descendants(id).into_iter().find(|candidate| {
            self.class_by_id(*candidate)
                .subclass_selector_value
                .as_deref()
                .is_some_and(|value| selector_matches(data_type, value, raw))
        })
    }
}

fn selector_matches(data_type: FieldDataType, declared: &str, actual: &str) -> bool {
    match data_type {
        FieldDataType::String => declared.to_lowercase() == actual.to_lowercase(),
        FieldDataType::Integer | FieldDataType::Long => {
            match (declared.trim().parse::<i64>(), actual.trim().parse::<i64>()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        _ => declared == actual,
    }
}
