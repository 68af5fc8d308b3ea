use crate::{
    node::{CollectionInfo, FieldInfo, TableInfo},
    types::{ClassId, DeleteAction, LocalFieldOrdinal, TableOrdinal, UnifiedFieldOrdinal},
};

///
/// ClassInfo
///
/// Resolved persistent class. Built once by `SchemaInfo::resolve` and never
/// mutated afterwards.
///

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub data_source: String,

    pub inherits_from: Option<ClassId>,
    pub root: ClassId,

    /// This class first, then each ancestor up to the root.
    pub inheritance_chain: Vec<ClassId>,

    /// Direct subclasses.
    pub subclasses: Vec<ClassId>,

    pub subclass_selector_field: Option<UnifiedFieldOrdinal>,
    pub subclass_selector_value: Option<String>,

    pub read_only: bool,
    pub cached: bool,
    pub cache_collections: bool,
    pub precache: bool,
    pub label: Option<String>,

    /// Tables declared by this class, with ordinals from the unified stack.
    pub local_tables: Vec<TableInfo>,

    /// Inherited tables followed by local tables; ordinal 0 is the root table.
    pub unified_tables: Vec<TableInfo>,

    pub unified_fields: Vec<FieldInfo>,
    pub local_fields: Vec<FieldInfo>,

    /// Primary-key components, all on the root table.
    pub primary_key: Vec<UnifiedFieldOrdinal>,

    pub collections: Vec<CollectionInfo>,
    pub constants: Vec<ConstantInfo>,

    /// Fields of other classes that reference this class.
    pub outer_references: Vec<OuterReference>,
}

impl ClassInfo {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.unified_fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn unified_field(&self, ordinal: UnifiedFieldOrdinal) -> Option<&FieldInfo> {
        self.unified_fields.get(ordinal.index())
    }

    #[must_use]
    pub fn local_field(&self, ordinal: LocalFieldOrdinal) -> Option<&FieldInfo> {
        self.local_fields.get(ordinal.index())
    }

    #[must_use]
    pub fn table(&self, ordinal: TableOrdinal) -> Option<&TableInfo> {
        self.unified_tables.get(ordinal.index())
    }

    #[must_use]
    pub fn root_table(&self) -> &TableInfo {
        // resolution rejects classes without tables
        &self.unified_tables[0]
    }

    #[must_use]
    pub const fn field_count(&self) -> usize {
        self.unified_fields.len()
    }

    #[must_use]
    pub const fn table_count(&self) -> usize {
        self.unified_tables.len()
    }

    /// Mask with one bit set for every unified table.
    #[must_use]
    pub const fn all_tables_mask(&self) -> u32 {
        let count = self.unified_tables.len();
        if count >= 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        }
    }

    #[must_use]
    pub fn primary_key_fields(&self) -> Vec<&FieldInfo> {
        self.primary_key
            .iter()
            .filter_map(|o| self.unified_field(*o))
            .collect()
    }

    #[must_use]
    pub const fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    #[must_use]
    pub fn is_subclass_of(&self, ancestor: ClassId) -> bool {
        self.inheritance_chain.contains(&ancestor)
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionInfo> {
        self.collections.iter().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn constant(&self, name: &str) -> Option<&ConstantInfo> {
        self.constants.iter().find(|c| c.name == name)
    }
}

///
/// ConstantInfo
///

#[derive(Clone, Debug)]
pub struct ConstantInfo {
    pub name: String,
    pub key: String,
}

///
/// OuterReference
///
/// A field on another class (or one of its subclasses) that holds a
/// foreign key to this class.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OuterReference {
    pub class: ClassId,
    pub field: UnifiedFieldOrdinal,
    pub on_delete: DeleteAction,
}
