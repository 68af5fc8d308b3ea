use crate::types::{
    ClassId, DeleteAction, FieldDataType, LocalFieldOrdinal, TableFieldOrdinal, TableOrdinal,
    UnifiedFieldOrdinal,
};

///
/// TableInfo
///
/// One physical table as seen from one class. Inherited tables are cloned
/// per class, so `ordinal` and every field ordinal are scoped to `owner`.
///

#[derive(Clone, Debug)]
pub struct TableInfo {
    pub name: String,
    pub ordinal: TableOrdinal,
    pub fields: Vec<FieldInfo>,

    /// Primary-key columns in declaration order.
    pub primary_key: Vec<TableFieldOrdinal>,

    /// Owning class; `None` for relation (tuple) tables.
    pub owner: Option<ClassId>,
}

impl TableInfo {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn field_at(&self, ordinal: TableFieldOrdinal) -> Option<&FieldInfo> {
        self.fields.get(ordinal.index())
    }

    /// Primary-key field infos in key order.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.primary_key.iter().filter_map(|o| self.field_at(*o))
    }

    /// Fields that contribute to the unified field set of the owning class.
    pub fn unified_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.unified_ordinal.is_some())
    }
}

///
/// FieldInfo
///

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub db_column: String,
    pub data_type: FieldDataType,
    pub size: Option<u32>,
    pub precision: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
    pub read_only: bool,
    pub force_trigger: bool,
    pub on_delete: DeleteAction,
    pub wrapper: Option<String>,

    /// Declared referenced class name, kept for diagnostics.
    pub references_name: Option<String>,
    pub references: Option<ClassId>,

    pub table: TableOrdinal,
    pub ordinal_in_table: TableFieldOrdinal,

    /// `None` when the field is not part of the owning class's local set.
    pub local_ordinal: Option<LocalFieldOrdinal>,

    /// `None` for primary-key columns repeated on non-root tables.
    pub unified_ordinal: Option<UnifiedFieldOrdinal>,
}

impl FieldInfo {
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.references.is_some()
    }

    /// True when commit-time null checks apply to this field.
    #[must_use]
    pub const fn requires_value(&self) -> bool {
        !self.nullable && !self.is_reference()
    }
}
