use crate::{
    SchemaError,
    def::ClassDef,
    node::{ClassInfo, FieldInfo, TableInfo},
    types::{ClassId, LocalFieldOrdinal, UnifiedFieldOrdinal},
};

/// Build a class from its flattened table stack.
///
/// Every field of the root table is unified; non-root tables contribute
/// only their non-key columns. The last `def.tables.len()` tables are the
/// class's own, and their unified fields form the local set.
pub(crate) fn build_class(
    def: &ClassDef,
    id: ClassId,
    parents: &[Option<ClassId>],
    mut tables: Vec<TableInfo>,
) -> Result<ClassInfo, SchemaError> {
    if tables.is_empty() {
        return Err(SchemaError::NoTables(def.name.clone()));
    }

    let key_width = tables[0].primary_key.len();
    if key_width == 0 {
        return Err(SchemaError::MissingPrimaryKey(def.name.clone()));
    }
    for table in tables.iter().skip(1) {
        if table.primary_key.len() != key_width {
            return Err(SchemaError::PrimaryKeyShapeMismatch {
                class: def.name.clone(),
                table: table.name.clone(),
                expected: key_width,
            });
        }
    }

    let local_start = tables.len() - def.tables.len();
    let mut unified_fields = Vec::new();
    let mut local_fields = Vec::new();

    for (position, table) in tables.iter_mut().enumerate() {
        let is_local = position >= local_start;
        for field in &mut table.fields {
            if position != 0 && field.primary_key {
                field.unified_ordinal = None;
                field.local_ordinal = None;
                continue;
            }

            field.unified_ordinal = Some(UnifiedFieldOrdinal::new(unified_fields.len()));
            field.local_ordinal = is_local.then(|| LocalFieldOrdinal::new(local_fields.len()));
            if is_local {
                local_fields.push(field.clone());
            }
            unified_fields.push(field.clone());
        }
    }

    let primary_key = tables[0]
        .primary_key
        .iter()
        .filter_map(|o| tables[0].field_at(*o))
        .filter_map(|f| f.unified_ordinal)
        .collect();

    let local_tables = tables[local_start..].to_vec();

    Ok(ClassInfo {
        id,
        name: def.name.clone(),
        data_source: def.data_source.clone(),
        inherits_from: parents[id.index()],
        root: id,
        inheritance_chain: vec![id],
        subclasses: Vec::new(),
        subclass_selector_field: None,
        subclass_selector_value: def.subclass_selector_value.clone(),
        read_only: def.read_only,
        cached: def.cached,
        cache_collections: def.cache_collections,
        precache: def.precache,
        label: def.label.clone(),
        local_tables,
        unified_tables: tables,
        unified_fields,
        local_fields,
        primary_key,
        collections: Vec::new(),
        constants: def
            .constants
            .iter()
            .map(|c| crate::node::ConstantInfo {
                name: c.name.clone(),
                key: c.key.clone(),
            })
            .collect(),
        outer_references: Vec::new(),
    })
}

/// Resolve each class's selector field, own or inherited, to a unified
/// ordinal. Requires `link_hierarchy` to have filled inheritance chains.
pub(crate) fn resolve_selectors(
    defs: &[ClassDef],
    classes: &mut [ClassInfo],
) -> Result<(), SchemaError> {
    for index in 0..classes.len() {
        let selector_name = classes[index]
            .inheritance_chain
            .iter()
            .find_map(|id| defs[id.index()].subclass_selector_field.as_deref());

        let class = &mut classes[index];
        let Some(selector_name) = selector_name else {
            if class.inherits_from.is_some() || class.subclass_selector_value.is_some() {
                return Err(SchemaError::SubclassWithoutDiscriminator(class.name.clone()));
            }
            continue;
        };

        let ordinal = class
            .field(selector_name)
            .and_then(|f: &FieldInfo| f.unified_ordinal)
            .ok_or_else(|| SchemaError::MissingSelectorField {
                class: class.name.clone(),
                field: selector_name.to_string(),
            })?;

        if class.inherits_from.is_some() && class.subclass_selector_value.is_none() {
            return Err(SchemaError::SubclassWithoutDiscriminator(class.name.clone()));
        }

        class.subclass_selector_field = Some(ordinal);
    }

    Ok(())
}
