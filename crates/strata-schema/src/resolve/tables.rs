use crate::{
    MAX_TABLES_PER_CLASS, SchemaError,
    def::{ClassDef, FieldDef, TableDef},
    node::{ClassInfo, FieldInfo, TableInfo},
    types::{ClassId, TableFieldOrdinal, TableOrdinal},
};
use std::collections::HashMap;

///
/// TableFlattener
///
/// Computes the unified table stack of every class. A subclass clones its
/// parent's stack (re-owning and re-numbering each table) and appends its own
/// tables; parents are flattened on demand and memoized.
///

pub(crate) struct TableFlattener<'a> {
    classes: &'a [ClassDef],
    class_index: &'a HashMap<String, ClassId>,
    parents: &'a [Option<ClassId>],
    flattened: Vec<Option<Vec<TableInfo>>>,
}

impl<'a> TableFlattener<'a> {
    pub(crate) fn new(
        classes: &'a [ClassDef],
        class_index: &'a HashMap<String, ClassId>,
        parents: &'a [Option<ClassId>],
    ) -> Self {
        Self {
            classes,
            class_index,
            parents,
            flattened: vec![None; classes.len()],
        }
    }

    pub(crate) fn flatten(&mut self, id: ClassId) -> Result<&[TableInfo], SchemaError> {
        if self.flattened[id.index()].is_none() {
            let tables = self.flatten_uncached(id)?;
            self.flattened[id.index()] = Some(tables);
        }

        Ok(self.flattened[id.index()].as_deref().unwrap_or_default())
    }

    fn flatten_uncached(&mut self, id: ClassId) -> Result<Vec<TableInfo>, SchemaError> {
        let (classes, class_index) = (self.classes, self.class_index);
        let def = &classes[id.index()];
        let mut tables = Vec::new();

        if let Some(parent) = self.parents[id.index()] {
            let inherited = self.flatten(parent)?.to_vec();
            for mut table in inherited {
                let ordinal = TableOrdinal::new(tables.len());
                table.ordinal = ordinal;
                table.owner = Some(id);
                for field in &mut table.fields {
                    field.table = ordinal;
                }
                tables.push(table);
            }
        }

        for table_def in &def.tables {
            let ordinal = TableOrdinal::new(tables.len());
            tables.push(table_from_def(
                &def.name,
                table_def,
                ordinal,
                Some(id),
                class_index,
            )?);
        }

        if tables.is_empty() {
            return Err(SchemaError::NoTables(def.name.clone()));
        }
        if tables.len() > MAX_TABLES_PER_CLASS {
            return Err(SchemaError::TooManyTables {
                class: def.name.clone(),
                count: tables.len(),
                max: MAX_TABLES_PER_CLASS,
            });
        }

        Ok(tables)
    }

    pub(crate) fn finish(self) -> Vec<Vec<TableInfo>> {
        self.flattened.into_iter().map(Option::unwrap_or_default).collect()
    }
}

/// Build one table from its definition, validating per-field constraints.
pub(crate) fn table_from_def(
    class_name: &str,
    def: &TableDef,
    ordinal: TableOrdinal,
    owner: Option<ClassId>,
    class_index: &HashMap<String, ClassId>,
) -> Result<TableInfo, SchemaError> {
    let mut fields: Vec<FieldInfo> = Vec::with_capacity(def.fields.len());
    let mut primary_key = Vec::new();

    for (i, field_def) in def.fields.iter().enumerate() {
        if let Some(existing) = fields.iter().find(|f| f.name == field_def.name) {
            return Err(if existing.primary_key || field_def.primary_key {
                SchemaError::DuplicatePrimaryKey {
                    class: class_name.to_string(),
                    table: def.name.clone(),
                    field: field_def.name.clone(),
                }
            } else {
                SchemaError::DuplicateField {
                    class: class_name.to_string(),
                    table: def.name.clone(),
                    field: field_def.name.clone(),
                }
            });
        }

        let field = field_from_def(class_name, field_def, ordinal, i, class_index)?;
        if field.primary_key {
            primary_key.push(field.ordinal_in_table);
        }
        fields.push(field);
    }

    Ok(TableInfo {
        name: def.name.clone(),
        ordinal,
        fields,
        primary_key,
        owner,
    })
}

fn field_from_def(
    class_name: &str,
    def: &FieldDef,
    table: TableOrdinal,
    ordinal: usize,
    class_index: &HashMap<String, ClassId>,
) -> Result<FieldInfo, SchemaError> {
    if def.data_type.requires_size() && def.size.unwrap_or(0) == 0 {
        return Err(SchemaError::MissingFieldSize {
            class: class_name.to_string(),
            field: def.name.clone(),
        });
    }
    if def.primary_key && def.data_type.is_approximate() {
        return Err(SchemaError::UnsupportedKeyType {
            class: class_name.to_string(),
            field: def.name.clone(),
            data_type: def.data_type.to_string(),
        });
    }

    let references = def
        .references
        .as_ref()
        .map(|target| {
            class_index
                .get(target)
                .copied()
                .ok_or_else(|| SchemaError::ReferencedClassNotFound {
                    class: class_name.to_string(),
                    field: def.name.clone(),
                    target: target.clone(),
                })
        })
        .transpose()?;

    Ok(FieldInfo {
        name: def.name.clone(),
        db_column: def.db_column.clone().unwrap_or_else(|| def.name.clone()),
        data_type: def.data_type,
        size: def.size,
        precision: def.precision,
        nullable: def.nullable,
        primary_key: def.primary_key,
        read_only: def.read_only,
        force_trigger: def.force_trigger,
        on_delete: def.on_delete,
        wrapper: def.wrapper.clone(),
        references_name: def.references.clone(),
        references,
        table,
        ordinal_in_table: TableFieldOrdinal::new(ordinal),
        local_ordinal: None,
        unified_ordinal: None,
    })
}

/// Deduplicate physical tables by name across all classes.
///
/// Columns are unioned; only primary-key columns may appear in more than
/// one declaration of the same physical table.
pub(crate) fn merge_tables(classes: &[ClassInfo]) -> Result<Vec<TableInfo>, SchemaError> {
    let mut merged: Vec<TableInfo> = Vec::new();

    for class in classes {
        for table in &class.local_tables {
            let Some(target) = merged.iter_mut().find(|t| t.name == table.name) else {
                let mut copy = table.clone();
                copy.ordinal = TableOrdinal::ROOT;
                merged.push(copy);
                continue;
            };

            for field in &table.fields {
                match target.fields.iter().find(|f| f.db_column == field.db_column) {
                    Some(existing) if existing.primary_key && field.primary_key => {}
                    Some(_) => {
                        return Err(SchemaError::DuplicateColumn {
                            table: table.name.clone(),
                            column: field.db_column.clone(),
                        });
                    }
                    None => {
                        let mut copy = field.clone();
                        copy.ordinal_in_table = TableFieldOrdinal::new(target.fields.len());
                        copy.table = TableOrdinal::ROOT;
                        if copy.primary_key {
                            target.primary_key.push(copy.ordinal_in_table);
                        }
                        target.fields.push(copy);
                    }
                }
            }
        }
    }

    Ok(merged)
}
