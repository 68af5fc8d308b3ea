//! Raw schema definitions as they come out of a schema document.
//!
//! Nothing here is linked: class, relation and field references are plain
//! names until `SchemaInfo::resolve` cross-links them.

use crate::{
    DEFAULT_DATA_SOURCE, SchemaError,
    types::{DeleteAction, FieldDataType},
};
use serde::{Deserialize, Serialize};
use std::ops::Not;

fn default_data_source() -> String {
    DEFAULT_DATA_SOURCE.to_string()
}

///
/// SchemaDef
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaDef {
    pub namespace: Option<String>,
    pub data_sources: Vec<DataSourceDef>,
    pub classes: Vec<ClassDef>,
    pub relations: Vec<RelationDef>,
}

impl SchemaDef {
    /// Parse a schema document from JSON.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(SchemaError::decode)
    }

    /// Parse a schema document from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, SchemaError> {
        toml::from_str(text).map_err(SchemaError::decode)
    }

    /// Merge an included schema document into this one.
    ///
    /// Data sources already declared here win over the included ones.
    pub fn include(&mut self, other: Self) {
        for source in other.data_sources {
            if !self.data_sources.iter().any(|s| s.name == source.name) {
                self.data_sources.push(source);
            }
        }
        self.classes.extend(other.classes);
        self.relations.extend(other.relations);
    }
}

///
/// DataSourceDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

///
/// ClassDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassDef {
    pub name: String,

    #[serde(default = "default_data_source")]
    pub data_source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subclass_selector_field: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subclass_selector_value: Option<String>,

    #[serde(skip_serializing_if = "Not::not")]
    pub read_only: bool,

    #[serde(skip_serializing_if = "Not::not")]
    pub cached: bool,

    #[serde(skip_serializing_if = "Not::not")]
    pub cache_collections: bool,

    #[serde(skip_serializing_if = "Not::not")]
    pub precache: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub tables: Vec<TableDef>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections_one_to_many: Vec<CollectionOneToManyDef>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections_many_to_many: Vec<CollectionManyToManyDef>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<ConstantDef>,
}

impl Default for ClassDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_source: default_data_source(),
            inherits_from: None,
            subclass_selector_field: None,
            subclass_selector_value: None,
            read_only: false,
            cached: false,
            cache_collections: false,
            precache: false,
            label: None,
            tables: Vec::new(),
            collections_one_to_many: Vec::new(),
            collections_many_to_many: Vec::new(),
            constants: Vec::new(),
        }
    }
}

impl ClassDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.inherits_from = Some(parent.into());
        self
    }

    #[must_use]
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }
}

///
/// TableDef
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl TableDef {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

///
/// FieldDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_column: Option<String>,

    pub data_type: FieldDataType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub primary_key: bool,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub read_only: bool,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub force_trigger: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,

    #[serde(default)]
    pub on_delete: DeleteAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,
}

impl FieldDef {
    /// Minimal field definition; used by builders and tests.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: FieldDataType) -> Self {
        Self {
            name: name.into(),
            db_column: None,
            data_type,
            size: None,
            precision: None,
            nullable: false,
            primary_key: false,
            read_only: false,
            force_trigger: false,
            references: None,
            on_delete: DeleteAction::Nothing,
            wrapper: None,
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn references(mut self, class: impl Into<String>) -> Self {
        self.references = Some(class.into());
        self
    }

    #[must_use]
    pub const fn on_delete(mut self, action: DeleteAction) -> Self {
        self.on_delete = action;
        self
    }
}

///
/// RelationDef
///
/// Many-to-many join table. The table carries exactly two fields, each a
/// reference to one endpoint class; together they form the tuple key.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDef {
    pub name: String,

    #[serde(default = "default_data_source")]
    pub data_source: String,

    pub table: TableDef,
}

///
/// CollectionOneToManyDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionOneToManyDef {
    pub name: String,
    pub class: String,
    pub foreign_field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub cache: bool,
}

///
/// CollectionManyToManyDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionManyToManyDef {
    pub name: String,
    pub relation: String,

    /// Relation field that points back at the declaring class.
    pub foreign_field: String,
}

///
/// ConstantDef
///

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantDef {
    pub name: String,
    pub key: String,
}
