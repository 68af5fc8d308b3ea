//! Schema model for Strata: raw class/table/field definitions, the resolved
//! metadata graph, and the one-time resolution pass that links the two.
//!
//! In general:
//! - `def` describes *what was declared* (deserialized, unlinked)
//! - `node` describes *what runs* (linked, ordinal-indexed, immutable)
//! - `resolve` is the only code that turns one into the other

pub mod def;
pub mod error;
pub mod node;
pub mod resolve;
pub mod types;

///
/// CONSTANTS
///

/// Maximum number of physical tables (own plus inherited) backing one class.
///
/// Per-object loaded-table state is a `u32` bitmask, one bit per table.
/// The limit is part of the runtime contract, not a tuning knob.
pub const MAX_TABLES_PER_CLASS: usize = 30;

/// Maximum length for class and relation identifiers.
pub const MAX_CLASS_NAME_LEN: usize = 64;

/// Data source name used when a class or relation does not declare one.
pub const DEFAULT_DATA_SOURCE: &str = "default";

// re-exports
pub use error::SchemaError;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        def::{
            ClassDef, CollectionManyToManyDef, CollectionOneToManyDef, ConstantDef, DataSourceDef,
            FieldDef, RelationDef, SchemaDef, TableDef,
        },
        error::SchemaError,
        node::{
            ClassInfo, CollectionInfo, ConstantInfo, FieldInfo, OuterReference, RelationInfo,
            SchemaInfo, TableInfo,
        },
        types::{
            ClassId, DeleteAction, FieldDataType, LocalFieldOrdinal, RelationId,
            TableFieldOrdinal, TableOrdinal, UnifiedFieldOrdinal,
        },
    };
}
