use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Structural inconsistency found while loading or resolving a schema.
/// Every variant is fatal: there is no partially resolved schema.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum SchemaError {
    #[error("collection '{class}.{collection}' targets unknown class '{target}'")]
    CollectionClassNotFound {
        class: String,
        collection: String,
        target: String,
    },

    #[error("collection '{class}.{collection}' refers to missing field '{field}' on '{target}'")]
    CollectionFieldNotFound {
        class: String,
        collection: String,
        target: String,
        field: String,
    },

    #[error("collection '{class}.{collection}' refers to unknown relation '{relation}'")]
    CollectionRelationNotFound {
        class: String,
        collection: String,
        relation: String,
    },

    #[error("failed to parse schema document: {0}")]
    Decode(String),

    #[error("class '{0}' is declared more than once")]
    DuplicateClass(String),

    #[error("physical table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}' of class '{class}' declares field '{field}' more than once")]
    DuplicateField {
        class: String,
        table: String,
        field: String,
    },

    #[error("table '{table}' of class '{class}' declares primary key '{field}' more than once")]
    DuplicatePrimaryKey {
        class: String,
        table: String,
        field: String,
    },

    #[error("relation '{0}' is declared more than once")]
    DuplicateRelation(String),

    #[error("class '{0}' is part of an inheritance cycle")]
    InheritanceCycle(String),

    #[error("class '{class}' inherits from unknown class '{parent}'")]
    InheritedClassNotFound { class: String, parent: String },

    #[error("invalid identifier '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("relation '{relation}' table must have exactly two referencing fields, found {found}")]
    InvalidRelationTable { relation: String, found: usize },

    #[error("field '{class}.{field}' of type String must declare a positive size")]
    MissingFieldSize { class: String, field: String },

    #[error("class '{0}' has no primary key on its root table")]
    MissingPrimaryKey(String),

    #[error("class '{class}' declares subclass selector field '{field}' which does not exist")]
    MissingSelectorField { class: String, field: String },

    #[error("class '{0}' has no tables")]
    NoTables(String),

    #[error("precached class '{class}' has a disallowed outer reference: {reason}")]
    PrecacheViolation { class: String, reason: String },

    #[error("class '{class}' table '{table}' does not repeat the {expected}-column primary key")]
    PrimaryKeyShapeMismatch {
        class: String,
        table: String,
        expected: usize,
    },

    #[error("field '{class}.{field}' references unknown class '{target}'")]
    ReferencedClassNotFound {
        class: String,
        field: String,
        target: String,
    },

    #[error("class '{0}' is a subclass but no subclass selector field is declared or inherited")]
    SubclassWithoutDiscriminator(String),

    #[error("class '{class}' is backed by {count} tables, the limit is {max}")]
    TooManyTables {
        class: String,
        count: usize,
        max: usize,
    },

    #[error("field '{class}.{field}' primary key type {data_type} is not allowed")]
    UnsupportedKeyType {
        class: String,
        field: String,
        data_type: String,
    },
}

impl SchemaError {
    #[must_use]
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
