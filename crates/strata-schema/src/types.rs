use derive_more::{Display, FromStr};
use serde::{Deserialize, Serialize};

///
/// FieldDataType
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, FromStr, Hash, PartialEq, Serialize)]
#[remain::sorted]
pub enum FieldDataType {
    Blob,
    Boolean,
    BooleanAsInteger,
    DateTime,
    Decimal,
    Double,
    Float,
    Guid,
    Image,
    Integer,
    Long,
    String,
    TimeSpan,
}

impl FieldDataType {
    /// True for types that may not be used as primary-key components.
    #[must_use]
    pub const fn is_approximate(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// True for types whose keys can be generated by an integer sequence.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Integer | Self::Long)
    }

    #[must_use]
    pub const fn requires_size(self) -> bool {
        matches!(self, Self::String)
    }
}

///
/// DeleteAction
///
/// What happens to a referencing object when the referenced object is deleted.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, FromStr, PartialEq, Serialize)]
pub enum DeleteAction {
    #[default]
    Nothing,
    Cascade,
    Nullify,
}

///
/// ClassId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("class#{_0}")]
pub struct ClassId(usize);

impl ClassId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

///
/// RelationId
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("relation#{_0}")]
pub struct RelationId(usize);

impl RelationId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

//
// Ordinal spaces
//
// Row materialization indexes by table position and table-local column,
// dirty tracking and field storage by class-unified ordinal, and generated
// accessors for a class's own fields by class-local ordinal. The three are
// distinct types so they cannot be mixed up at call sites.
//

///
/// TableOrdinal
///
/// Position of a table in its owning class's unified table stack (0 = root).
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TableOrdinal(usize);

impl TableOrdinal {
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }

    /// Bit for this table in a loaded-tables mask.
    #[must_use]
    pub const fn mask_bit(self) -> u32 {
        1u32 << self.0
    }
}

///
/// TableFieldOrdinal
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TableFieldOrdinal(usize);

impl TableFieldOrdinal {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

///
/// LocalFieldOrdinal
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LocalFieldOrdinal(usize);

impl LocalFieldOrdinal {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

///
/// UnifiedFieldOrdinal
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnifiedFieldOrdinal(usize);

impl UnifiedFieldOrdinal {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}
