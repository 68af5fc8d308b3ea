use crate::types::{ClassId, RelationId, UnifiedFieldOrdinal};

///
/// CollectionInfo
///

#[derive(Clone, Debug)]
pub enum CollectionInfo {
    /// Objects of `class` whose `foreign_field` points at the owner.
    OneToMany {
        name: String,
        class: ClassId,
        foreign_field: UnifiedFieldOrdinal,
        where_clause: Option<String>,
        cache: bool,
    },

    /// Objects reached through a tuple table. `master_side` is the relation
    /// field that points at the owner; the other side is the target.
    ManyToMany {
        name: String,
        relation: RelationId,
        master_side: usize,
        class: ClassId,
    },
}

impl CollectionInfo {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::OneToMany { name, .. } | Self::ManyToMany { name, .. } => name,
        }
    }

    /// Class of the collection's items.
    #[must_use]
    pub const fn item_class(&self) -> ClassId {
        match self {
            Self::OneToMany { class, .. } | Self::ManyToMany { class, .. } => *class,
        }
    }
}
