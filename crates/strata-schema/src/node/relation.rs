use crate::{
    node::TableInfo,
    types::{ClassId, RelationId},
};

///
/// RelationInfo
///
/// Many-to-many tuple table. Field 0 and field 1 of `table` are the two
/// endpoints; `classes[i]` is the class referenced by field `i`.
///

#[derive(Clone, Debug)]
pub struct RelationInfo {
    pub id: RelationId,
    pub name: String,
    pub data_source: String,
    pub table: TableInfo,
    pub classes: [ClassId; 2],
}

impl RelationInfo {
    /// Index (0 or 1) of the tuple field with the given name.
    #[must_use]
    pub fn side_of(&self, field: &str) -> Option<usize> {
        self.table.fields.iter().position(|f| f.name == field)
    }

    #[must_use]
    pub const fn other_side(side: usize) -> usize {
        1 - side
    }
}
