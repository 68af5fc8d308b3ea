use crate::{
    SchemaError,
    def::{ClassDef, RelationDef},
    node::{ClassInfo, CollectionInfo, OuterReference, RelationInfo},
    resolve::tables::table_from_def,
    types::{ClassId, RelationId, TableOrdinal},
};
use std::collections::HashMap;

/// Map every class to its parent id and reject dangling parents and cycles.
pub(crate) fn link_inheritance(
    classes: &[ClassDef],
    class_index: &HashMap<String, ClassId>,
) -> Result<Vec<Option<ClassId>>, SchemaError> {
    let parents = classes
        .iter()
        .map(|class| {
            class
                .inherits_from
                .as_ref()
                .map(|parent| {
                    class_index.get(parent).copied().ok_or_else(|| {
                        SchemaError::InheritedClassNotFound {
                            class: class.name.clone(),
                            parent: parent.clone(),
                        }
                    })
                })
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (index, class) in classes.iter().enumerate() {
        let mut current = parents[index];
        let mut steps = 0usize;
        while let Some(parent) = current {
            steps += 1;
            if parent.index() == index || steps > classes.len() {
                return Err(SchemaError::InheritanceCycle(class.name.clone()));
            }
            current = parents[parent.index()];
        }
    }

    Ok(parents)
}

/// Fill inheritance chains, roots and direct subclass lists.
pub(crate) fn link_hierarchy(classes: &mut [ClassInfo], parents: &[Option<ClassId>]) {
    for (index, class) in classes.iter_mut().enumerate() {
        let mut chain = vec![ClassId::new(index)];
        let mut current = parents[index];
        while let Some(parent) = current {
            chain.push(parent);
            current = parents[parent.index()];
        }

        class.root = chain.last().copied().unwrap_or(class.id);
        class.inheritance_chain = chain;
    }

    for (index, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            classes[parent.index()].subclasses.push(ClassId::new(index));
        }
    }
}

pub(crate) fn resolve_relations(
    relations: &[RelationDef],
    class_index: &HashMap<String, ClassId>,
) -> Result<Vec<RelationInfo>, SchemaError> {
    relations
        .iter()
        .enumerate()
        .map(|(index, def)| {
            let table = table_from_def(&def.name, &def.table, TableOrdinal::ROOT, None, class_index)?;

            let targets: Vec<ClassId> = table.fields.iter().filter_map(|f| f.references).collect();
            let [left, right] = targets[..] else {
                return Err(SchemaError::InvalidRelationTable {
                    relation: def.name.clone(),
                    found: targets.len(),
                });
            };
            if table.fields.len() != 2 {
                return Err(SchemaError::InvalidRelationTable {
                    relation: def.name.clone(),
                    found: targets.len(),
                });
            }

            Ok(RelationInfo {
                id: RelationId::new(index),
                name: def.name.clone(),
                data_source: def.data_source.clone(),
                table,
                classes: [left, right],
            })
        })
        .collect()
}

pub(crate) fn resolve_collections(
    defs: &[ClassDef],
    classes: &mut [ClassInfo],
    class_index: &HashMap<String, ClassId>,
    relations: &[RelationInfo],
    relation_index: &HashMap<String, RelationId>,
) -> Result<(), SchemaError> {
    for (index, def) in defs.iter().enumerate() {
        let mut collections = Vec::new();

        for coll in &def.collections_one_to_many {
            let target = class_index.get(&coll.class).copied().ok_or_else(|| {
                SchemaError::CollectionClassNotFound {
                    class: def.name.clone(),
                    collection: coll.name.clone(),
                    target: coll.class.clone(),
                }
            })?;
            let foreign_field = classes[target.index()]
                .field(&coll.foreign_field)
                .and_then(|f| f.unified_ordinal)
                .ok_or_else(|| SchemaError::CollectionFieldNotFound {
                    class: def.name.clone(),
                    collection: coll.name.clone(),
                    target: coll.class.clone(),
                    field: coll.foreign_field.clone(),
                })?;

            collections.push(CollectionInfo::OneToMany {
                name: coll.name.clone(),
                class: target,
                foreign_field,
                where_clause: coll.where_clause.clone(),
                cache: coll.cache,
            });
        }

        for coll in &def.collections_many_to_many {
            let relation_id = relation_index.get(&coll.relation).copied().ok_or_else(|| {
                SchemaError::CollectionRelationNotFound {
                    class: def.name.clone(),
                    collection: coll.name.clone(),
                    relation: coll.relation.clone(),
                }
            })?;
            let relation = &relations[relation_id.index()];
            let master_side = relation.side_of(&coll.foreign_field).ok_or_else(|| {
                SchemaError::CollectionFieldNotFound {
                    class: def.name.clone(),
                    collection: coll.name.clone(),
                    target: relation.name.clone(),
                    field: coll.foreign_field.clone(),
                }
            })?;

            collections.push(CollectionInfo::ManyToMany {
                name: coll.name.clone(),
                relation: relation_id,
                master_side,
                class: relation.classes[RelationInfo::other_side(master_side)],
            });
        }

        classes[index].collections = collections;
    }

    Ok(())
}

/// Record, on every referenced class, the local reference fields pointing
/// at it. Inherited reference fields are registered once, by the declaring
/// class.
pub(crate) fn register_outer_references(classes: &mut [ClassInfo]) {
    let mut found = Vec::new();
    for class in classes.iter() {
        for field in &class.local_fields {
            if let (Some(target), Some(ordinal)) = (field.references, field.unified_ordinal) {
                found.push((
                    target,
                    OuterReference {
                        class: class.id,
                        field: ordinal,
                        on_delete: field.on_delete,
                    },
                ));
            }
        }
    }

    for (target, reference) in found {
        classes[target.index()].outer_references.push(reference);
    }
}

/// Precached classes are loaded whole and shared; they may not own
/// collections nor point at classes that are not precached themselves.
pub(crate) fn validate_precache(classes: &[ClassInfo]) -> Result<(), SchemaError> {
    for class in classes.iter().filter(|c| c.precache) {
        if let Some(coll) = class.collections.first() {
            return Err(SchemaError::PrecacheViolation {
                class: class.name.clone(),
                reason: format!("declares collection '{}'", coll.name()),
            });
        }

        for field in &class.unified_fields {
            let Some(target) = field.references else {
                continue;
            };
            if !classes[target.index()].precache {
                return Err(SchemaError::PrecacheViolation {
                    class: class.name.clone(),
                    reason: format!(
                        "field '{}' references non-precached class '{}'",
                        field.name, classes[target.index()].name
                    ),
                });
            }
        }
    }

    Ok(())
}
