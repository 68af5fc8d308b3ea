//! One-time schema resolution.
//!
//! Phases run in a fixed order because later phases read what earlier ones
//! computed:
//! 1. index class and relation names
//! 2. link inheritance
//! 3. flatten tables per class (parents first, memoized)
//! 4. unify fields and discover primary keys per class
//! 5. merge physical tables by name
//! 6. resolve relations and collections
//! 7. register outer references
//! 8. enforce precache restrictions

mod fields;
mod links;
mod naming;
mod tables;

use crate::{
    SchemaError,
    def::{ClassDef, RelationDef, SchemaDef},
    node::SchemaInfo,
    types::{ClassId, RelationId},
};
use std::collections::HashMap;

pub(crate) fn resolve_schema(def: SchemaDef) -> Result<SchemaInfo, SchemaError> {
    let SchemaDef {
        namespace,
        data_sources,
        classes,
        relations,
    } = def;

    // Phase 1: names.
    let class_index = index_classes(&classes)?;
    let relation_index = index_relations(&relations)?;

    // Phase 2: inheritance.
    let parents = links::link_inheritance(&classes, &class_index)?;

    // Phase 3: table flattening.
    let mut flattener = tables::TableFlattener::new(&classes, &class_index, &parents);
    for index in 0..classes.len() {
        flattener.flatten(ClassId::new(index))?;
    }
    let unified_tables = flattener.finish();

    // Phase 4: fields, keys, selectors.
    let mut class_infos = Vec::with_capacity(classes.len());
    for (index, (class_def, tables)) in classes.iter().zip(unified_tables).enumerate() {
        class_infos.push(fields::build_class(
            class_def,
            ClassId::new(index),
            &parents,
            tables,
        )?);
    }
    links::link_hierarchy(&mut class_infos, &parents);
    fields::resolve_selectors(&classes, &mut class_infos)?;

    // Phase 5: physical table merge.
    let merged_tables = tables::merge_tables(&class_infos)?;

    // Phase 6: relations and collections.
    let relation_infos = links::resolve_relations(&relations, &class_index)?;
    links::resolve_collections(
        &classes,
        &mut class_infos,
        &class_index,
        &relation_infos,
        &relation_index,
    )?;

    // Phase 7: outer references.
    links::register_outer_references(&mut class_infos);

    // Phase 8: precache.
    links::validate_precache(&class_infos)?;

    let mut source_names: Vec<String> = data_sources.into_iter().map(|s| s.name).collect();
    for name in class_infos
        .iter()
        .map(|c| &c.data_source)
        .chain(relation_infos.iter().map(|r| &r.data_source))
    {
        if !source_names.contains(name) {
            source_names.push(name.clone());
        }
    }

    tracing::debug!(
        classes = class_infos.len(),
        relations = relation_infos.len(),
        merged_tables = merged_tables.len(),
        "schema resolved"
    );

    Ok(SchemaInfo {
        namespace,
        data_sources: source_names,
        classes: class_infos,
        relations: relation_infos,
        merged_tables,
        class_index,
        relation_index,
    })
}

fn index_classes(classes: &[ClassDef]) -> Result<HashMap<String, ClassId>, SchemaError> {
    let mut index = HashMap::with_capacity(classes.len());
    for (i, class) in classes.iter().enumerate() {
        naming::validate_class_name(&class.name)?;
        if index.insert(class.name.clone(), ClassId::new(i)).is_some() {
            return Err(SchemaError::DuplicateClass(class.name.clone()));
        }
    }

    Ok(index)
}

fn index_relations(relations: &[RelationDef]) -> Result<HashMap<String, RelationId>, SchemaError> {
    let mut index = HashMap::with_capacity(relations.len());
    for (i, relation) in relations.iter().enumerate() {
        naming::validate_class_name(&relation.name)?;
        if index
            .insert(relation.name.clone(), RelationId::new(i))
            .is_some()
        {
            return Err(SchemaError::DuplicateRelation(relation.name.clone()));
        }
    }

    Ok(index)
}
