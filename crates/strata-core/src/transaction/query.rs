//! List queries, in-memory filtering, collections and relation tuples.

use crate::{
    cache::{CacheDependency, CollectionKey},
    error::{ErrorOrigin, InternalError},
    filter::{self, Condition, FieldSource, OrderBy},
    object::ObjectHandle,
    obs::MetricsEvent,
    transaction::Transaction,
    value::{PrimaryKey, TextMode, Value},
};
use std::sync::Arc;
use strata_schema::{
    node::{ClassInfo, CollectionInfo, RelationInfo},
    types::{ClassId, RelationId},
};

///
/// ObjectFieldSource
///
/// Reads an object's fields through its transaction, loading tables as
/// the condition asks for them.
///

pub struct ObjectFieldSource<'a> {
    tx: &'a mut Transaction,
    object: ObjectHandle,
}

impl<'a> ObjectFieldSource<'a> {
    pub const fn new(tx: &'a mut Transaction, object: ObjectHandle) -> Self {
        Self { tx, object }
    }
}

impl FieldSource for ObjectFieldSource<'_> {
    fn field_value(&mut self, field: &str) -> Result<Value, InternalError> {
        self.tx.get_value(self.object, field)
    }
}

impl Transaction {
    ///
    /// LIST QUERIES
    ///

    /// Objects of `class` (subclasses included) matching `condition`.
    ///
    /// Keys come from the data source, or from the collection cache when
    /// the class caches collections. Objects changed in this transaction
    /// are then re-checked in memory: pending inserts that match are
    /// added, objects marked for delete or edited out of the result are
    /// dropped, and the result is re-sorted.
    pub fn load_keys(
        &mut self,
        class: &str,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let schema = Arc::clone(&self.schema);
        let class = self.class_named(class)?.id;
        let class = schema.class_by_id(class);

        self.query(class, condition, order, limit, class.cache_collections)
    }

    fn query(
        &mut self,
        class: &ClassInfo,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
        cache_collection: bool,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let pending: Vec<ObjectHandle> = self
            .worklist
            .iter()
            .copied()
            .filter(|object| {
                self.arena.get(*object).is_some_and(|data| {
                    data.registered
                        && self.schema.class_by_id(data.class).is_subclass_of(class.id)
                })
            })
            .collect();

        // each pending object can push at most one stored row out of the result
        let stored_limit = limit.map(|limit| limit.saturating_add(pending.len()));
        let keys = self.stored_keys(class, condition, order, stored_limit, cache_collection)?;
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            objects.push(self.get_ref_by_id(class.id, key.clone())?);
        }
        if pending.is_empty() {
            return Ok(objects);
        }

        for object in pending {
            if !objects.contains(&object) {
                objects.push(object);
            }
        }

        let mut selected = Vec::with_capacity(objects.len());
        for object in objects {
            let object = self.resolve_handle(object)?;
            let data = self.data(object)?;
            if data.delete_marked {
                continue;
            }
            let changed = data.insert_mode || data.dirty;
            let mut source = ObjectFieldSource::new(self, object);
            if changed && !condition.matches(&mut source, TextMode::Cs)? {
                continue;
            }
            let sort_values = filter::order_values(&mut source, order)?;
            selected.push((object, sort_values));
        }
        filter::sort_by_order(&mut selected, order);

        let objects = selected.into_iter().map(|(object, _)| object);
        Ok(match limit {
            Some(limit) => objects.take(limit).collect(),
            None => objects.collect(),
        })
    }

    /// Committed keys, through the collection cache when enabled.
    fn stored_keys(
        &mut self,
        class: &ClassInfo,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
        cache_collection: bool,
    ) -> Result<Arc<[PrimaryKey]>, InternalError> {
        let cache_key = (cache_collection && self.options.use_cache).then(|| {
            CollectionKey::new(&class.name, format!("{condition:?}|{order:?}|{limit:?}"))
        });

        if let Some(cache_key) = &cache_key {
            let cached = self.runtime.cache.get_collection(cache_key);
            let hit = cached.is_some();
            self.stats.record_cache_lookup(hit);
            self.metrics.record(MetricsEvent::CollectionLookup {
                class: &class.name,
                hit,
            });
            if let Some(keys) = cached {
                return Ok(keys);
            }
        }

        self.stats.record_query();
        self.metrics.record(MetricsEvent::Query {
            source: &class.data_source,
        });
        let keys: Arc<[PrimaryKey]> = self
            .connection(&class.data_source)?
            .load_keys(class, condition, order, limit)?
            .into();
        tracing::trace!(class = %class.name, keys = keys.len(), "loaded keys");

        if let Some(cache_key) = cache_key {
            self.runtime.cache.put_collection(
                cache_key,
                Arc::clone(&keys),
                vec![CacheDependency::Class(class.name.clone())],
            );
        }

        Ok(keys)
    }

    /// The objects among `objects` that match `condition`, in order.
    pub fn filter_loaded(
        &mut self,
        objects: &[ObjectHandle],
        condition: &Condition,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let mut selected = Vec::new();
        for object in objects {
            let object = self.resolve_handle(*object)?;
            if condition.matches(&mut ObjectFieldSource::new(self, object), TextMode::Cs)? {
                selected.push(object);
            }
        }

        Ok(selected)
    }

    ///
    /// COLLECTIONS
    ///

    /// Members of a named collection of `owner`.
    pub fn collection(
        &mut self,
        owner: ObjectHandle,
        name: &str,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let owner = self.resolve_handle(owner)?;
        let (schema, class_id) = self.class_of(owner)?;
        let class = schema.class_by_id(class_id);
        let collection = class.collection(name).ok_or_else(|| {
            InternalError::schema(format!("unknown collection '{}.{name}'", class.name))
        })?;

        match collection {
            CollectionInfo::OneToMany {
                class: item,
                foreign_field,
                where_clause,
                cache,
                ..
            } => {
                if let Some(clause) = where_clause {
                    tracing::trace!(collection = %name, %clause, "where clause not evaluated");
                }
                let item = schema.class_by_id(*item);
                let field = item.unified_field(*foreign_field).ok_or_else(|| {
                    InternalError::schema(format!("{} has no foreign field", item.name))
                })?;
                let key = single_key(self.data(owner)?.key.build(), class)?;
                let condition = Condition::Eq(field.name.clone(), key);

                self.query(item, &condition, &[], None, *cache || item.cache_collections)
            }
            CollectionInfo::ManyToMany {
                relation,
                master_side,
                ..
            } => {
                let relation = schema.relation_by_id(*relation);
                self.tuple_targets(relation, *master_side, owner)
            }
        }
    }

    ///
    /// RELATION TUPLES
    ///

    /// Link `first` (side 0 of `relation`) with `second` (side 1).
    pub fn relation_add(
        &mut self,
        relation: &str,
        first: ObjectHandle,
        second: ObjectHandle,
    ) -> Result<(), InternalError> {
        let (id, tuple) = self.relation_tuple(relation, first, second)?;
        self.tuples.entry(id).or_default().add(tuple);

        Ok(())
    }

    pub fn relation_remove(
        &mut self,
        relation: &str,
        first: ObjectHandle,
        second: ObjectHandle,
    ) -> Result<(), InternalError> {
        let (id, tuple) = self.relation_tuple(relation, first, second)?;
        self.tuples.entry(id).or_default().remove(tuple);

        Ok(())
    }

    /// Objects linked to `owner`, where `owner` sits on `side` of the
    /// relation. Pending additions and removals are applied.
    pub fn relation_targets(
        &mut self,
        relation: &str,
        side: usize,
        owner: ObjectHandle,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let schema = Arc::clone(&self.schema);
        let relation = schema.relation(relation).ok_or_else(|| {
            InternalError::schema(format!("unknown relation '{relation}'"))
        })?;
        if side > 1 {
            return Err(InternalError::unsupported(
                ErrorOrigin::Transaction,
                format!("relation side {side} out of range"),
            ));
        }

        self.tuple_targets(relation, side, owner)
    }

    fn tuple_targets(
        &mut self,
        relation: &RelationInfo,
        side: usize,
        owner: ObjectHandle,
    ) -> Result<Vec<ObjectHandle>, InternalError> {
        let owner = self.resolve_handle(owner)?;
        let other = RelationInfo::other_side(side);
        let Some(owner_key) = self.data(owner)?.key.build() else {
            return Ok(Vec::new());
        };

        let mut keys = if self.data(owner)?.insert_mode {
            Vec::new()
        } else {
            self.stats.record_query();
            self.connection(&relation.data_source)?
                .load_tuples(relation, side, &owner_key)?
        };
        if let Some(changes) = self.tuples.get(&relation.id) {
            keys.retain(|key| {
                !changes
                    .removed
                    .iter()
                    .any(|tuple| tuple[side] == owner_key && tuple[other] == *key)
            });
            for tuple in &changes.added {
                if tuple[side] == owner_key && !keys.contains(&tuple[other]) {
                    keys.push(tuple[other].clone());
                }
            }
        }

        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            let target = self.get_ref_by_id(relation.classes[other], key)?;
            if !self.data(target)?.delete_marked {
                targets.push(target);
            }
        }

        Ok(targets)
    }

    fn relation_tuple(
        &mut self,
        relation: &str,
        first: ObjectHandle,
        second: ObjectHandle,
    ) -> Result<(RelationId, [PrimaryKey; 2]), InternalError> {
        let schema = Arc::clone(&self.schema);
        let relation = schema.relation(relation).ok_or_else(|| {
            InternalError::schema(format!("unknown relation '{relation}'"))
        })?;

        let first = self.endpoint_key(relation, 0, first)?;
        let second = self.endpoint_key(relation, 1, second)?;

        Ok((relation.id, [first, second]))
    }

    fn endpoint_key(
        &mut self,
        relation: &RelationInfo,
        side: usize,
        object: ObjectHandle,
    ) -> Result<PrimaryKey, InternalError> {
        let object = self.resolve_handle(object)?;
        let data = self.data(object)?;
        let class = self.schema.class_by_id(data.class);
        let expected: ClassId = relation.classes[side];
        if !class.is_subclass_of(expected) {
            return Err(InternalError::unsupported(
                ErrorOrigin::Transaction,
                format!(
                    "{} cannot sit on side {side} of relation '{}'",
                    class.name, relation.name
                ),
            ));
        }

        data.key.build().ok_or_else(|| {
            InternalError::invariant(
                ErrorOrigin::Transaction,
                format!("{} {object} has no key yet", class.name),
            )
        })
    }
}

fn single_key(key: Option<PrimaryKey>, class: &ClassInfo) -> Result<Value, InternalError> {
    match key {
        Some(PrimaryKey::Single(value)) => Ok(value),
        Some(PrimaryKey::Composite(_)) => Err(InternalError::unsupported(
            ErrorOrigin::Transaction,
            format!("{} has a composite key and cannot own a collection", class.name),
        )),
        None => Err(InternalError::invariant(
            ErrorOrigin::Transaction,
            format!("{} owner has no key yet", class.name),
        )),
    }
}
