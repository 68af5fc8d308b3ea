//! Process-wide read-through cache shared by every transaction of a database.
//!
//! Objects are keyed by root class name and primary key, so a lookup through
//! any class of a hierarchy finds the same entry. Collections (key lists)
//! record the classes and relations they depend on and are dropped when any
//! of them changes.

mod memory;


use crate::value::{PrimaryKey, Value};
use std::sync::Arc;
use strata_schema::types::ClassId;

// re-exports
pub use memory::InMemoryCache;

///
/// CachedObject
///
/// Field values of a fully loaded object, indexed by `class`'s unified
/// ordinals. Transactions borrow `values` until their first write.
///

#[derive(Clone, Debug)]
pub struct CachedObject {
    pub class: ClassId,
    pub values: Arc<[Value]>,
    pub loaded_tables: u32,
}

///
/// CollectionKey
///
/// Identifies one cached key list: the queried class plus a canonical
/// description of the query or collection.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CollectionKey {
    pub class: String,
    pub query: String,
}

impl CollectionKey {
    pub fn new(class: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            query: query.into(),
        }
    }
}

///
/// CacheDependency
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum CacheDependency {
    Class(String),
    Relation(String),
}

///
/// InvalidationBatch
///
/// Everything one commit changed. Applied atomically.
///

#[derive(Clone, Debug, Default)]
pub struct InvalidationBatch {
    /// (root class name, key) of every saved or deleted object.
    pub objects: Vec<(String, PrimaryKey)>,

    /// Classes with saved or deleted objects, ancestors included.
    pub classes: Vec<String>,

    /// Relation names whose tuples changed.
    pub relations: Vec<String>,
}

impl InvalidationBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.classes.is_empty() && self.relations.is_empty()
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.classes.iter().any(|c| c == class) {
            self.classes.push(class.to_string());
        }
    }

    pub fn add_relation(&mut self, relation: &str) {
        if !self.relations.iter().any(|r| r == relation) {
            self.relations.push(relation.to_string());
        }
    }

    /// True when a collection with these dependencies must be dropped.
    #[must_use]
    pub fn affects(&self, dependencies: &[CacheDependency]) -> bool {
        dependencies.iter().any(|dep| match dep {
            CacheDependency::Class(class) => self.classes.contains(class),
            CacheDependency::Relation(relation) => self.relations.contains(relation),
        })
    }
}

///
/// ObjectCache
///

pub trait ObjectCache: Send + Sync {
    fn get_object(&self, root_class: &str, key: &PrimaryKey) -> Option<CachedObject>;
    fn put_object(&self, root_class: &str, key: &PrimaryKey, object: CachedObject);

    fn get_collection(&self, key: &CollectionKey) -> Option<Arc<[PrimaryKey]>>;
    fn put_collection(
        &self,
        key: CollectionKey,
        keys: Arc<[PrimaryKey]>,
        dependencies: Vec<CacheDependency>,
    );

    /// Drop every entry touched by `batch` under a single lock.
    fn invalidate(&self, batch: &InvalidationBatch);

    fn clear(&self);
}

///
/// NoCache
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl ObjectCache for NoCache {
    fn get_object(&self, _: &str, _: &PrimaryKey) -> Option<CachedObject> {
        None
    }

    fn put_object(&self, _: &str, _: &PrimaryKey, _: CachedObject) {}

    fn get_collection(&self, _: &CollectionKey) -> Option<Arc<[PrimaryKey]>> {
        None
    }

    fn put_collection(&self, _: CollectionKey, _: Arc<[PrimaryKey]>, _: Vec<CacheDependency>) {}

    fn invalidate(&self, _: &InvalidationBatch) {}

    fn clear(&self) {}
}
