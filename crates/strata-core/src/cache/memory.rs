use crate::{
    cache::{CacheDependency, CachedObject, CollectionKey, InvalidationBatch, ObjectCache},
    value::PrimaryKey,
};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

///
/// Entry
///

#[derive(Clone, Debug)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn live(&self, expiration: Option<Duration>) -> Option<T> {
        match expiration {
            Some(ttl) if self.stored_at.elapsed() >= ttl => None,
            _ => Some(self.value.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    objects: HashMap<(String, PrimaryKey), Entry<CachedObject>>,
    collections: HashMap<CollectionKey, (Entry<Arc<[PrimaryKey]>>, Vec<CacheDependency>)>,
}

///
/// InMemoryCache
///
/// `RwLock`-guarded maps with optional time-based expiry. Expired entries
/// read as misses and are overwritten by the next put.
///

#[derive(Debug, Default)]
pub struct InMemoryCache {
    state: RwLock<CacheState>,
    expiration: Option<Duration>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_expiration(expiration: Option<Duration>) -> Self {
        Self {
            state: RwLock::default(),
            expiration,
        }
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state.read().objects.len()
    }

    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.state.read().collections.len()
    }
}

impl ObjectCache for InMemoryCache {
    fn get_object(&self, root_class: &str, key: &PrimaryKey) -> Option<CachedObject> {
        self.state
            .read()
            .objects
            .get(&(root_class.to_string(), key.clone()))
            .and_then(|entry| entry.live(self.expiration))
    }

    fn put_object(&self, root_class: &str, key: &PrimaryKey, object: CachedObject) {
        self.state
            .write()
            .objects
            .insert((root_class.to_string(), key.clone()), Entry::new(object));
    }

    fn get_collection(&self, key: &CollectionKey) -> Option<Arc<[PrimaryKey]>> {
        self.state
            .read()
            .collections
            .get(key)
            .and_then(|(entry, _)| entry.live(self.expiration))
    }

    fn put_collection(
        &self,
        key: CollectionKey,
        keys: Arc<[PrimaryKey]>,
        dependencies: Vec<CacheDependency>,
    ) {
        self.state
            .write()
            .collections
            .insert(key, (Entry::new(keys), dependencies));
    }

    fn invalidate(&self, batch: &InvalidationBatch) {
        if batch.is_empty() {
            return;
        }

        let mut state = self.state.write();
        for object in &batch.objects {
            state.objects.remove(object);
        }
        state
            .collections
            .retain(|_, (_, dependencies)| !batch.affects(dependencies));

        tracing::trace!(
            objects = batch.objects.len(),
            classes = batch.classes.len(),
            relations = batch.relations.len(),
            "cache invalidated"
        );
    }

    fn clear(&self) {
        let mut state = self.state.write();
        state.objects.clear();
        state.collections.clear();
    }
}
