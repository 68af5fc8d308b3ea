#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use strata::{
    SchemaLoader,
    core::{
        config::IsolationLevel,
        error::InternalError,
        filter::{Condition, OrderBy},
        obs::SaveKind,
        runtime::{Database, DatabaseBuilder},
        source::{
            DataSource, DataSourceFactory, LoadedRow, MemoryDataSourceFactory, MemoryStore,
            SaveRequest, SharedMemoryStore, TupleChanges,
        },
        value::{PrimaryKey, Value},
    },
    schema::{
        node::{ClassInfo, RelationInfo, SchemaInfo},
        types::TableOrdinal,
    },
};

/// Route runtime logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn shop_schema() -> Arc<SchemaInfo> {
    SchemaLoader::new()
        .file(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/shop.toml"))
        .expect("shop fixture should load")
        .resolve()
        .expect("shop fixture should resolve")
}

///
/// Counters
///
/// Calls observed by every `CountingSource` built from one factory.
///

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub loads: AtomicUsize,
    pub saves: AtomicUsize,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fail_loads: AtomicBool,
    pub fail_saves: AtomicBool,
    pub isolation_levels: Mutex<Vec<IsolationLevel>>,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }
}

///
/// CountingSource
///
/// Memory source that counts calls and can be told to fail.
///

pub struct CountingSource {
    inner: Box<dyn DataSource>,
    counters: Arc<Counters>,
}

impl CountingSource {
    fn failure(&self, what: &str) -> InternalError {
        InternalError::data_source(self.inner.name(), format!("{what} refused"))
    }
}

impl DataSource for CountingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&mut self) -> Result<(), InternalError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open()
    }

    fn close(&mut self) -> Result<(), InternalError> {
        self.inner.close()
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), InternalError> {
        self.counters.isolation_levels.lock().push(level);
        self.inner.set_isolation_level(level)
    }

    fn commit(&mut self) -> Result<(), InternalError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), InternalError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback()
    }

    fn begin_save_changes(&mut self) -> Result<(), InternalError> {
        self.inner.begin_save_changes()
    }

    fn save_object_changes(&mut self, request: &SaveRequest<'_>) -> Result<(), InternalError> {
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        let counter = match request.kind {
            SaveKind::Insert => &self.counters.inserts,
            SaveKind::Update => &self.counters.updates,
            SaveKind::Delete => &self.counters.deletes,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_saves.load(Ordering::SeqCst) {
            return Err(self.failure("save"));
        }
        self.inner.save_object_changes(request)
    }

    fn finish_save_changes(&mut self) -> Result<(), InternalError> {
        self.inner.finish_save_changes()
    }

    fn load_object(
        &mut self,
        class: &ClassInfo,
        key: &PrimaryKey,
        table: Option<TableOrdinal>,
    ) -> Result<Option<LoadedRow>, InternalError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_loads.load(Ordering::SeqCst) {
            return Err(self.failure("load"));
        }
        self.inner.load_object(class, key, table)
    }

    fn load_keys(
        &mut self,
        class: &ClassInfo,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<PrimaryKey>, InternalError> {
        self.inner.load_keys(class, condition, order, limit)
    }

    fn execute_query(
        &mut self,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<Vec<Value>>, InternalError> {
        self.inner.execute_query(query, params)
    }

    fn save_tuples(
        &mut self,
        relation: &RelationInfo,
        changes: &TupleChanges,
    ) -> Result<(), InternalError> {
        self.inner.save_tuples(relation, changes)
    }

    fn load_tuples(
        &mut self,
        relation: &RelationInfo,
        side: usize,
        key: &PrimaryKey,
    ) -> Result<Vec<PrimaryKey>, InternalError> {
        self.inner.load_tuples(relation, side, key)
    }
}

///
/// CountingFactory
///

pub struct CountingFactory {
    inner: MemoryDataSourceFactory,
    counters: Arc<Counters>,
}

impl DataSourceFactory for CountingFactory {
    fn create(&self, name: &str) -> Result<Box<dyn DataSource>, InternalError> {
        Ok(Box::new(CountingSource {
            inner: self.inner.create(name)?,
            counters: Arc::clone(&self.counters),
        }))
    }
}

///
/// Shop
///
/// A database over the shop schema, its backing store and its counters.
///

pub struct Shop {
    pub db: Database,
    pub store: SharedMemoryStore,
    pub counters: Arc<Counters>,
}

pub fn shop() -> Shop {
    shop_with(|builder| builder)
}

pub fn shop_with(configure: impl FnOnce(DatabaseBuilder) -> DatabaseBuilder) -> Shop {
    init_tracing();
    let store = MemoryStore::shared();
    let counters = Arc::new(Counters::default());
    let factory = CountingFactory {
        inner: MemoryDataSourceFactory::new(Arc::clone(&store)),
        counters: Arc::clone(&counters),
    };
    let builder = Database::builder(shop_schema()).data_source("default", factory);
    let db = configure(builder).build().expect("shop database should build");

    Shop {
        db,
        store,
        counters,
    }
}

pub fn key(value: i64) -> PrimaryKey {
    PrimaryKey::from(value)
}
