use crate::{
    config::IsolationLevel,
    error::{ErrorClass, ErrorOrigin, InternalError},
    filter::{self, Condition, FieldSource, OrderBy},
    obs::SaveKind,
    source::{DataSource, DataSourceFactory, LoadedRow, SaveRequest, TupleChanges},
    value::{PrimaryKey, TextMode, Value},
};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use strata_schema::{
    node::{ClassInfo, RelationInfo, TableInfo},
    types::TableOrdinal,
};

pub type SharedMemoryStore = Arc<Mutex<MemoryStore>>;

type Columns = BTreeMap<String, Value>;

type QueryHandler =
    dyn Fn(&MemoryStore, &str, &[Value]) -> Result<Vec<Vec<Value>>, InternalError> + Send + Sync;

///
/// MemoryStore
///
/// Committed rows keyed by physical table name, plus relation tuples.
/// Rows remember their insertion sequence so scans are deterministic.
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, HashMap<PrimaryKey, MemoryRow>>,
    tuples: HashMap<String, Vec<[PrimaryKey; 2]>>,
    next_seq: u64,
}

#[derive(Clone, Debug)]
struct MemoryRow {
    seq: u64,
    columns: Columns,
}

impl MemoryStore {
    #[must_use]
    pub fn shared() -> SharedMemoryStore {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Write a committed row directly, bypassing any transaction.
    pub fn insert_row(&mut self, table: &str, key: PrimaryKey, columns: Columns) {
        let seq = self.bump_seq();
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key, MemoryRow { seq, columns });
    }

    #[must_use]
    pub fn row(&self, table: &str, key: &PrimaryKey) -> Option<&Columns> {
        self.tables.get(table)?.get(key).map(|row| &row.columns)
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }

    #[must_use]
    pub fn tuples(&self, table: &str) -> &[[PrimaryKey; 2]] {
        self.tuples.get(table).map_or(&[], Vec::as_slice)
    }

    /// Largest single integral key committed to `table`, if any.
    #[must_use]
    pub fn max_integral_key(&self, table: &str) -> Option<i64> {
        self.tables
            .get(table)?
            .keys()
            .filter_map(|key| match key {
                PrimaryKey::Single(value) => value.as_i64(),
                PrimaryKey::Composite(_) => None,
            })
            .max()
    }

    const fn bump_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.saturating_add(1);
        self.next_seq
    }

    fn contains(&self, table: &str, key: &PrimaryKey) -> bool {
        self.tables.get(table).is_some_and(|rows| rows.contains_key(key))
    }

    /// Keys present in every unified table of `class`, in insertion order.
    fn class_keys(&self, class: &ClassInfo) -> Vec<PrimaryKey> {
        let Some(root_rows) = self.tables.get(&class.root_table().name) else {
            return Vec::new();
        };

        let mut keyed: Vec<(u64, &PrimaryKey)> = root_rows
            .iter()
            .filter(|(key, _)| {
                class
                    .unified_tables
                    .iter()
                    .skip(1)
                    .all(|table| self.contains(&table.name, key))
            })
            .map(|(key, row)| (row.seq, key))
            .collect();
        keyed.sort_by_key(|(seq, _)| *seq);

        keyed.into_iter().map(|(_, key)| key.clone()).collect()
    }

    fn apply(&mut self, write: StagedWrite) {
        match write {
            StagedWrite::Upsert {
                table,
                key,
                columns,
            } => {
                let seq = self.bump_seq();
                let row = self
                    .tables
                    .entry(table)
                    .or_default()
                    .entry(key)
                    .or_insert_with(|| MemoryRow {
                        seq,
                        columns: Columns::new(),
                    });
                row.columns.extend(columns);
            }
            StagedWrite::Delete { table, key } => {
                if let Some(rows) = self.tables.get_mut(&table) {
                    rows.remove(&key);
                }
            }
            StagedWrite::TupleAdd { table, tuple } => {
                let tuples = self.tuples.entry(table).or_default();
                if !tuples.contains(&tuple) {
                    tuples.push(tuple);
                }
            }
            StagedWrite::TupleRemove { table, tuple } => {
                if let Some(tuples) = self.tuples.get_mut(&table) {
                    tuples.retain(|t| *t != tuple);
                }
            }
        }
    }
}

///
/// StagedWrite
///

#[derive(Clone, Debug)]
enum StagedWrite {
    Upsert {
        table: String,
        key: PrimaryKey,
        columns: Columns,
    },
    Delete {
        table: String,
        key: PrimaryKey,
    },
    TupleAdd {
        table: String,
        tuple: [PrimaryKey; 2],
    },
    TupleRemove {
        table: String,
        tuple: [PrimaryKey; 2],
    },
}

///
/// MemoryDataSource
///
/// Connection over a shared `MemoryStore`. Saves are staged and only reach
/// the store on `commit`; reads see committed data only.
///

pub struct MemoryDataSource {
    name: String,
    store: SharedMemoryStore,
    staged: Vec<StagedWrite>,
    is_open: bool,
    in_save_batch: bool,
    isolation_level: IsolationLevel,
    query_handler: Option<Arc<QueryHandler>>,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>, store: SharedMemoryStore) -> Self {
        Self {
            name: name.into(),
            store,
            staged: Vec::new(),
            is_open: false,
            in_save_batch: false,
            isolation_level: IsolationLevel::default(),
            query_handler: None,
        }
    }

    #[must_use]
    pub const fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    #[must_use]
    pub const fn staged_writes(&self) -> usize {
        self.staged.len()
    }

    fn ensure_open(&self) -> Result<(), InternalError> {
        if self.is_open {
            Ok(())
        } else {
            Err(InternalError::invariant(
                ErrorOrigin::DataSource,
                format!("data source '{}' is not open", self.name),
            ))
        }
    }

    fn stage_insert(
        &mut self,
        request: &SaveRequest<'_>,
        store: &MemoryStore,
    ) -> Result<(), InternalError> {
        let root = request.class.root_table();
        let pending = self.staged.iter().any(|w| {
            matches!(w, StagedWrite::Upsert { table, key, .. } if *table == root.name && key == request.key)
        });
        if pending || store.contains(&root.name, request.key) {
            return Err(InternalError::conflict(
                ErrorOrigin::DataSource,
                format!(
                    "duplicate key {} in table '{}'",
                    request.key, root.name
                ),
            ));
        }

        for table in &request.class.unified_tables {
            let columns = table_columns(request, table);
            self.staged.push(StagedWrite::Upsert {
                table: table.name.clone(),
                key: request.key.clone(),
                columns,
            });
        }

        Ok(())
    }

    fn stage_update(&mut self, request: &SaveRequest<'_>) {
        for table in &request.class.unified_tables {
            let touched = request.changes.iter().any(|change| {
                request
                    .class
                    .unified_field(change.field)
                    .is_some_and(|f| f.table == table.ordinal)
            });
            if touched {
                self.staged.push(StagedWrite::Upsert {
                    table: table.name.clone(),
                    key: request.key.clone(),
                    columns: table_columns(request, table),
                });
            }
        }
    }

    fn stage_delete(&mut self, request: &SaveRequest<'_>) {
        // subclass tables first, root last
        for table in request.class.unified_tables.iter().rev() {
            self.staged.push(StagedWrite::Delete {
                table: table.name.clone(),
                key: request.key.clone(),
            });
        }
    }
}

/// Primary-key columns plus every changed column that lives on `table`.
fn table_columns(request: &SaveRequest<'_>, table: &TableInfo) -> Columns {
    let mut columns: Columns = table
        .primary_key_fields()
        .zip(request.key.components())
        .map(|(field, value)| (field.db_column.clone(), value.clone()))
        .collect();

    for change in request.changes {
        if let Some(field) = request.class.unified_field(change.field)
            && field.table == table.ordinal
        {
            columns.insert(field.db_column.clone(), change.value.clone());
        }
    }

    columns
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), InternalError> {
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), InternalError> {
        self.staged.clear();
        self.is_open = false;
        Ok(())
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), InternalError> {
        self.isolation_level = level;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), InternalError> {
        self.ensure_open()?;
        let mut store = self.store.lock();
        for write in self.staged.drain(..) {
            store.apply(write);
        }

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), InternalError> {
        self.staged.clear();
        self.in_save_batch = false;
        Ok(())
    }

    fn begin_save_changes(&mut self) -> Result<(), InternalError> {
        self.ensure_open()?;
        self.in_save_batch = true;
        Ok(())
    }

    fn save_object_changes(&mut self, request: &SaveRequest<'_>) -> Result<(), InternalError> {
        if !self.in_save_batch {
            return Err(InternalError::invariant(
                ErrorOrigin::DataSource,
                "save_object_changes called outside a save batch",
            ));
        }

        match request.kind {
            SaveKind::Insert => {
                let store = Arc::clone(&self.store);
                let store = store.lock();
                self.stage_insert(request, &*store)?;
            }
            SaveKind::Update => self.stage_update(request),
            SaveKind::Delete => self.stage_delete(request),
        }

        Ok(())
    }

    fn finish_save_changes(&mut self) -> Result<(), InternalError> {
        self.in_save_batch = false;
        Ok(())
    }

    fn load_object(
        &mut self,
        class: &ClassInfo,
        key: &PrimaryKey,
        table: Option<TableOrdinal>,
    ) -> Result<Option<LoadedRow>, InternalError> {
        self.ensure_open()?;
        let store = self.store.lock();

        let scope: Vec<&TableInfo> = match table {
            Some(ordinal) => class.table(ordinal).into_iter().collect(),
            None => class.unified_tables.iter().collect(),
        };
        if scope.is_empty() {
            return Err(InternalError::invariant(
                ErrorOrigin::DataSource,
                format!("class '{}' has no table {table:?}", class.name),
            ));
        }

        let mut row = LoadedRow {
            values: vec![Value::Null; class.field_count()],
            tables: 0,
        };
        for info in scope {
            let Some(columns) = store.row(&info.name, key) else {
                return Ok(None);
            };
            for field in info.unified_fields() {
                if let Some(ordinal) = field.unified_ordinal {
                    row.values[ordinal.index()] =
                        columns.get(&field.db_column).cloned().unwrap_or_default();
                }
            }
            row.tables |= info.ordinal.mask_bit();
        }

        Ok(Some(row))
    }

    fn load_keys(
        &mut self,
        class: &ClassInfo,
        condition: &Condition,
        order: &[OrderBy],
        limit: Option<usize>,
    ) -> Result<Vec<PrimaryKey>, InternalError> {
        self.ensure_open()?;
        let store = self.store.lock();

        let mut selected = Vec::new();
        for key in store.class_keys(class) {
            let mut view = RowView {
                store: &store,
                class,
                key: &key,
            };
            if condition.matches(&mut view, TextMode::Cs)? {
                let sort_values = filter::order_values(&mut view, order)?;
                selected.push((key, sort_values));
            }
        }
        filter::sort_by_order(&mut selected, order);

        let keys = selected.into_iter().map(|(key, _)| key);
        Ok(match limit {
            Some(limit) => keys.take(limit).collect(),
            None => keys.collect(),
        })
    }

    fn execute_query(
        &mut self,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<Vec<Value>>, InternalError> {
        self.ensure_open()?;
        let Some(handler) = self.query_handler.clone() else {
            return Err(InternalError::unsupported(
                ErrorOrigin::DataSource,
                format!("data source '{}' has no query handler", self.name),
            ));
        };
        let store = self.store.lock();

        handler(&*store, query, params)
    }

    fn save_tuples(
        &mut self,
        relation: &RelationInfo,
        changes: &TupleChanges,
    ) -> Result<(), InternalError> {
        self.ensure_open()?;
        let table = &relation.table.name;
        for tuple in &changes.removed {
            self.staged.push(StagedWrite::TupleRemove {
                table: table.clone(),
                tuple: tuple.clone(),
            });
        }
        for tuple in &changes.added {
            self.staged.push(StagedWrite::TupleAdd {
                table: table.clone(),
                tuple: tuple.clone(),
            });
        }

        Ok(())
    }

    fn load_tuples(
        &mut self,
        relation: &RelationInfo,
        side: usize,
        key: &PrimaryKey,
    ) -> Result<Vec<PrimaryKey>, InternalError> {
        self.ensure_open()?;
        let other = RelationInfo::other_side(side);
        let store = self.store.lock();

        Ok(store
            .tuples(&relation.table.name)
            .iter()
            .filter(|tuple| tuple[side] == *key)
            .map(|tuple| tuple[other].clone())
            .collect())
    }
}

///
/// RowView
///
/// Field lookups by name over one committed row spread across the class's
/// tables.
///

struct RowView<'a> {
    store: &'a MemoryStore,
    class: &'a ClassInfo,
    key: &'a PrimaryKey,
}

impl FieldSource for RowView<'_> {
    fn field_value(&mut self, field: &str) -> Result<Value, InternalError> {
        let info = self.class.field(field).ok_or_else(|| {
            InternalError::new(
                ErrorClass::SchemaInconsistency,
                ErrorOrigin::Filter,
                format!("class '{}' has no field '{field}'", self.class.name),
            )
        })?;
        let table = self.class.table(info.table).ok_or_else(|| {
            InternalError::invariant(ErrorOrigin::Filter, "field table out of range")
        })?;

        Ok(self
            .store
            .row(&table.name, self.key)
            .and_then(|columns| columns.get(&info.db_column))
            .cloned()
            .unwrap_or_default())
    }
}

///
/// MemoryDataSourceFactory
///

#[derive(Clone)]
pub struct MemoryDataSourceFactory {
    store: SharedMemoryStore,
    query_handler: Option<Arc<QueryHandler>>,
}

impl MemoryDataSourceFactory {
    #[must_use]
    pub const fn new(store: SharedMemoryStore) -> Self {
        Self {
            store,
            query_handler: None,
        }
    }

    /// Answer `execute_query` with a closure over the committed store.
    #[must_use]
    pub fn with_query_handler(
        mut self,
        handler: impl Fn(&MemoryStore, &str, &[Value]) -> Result<Vec<Vec<Value>>, InternalError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.query_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn store(&self) -> SharedMemoryStore {
        Arc::clone(&self.store)
    }
}

impl DataSourceFactory for MemoryDataSourceFactory {
    fn create(&self, name: &str) -> Result<Box<dyn DataSource>, InternalError> {
        let mut source = MemoryDataSource::new(name, Arc::clone(&self.store));
        source.query_handler = self.query_handler.clone();

        Ok(Box::new(source))
    }
}
