use super::*;
use crate::test_support;
use std::collections::BTreeMap;
use strata_schema::node::SchemaInfo;

fn columns(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn open_source(store: &SharedMemoryStore) -> MemoryDataSource {
    let mut source = MemoryDataSource::new("default", Arc::clone(store));
    source.open().expect("memory source should open");
    source
}

fn field(class: &ClassInfo, name: &str) -> UnifiedFieldOrdinal {
    class
        .field(name)
        .and_then(|f| f.unified_ordinal)
        .expect("fixture field should be unified")
}

fn insert_manager(source: &mut MemoryDataSource, schema: &SchemaInfo, id: i64, name: &str) {
    let manager = schema.class("Manager").expect("Manager should exist");
    let key = PrimaryKey::from(id);
    let changes = vec![
        FieldChange {
            field: field(manager, "Name"),
            value: Value::from(name),
        },
        FieldChange {
            field: field(manager, "Kind"),
            value: Value::from("manager"),
        },
        FieldChange {
            field: field(manager, "Budget"),
            value: Value::Long(10),
        },
    ];

    source.begin_save_changes().expect("batch should begin");
    source
        .save_object_changes(&SaveRequest {
            class: manager,
            key: &key,
            kind: SaveKind::Insert,
            changes: &changes,
        })
        .expect("insert should stage");
    source.finish_save_changes().expect("batch should finish");
}

#[test]
fn inserts_are_staged_until_commit() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    let mut source = open_source(&store);

    insert_manager(&mut source, &schema, 1, "Grace");
    assert_eq!(store.lock().row_count("people"), 0);
    assert_eq!(source.staged_writes(), 3);

    source.commit().expect("commit should apply staged writes");

    let store = store.lock();
    assert_eq!(store.row_count("people"), 1);
    assert_eq!(store.row_count("employees"), 1);
    assert_eq!(store.row_count("managers"), 1);
    assert_eq!(
        store
            .row("people", &PrimaryKey::from(1i64))
            .and_then(|c| c.get("Name")),
        Some(&Value::from("Grace"))
    );
}

#[test]
fn rollback_discards_staged_writes() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    let mut source = open_source(&store);

    insert_manager(&mut source, &schema, 1, "Grace");
    source.rollback().expect("rollback should succeed");
    source.commit().expect("empty commit should succeed");

    assert_eq!(store.lock().row_count("people"), 0);
}

#[test]
fn duplicate_insert_is_a_conflict() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    store.lock().insert_row(
        "people",
        PrimaryKey::from(1i64),
        columns(&[("Id", Value::Long(1)), ("Name", Value::from("Ada"))]),
    );
    let mut source = open_source(&store);
    let person = schema.class("Person").expect("Person should exist");

    source.begin_save_changes().expect("batch should begin");
    let err = source
        .save_object_changes(&SaveRequest {
            class: person,
            key: &PrimaryKey::from(1i64),
            kind: SaveKind::Insert,
            changes: &[],
        })
        .expect_err("duplicate key should be rejected");

    assert_eq!(err.class, crate::error::ErrorClass::Conflict);
}

#[test]
fn saving_outside_a_batch_is_rejected() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    let mut source = open_source(&store);
    let person = schema.class("Person").expect("Person should exist");

    let err = source
        .save_object_changes(&SaveRequest {
            class: person,
            key: &PrimaryKey::from(1i64),
            kind: SaveKind::Delete,
            changes: &[],
        })
        .expect_err("save outside batch should fail");

    assert_eq!(err.class, crate::error::ErrorClass::InvariantViolation);
}

#[test]
fn load_object_reads_all_or_one_table() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    let mut source = open_source(&store);
    insert_manager(&mut source, &schema, 7, "Grace");
    source.commit().expect("commit should succeed");

    let manager = schema.class("Manager").expect("Manager should exist");
    let key = PrimaryKey::from(7i64);

    let full = source
        .load_object(manager, &key, None)
        .expect("load should succeed")
        .expect("row should exist");
    assert_eq!(full.tables, manager.all_tables_mask());
    assert_eq!(full.values[field(manager, "Budget").index()], Value::Long(10));

    let one = source
        .load_object(manager, &key, Some(TableOrdinal::new(2)))
        .expect("load should succeed")
        .expect("row should exist");
    assert_eq!(one.tables, TableOrdinal::new(2).mask_bit());
    assert_eq!(one.values[field(manager, "Name").index()], Value::Null);

    let missing = source
        .load_object(manager, &PrimaryKey::from(8i64), None)
        .expect("load should succeed");
    assert!(missing.is_none());
}

#[test]
fn base_class_rows_do_not_load_as_subclasses() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    store.lock().insert_row(
        "people",
        PrimaryKey::from(3i64),
        columns(&[("Id", Value::Long(3)), ("Name", Value::from("Ada"))]),
    );
    let mut source = open_source(&store);
    let manager = schema.class("Manager").expect("Manager should exist");

    let row = source
        .load_object(manager, &PrimaryKey::from(3i64), None)
        .expect("load should succeed");

    assert!(row.is_none());
}

#[test]
fn load_keys_filters_orders_and_limits() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    {
        let mut store = store.lock();
        for (id, name, age) in [(1i64, "Ada", 36), (2, "Grace", 85), (3, "Alan", 41)] {
            store.insert_row(
                "people",
                PrimaryKey::from(id),
                columns(&[
                    ("Id", Value::Long(id)),
                    ("Name", Value::from(name)),
                    ("Age", Value::Integer(age)),
                ]),
            );
        }
    }
    let mut source = open_source(&store);
    let person = schema.class("Person").expect("Person should exist");

    let keys = source
        .load_keys(
            person,
            &Condition::like("Name", "A%"),
            &[OrderBy::desc("Age")],
            None,
        )
        .expect("query should succeed");
    assert_eq!(keys, vec![PrimaryKey::from(3i64), PrimaryKey::from(1i64)]);

    let first = source
        .load_keys(person, &Condition::True, &[], Some(1))
        .expect("query should succeed");
    assert_eq!(first, vec![PrimaryKey::from(1i64)]);

    let err = source
        .load_keys(person, &Condition::is_null("Nope"), &[], None)
        .expect_err("unknown field should fail");
    assert_eq!(err.origin, ErrorOrigin::Filter);
}

#[test]
fn tuples_round_trip_through_commit() {
    let schema = test_support::library();
    let store = MemoryStore::shared();
    let mut source = open_source(&store);
    let relation = schema.relation("BookTags").expect("BookTags should exist");

    let mut changes = TupleChanges::default();
    changes.add([PrimaryKey::from(1i64), PrimaryKey::from("rust")]);
    changes.add([PrimaryKey::from(1i64), PrimaryKey::from("db")]);
    changes.add([PrimaryKey::from(2i64), PrimaryKey::from("rust")]);
    source
        .save_tuples(relation, &changes)
        .expect("tuples should stage");
    source.commit().expect("commit should succeed");

    let tags = source
        .load_tuples(relation, 0, &PrimaryKey::from(1i64))
        .expect("tuples should load");
    let books = source
        .load_tuples(relation, 1, &PrimaryKey::from("rust"))
        .expect("tuples should load");

    assert_eq!(tags, vec![PrimaryKey::from("rust"), PrimaryKey::from("db")]);
    assert_eq!(books, vec![PrimaryKey::from(1i64), PrimaryKey::from(2i64)]);
}

#[test]
fn tuple_changes_cancel_out() {
    let tuple = [PrimaryKey::from(1i64), PrimaryKey::from("rust")];
    let mut changes = TupleChanges::default();

    changes.add(tuple.clone());
    changes.remove(tuple.clone());
    assert!(changes.is_empty());

    changes.remove(tuple.clone());
    changes.add(tuple);
    assert!(changes.is_empty());
}

#[test]
fn execute_query_uses_the_registered_handler() {
    let store = MemoryStore::shared();
    store.lock().insert_row(
        "people",
        PrimaryKey::from(1i64),
        columns(&[("Id", Value::Long(1))]),
    );
    let factory = MemoryDataSourceFactory::new(Arc::clone(&store)).with_query_handler(
        |store, query, _params| {
            let count = i64::try_from(store.row_count(query)).unwrap_or(i64::MAX);
            Ok(vec![vec![Value::Long(count)]])
        },
    );

    let mut source = factory.create("default").expect("factory should create");
    source.open().expect("source should open");
    let rows = source
        .execute_query("people", &[])
        .expect("query should run");

    assert_eq!(rows, vec![vec![Value::Long(1)]]);

    let mut bare = open_source(&store);
    let err = bare
        .execute_query("people", &[])
        .expect_err("no handler means unsupported");
    assert_eq!(err.class, crate::error::ErrorClass::Unsupported);
}

#[test]
fn registry_resolves_configured_sources() {
    let mut sources = std::collections::BTreeMap::new();
    sources.insert(
        "default".to_string(),
        DataSourceConfig {
            isolation_level: Some(IsolationLevel::Serializable),
            ..DataSourceConfig::default()
        },
    );
    let registry = DataSourceRegistry::from_config(&sources).expect("memory kind is built in");

    assert!(registry.contains("default"));
    assert_eq!(
        registry.isolation_override("default"),
        Some(IsolationLevel::Serializable)
    );
    assert!(registry.create("missing").is_err());

    sources.insert(
        "archive".to_string(),
        DataSourceConfig {
            kind: "sql".to_string(),
            ..DataSourceConfig::default()
        },
    );
    assert!(DataSourceRegistry::from_config(&sources).is_err());
}

#[test]
fn sequence_keys_are_shared_across_a_hierarchy() {
    let schema = test_support::company();
    let generator = SequenceKeyGenerator::new();
    let person = schema.class("Person").expect("Person should exist");
    let manager = schema.class("Manager").expect("Manager should exist");
    let line = schema.class("OrderLine").expect("OrderLine should exist");

    let first = generator.next_key(person).expect("generation should work");
    let second = generator.next_key(manager).expect("generation should work");

    assert_eq!(first, Some(PrimaryKey::from(1i64)));
    assert_eq!(second, Some(PrimaryKey::from(2i64)));
    assert_eq!(generator.next_key(line).expect("composite is skipped"), None);
}

#[test]
fn seeded_sequence_continues_after_existing_rows() {
    let schema = test_support::company();
    let store = MemoryStore::shared();
    store.lock().insert_row(
        "people",
        PrimaryKey::from(41i64),
        columns(&[("Id", Value::Long(41))]),
    );

    let generator = SequenceKeyGenerator::seeded_from(&store.lock(), &schema.classes);
    let person = schema.class("Person").expect("Person should exist");

    assert_eq!(
        generator.next_key(person).expect("generation should work"),
        Some(PrimaryKey::from(42i64))
    );
}
