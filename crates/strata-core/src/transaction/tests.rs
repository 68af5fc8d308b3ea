use super::*;
use crate::{
    config::ReferenceMode,
    error::ErrorClass,
    filter::{Condition, OrderBy},
    hooks::{ClassFactory, FieldHooks, ObjectHooks},
    object::ObjectState,
    runtime::{Database, DatabaseBuilder},
    source::{MemoryDataSourceFactory, MemoryStore, SharedMemoryStore},
    test_support,
};
use parking_lot::Mutex;
use strata_schema::node::FieldInfo;

///
/// Fixtures
///

fn database(schema: Arc<SchemaInfo>, factories: Vec<ClassFactory>) -> (Database, SharedMemoryStore) {
    let store = MemoryStore::shared();
    let builder = factories.into_iter().fold(
        Database::builder(schema)
            .data_source("default", MemoryDataSourceFactory::new(Arc::clone(&store))),
        DatabaseBuilder::factory,
    );

    (builder.build().expect("database should build"), store)
}

fn company() -> (Database, SharedMemoryStore) {
    database(test_support::company(), Vec::new())
}

fn person(tx: &mut Transaction, name: &str) -> ObjectHandle {
    let object = tx.create("Person").expect("person should be created");
    tx.set_value(object, "Name", name).expect("name should be set");
    object
}

fn key_of(tx: &mut Transaction, object: ObjectHandle) -> PrimaryKey {
    tx.primary_key(object)
        .expect("object should be live")
        .expect("object should have a key")
}

fn stored(store: &SharedMemoryStore, table: &str, key: i64, column: &str) -> Option<Value> {
    store
        .lock()
        .row(table, &PrimaryKey::from(key))
        .and_then(|columns| columns.get(column).cloned())
}

///
/// Recorder
///
/// Appends one line per hook call.
///

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl ObjectHooks for Recorder {
    fn on_create(&self, _: &mut Transaction, _: ObjectHandle) -> Result<(), InternalError> {
        self.push("on_create");
        Ok(())
    }

    fn before_field_update(
        &self,
        _: &mut Transaction,
        _: ObjectHandle,
        field: &FieldInfo,
        _: &Value,
        _: &Value,
    ) -> Result<(), InternalError> {
        self.push(format!("before_field_update:{}", field.name));
        Ok(())
    }

    fn after_field_update(
        &self,
        _: &mut Transaction,
        _: ObjectHandle,
        field: &FieldInfo,
        _: &Value,
        _: &Value,
    ) -> Result<(), InternalError> {
        self.push(format!("after_field_update:{}", field.name));
        Ok(())
    }

    fn before_commit_insert(&self, _: &mut Transaction, _: ObjectHandle) -> Result<(), InternalError> {
        self.push("before_commit_insert");
        Ok(())
    }

    fn after_commit_insert(&self, _: &mut Transaction, _: ObjectHandle) -> Result<(), InternalError> {
        self.push("after_commit_insert");
        Ok(())
    }

    fn check_assertions(&self, _: &mut Transaction, _: ObjectHandle) -> Result<(), InternalError> {
        self.push("check_assertions");
        Ok(())
    }
}

impl FieldHooks for Recorder {
    fn before_update(
        &self,
        _: &mut Transaction,
        _: ObjectHandle,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        self.push(format!("before_update:{old}->{new}"));
        Ok(())
    }

    fn after_update(
        &self,
        _: &mut Transaction,
        _: ObjectHandle,
        old: &Value,
        new: &Value,
    ) -> Result<(), InternalError> {
        self.push(format!("after_update:{old}->{new}"));
        Ok(())
    }
}

///
/// IDENTITY
///

#[test]
fn created_objects_get_sequence_keys_and_register() {
    let (db, _) = company();
    let mut tx = db.begin();

    let first = person(&mut tx, "Ada");
    let second = person(&mut tx, "Grace");

    assert_eq!(key_of(&mut tx, first), PrimaryKey::from(1i64));
    assert_eq!(key_of(&mut tx, second), PrimaryKey::from(2i64));
    assert_eq!(tx.object_state(first), ObjectState::InsertPending);
    assert_eq!(tx.find("Person", 1i64).expect("lookup should work"), Some(first));
    assert_eq!(
        tx.get_value(first, "Kind").expect("selector should be readable"),
        Value::from("Person")
    );
}

#[test]
fn one_live_object_per_key_across_the_hierarchy() {
    let (db, _) = company();
    let mut tx = db.begin();
    let manager = tx.create("Manager").expect("manager should be created");
    tx.set_value(manager, "Name", "Lin").expect("name should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let as_person = tx.get_ref("Person", 1i64).expect("ref should resolve");
    let as_manager = tx.get_ref("Manager", 1i64).expect("ref should resolve");

    assert_eq!(as_person, as_manager);
    assert_eq!(tx.class_name(as_person).expect("object is live"), "Manager");
}

#[test]
fn duplicate_keys_conflict_and_leave_nothing_behind() {
    let (db, _) = company();
    let mut tx = db.begin();
    tx.create_with_key("Person", 5i64)
        .expect("first create should succeed");

    let err = tx
        .create_with_key("Person", 5i64)
        .expect_err("second create should conflict");

    assert_eq!(err.class, ErrorClass::Conflict);
    assert_eq!(tx.live_objects(), 1);
}

#[test]
fn composite_keys_register_once_every_component_is_set() {
    let (db, _) = company();
    let mut tx = db.begin();
    let line = tx.create("OrderLine").expect("line should be created");
    let key = PrimaryKey::from_values(vec![Value::Long(7), Value::Integer(1)]);

    assert_eq!(tx.object_state(line), ObjectState::Uninitialized);

    tx.set_value(line, "OrderId", 7i64).expect("first component should be set");
    assert_eq!(tx.object_state(line), ObjectState::Uninitialized);
    assert_eq!(tx.find("OrderLine", key.clone()).expect("lookup should work"), None);

    tx.set_value(line, "Line", 1).expect("second component should be set");
    assert_eq!(tx.object_state(line), ObjectState::InsertPending);
    assert_eq!(tx.find("OrderLine", key.clone()).expect("lookup should work"), Some(line));

    let other = tx.create("OrderLine").expect("line should be created");
    tx.set_value(other, "OrderId", 7i64).expect("first component should be set");
    let err = tx
        .set_value(other, "Line", 1)
        .expect_err("duplicate composite key should conflict");
    assert_eq!(err.class, ErrorClass::Conflict);
    assert_eq!(tx.primary_key(other).expect("object is live"), None);
}

#[test]
fn missing_rows_are_not_found() {
    let (db, _) = company();
    let mut tx = db.begin();

    let err = tx
        .load("Department", 42i64)
        .expect_err("missing department should fail");
    assert!(err.is_not_found());
    assert_eq!(tx.find("Department", 42i64).expect("lookup should work"), None);

    assert_eq!(tx.try_load("Person", 42i64).expect("try_load should not fail"), None);
}

///
/// LAZY LOADING
///

#[test]
fn subclass_tables_load_on_first_access() {
    let (db, store) = company();
    let mut tx = db.begin();
    let manager = tx.create("Manager").expect("manager should be created");
    tx.set_value(manager, "Name", "Lin").expect("name should be set");
    tx.set_value(manager, "Budget", 10i64).expect("budget should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let manager = tx.get_ref("Person", 1i64).expect("ref should resolve");
    assert_eq!(tx.stats().object_loads, 1);

    assert_eq!(
        tx.get_value(manager, "Name").expect("name should read"),
        Value::from("Lin")
    );
    assert_eq!(tx.stats().object_loads, 1);

    tx.set_value(manager, "Budget", 20i64).expect("budget should be set");
    assert_eq!(tx.stats().object_loads, 2);
    assert_eq!(tx.object_state(manager), ObjectState::Dirty);

    tx.commit().expect("commit should succeed");
    assert_eq!(tx.stats().updates, 1);
    assert_eq!(stored(&store, "managers", 1, "Budget"), Some(Value::Long(20)));
    assert_eq!(stored(&store, "people", 1, "Name"), Some(Value::from("Lin")));
}

#[test]
fn writing_the_current_value_changes_nothing() {
    let (db, _) = company();
    let mut tx = db.begin();
    person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let ada = tx.load("Person", 1i64).expect("ada should load");
    tx.set_value(ada, "Name", "Ada").expect("same value should be accepted");

    assert!(!tx.is_object_dirty(ada));
    assert!(!tx.has_pending_changes());
}

#[test]
fn disabled_triggers_still_skip_unchanged_loaded_values() {
    let (db, _) = company();
    let mut tx = db.begin();
    person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin_with(TransactionOptions::default().disable_triggers(true));
    let ada = tx.load("Person", 1i64).expect("ada should load");
    tx.set_value(ada, "Name", "Ada").expect("same value should be accepted");

    assert!(!tx.is_field_dirty(ada, "Name").expect("field should exist"));
    assert!(!tx.is_object_dirty(ada));

    tx.set_value(ada, "Name", "Lin").expect("name should be set");
    assert!(tx.is_field_dirty(ada, "Name").expect("field should exist"));
}

///
/// WEAK RELEASE
///

#[test]
fn released_objects_rehydrate_on_access() {
    let (db, _) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    person(&mut tx, "Grace");
    tx.commit().expect("commit should succeed");

    assert_eq!(tx.release_clean_objects(), 2);
    assert_eq!(tx.live_objects(), 0);
    assert_eq!(tx.object_state(ada), ObjectState::Detached);

    assert_eq!(
        tx.get_value(ada, "Name").expect("released handle should rehydrate"),
        Value::from("Ada")
    );
    assert_eq!(tx.live_objects(), 1);
}

#[test]
fn live_object_limit_releases_clean_objects() {
    let (db, _) = company();
    let mut tx = db.begin();
    for name in ["A", "B", "C"] {
        person(&mut tx, name);
    }
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin_with(TransactionOptions::default().max_live_objects(2));
    let first = tx.load("Person", 1i64).expect("first should load");
    tx.load("Person", 2i64).expect("second should load");
    tx.load("Person", 3i64).expect("third should load");

    assert!(tx.live_objects() <= 2);
    assert_eq!(
        tx.get_value(first, "Name").expect("first should rehydrate"),
        Value::from("A")
    );
}

#[test]
fn repeated_releases_keep_bookkeeping_bounded() {
    let (db, _) = company();
    let mut tx = db.begin();
    for name in ["A", "B", "C"] {
        person(&mut tx, name);
    }
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin_with(TransactionOptions::default().max_live_objects(1));
    let mut last = None;
    for _ in 0..200 {
        for key in 1..=3i64 {
            last = Some(tx.load("Person", key).expect("person should load"));
        }
    }

    assert!(tx.live_objects() <= 1);
    assert!(tx.arena.released_count() <= 3);
    let last = last.expect("loop should run");
    assert_eq!(
        tx.get_value(last, "Name").expect("last handle should read"),
        Value::from("C")
    );
}

#[test]
fn strong_mode_never_releases() {
    let (db, _) = company();
    let mut tx = db.begin_with(TransactionOptions::default().reference_mode(ReferenceMode::Strong));
    person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");

    assert_eq!(tx.release_clean_objects(), 0);
    assert_eq!(tx.live_objects(), 1);
}

///
/// HOOKS
///

#[test]
fn hooks_run_once_each_in_order() {
    let recorder = Recorder::default();
    let (db, _) = database(
        test_support::company(),
        vec![
            ClassFactory::new("Person")
                .hooks(recorder.clone())
                .field_hooks("Age", recorder.clone()),
        ],
    );
    let mut tx = db.begin();

    let ada = tx.create("Person").expect("person should be created");
    tx.set_value(ada, "Age", 30).expect("age should be set");
    tx.set_value(ada, "Age", 30).expect("same age should be accepted");
    assert_eq!(
        recorder.take(),
        [
            "on_create",
            "before_update:null->30",
            "before_field_update:Age",
            "after_update:null->30",
            "after_field_update:Age",
        ]
    );

    tx.set_value(ada, "Name", "Ada").expect("name should be set");
    recorder.take();
    tx.commit().expect("commit should succeed");
    assert_eq!(
        recorder.take(),
        ["before_commit_insert", "check_assertions", "after_commit_insert"]
    );
}

#[test]
fn disabled_triggers_skip_update_hooks() {
    let recorder = Recorder::default();
    let (db, _) = database(
        test_support::company(),
        vec![
            ClassFactory::new("Person")
                .hooks(recorder.clone())
                .field_hooks("Age", recorder.clone()),
        ],
    );
    let mut tx = db.begin_with(TransactionOptions::default().disable_triggers(true));

    let ada = tx.create("Person").expect("person should be created");
    tx.set_value(ada, "Age", 30).expect("age should be set");

    assert_eq!(recorder.take(), ["on_create"]);
    assert!(tx.is_field_dirty(ada, "Age").expect("field should exist"));
}

#[test]
fn failing_before_hook_leaves_the_field_unchanged() {
    struct Reject;
    impl FieldHooks for Reject {
        fn before_update(
            &self,
            _: &mut Transaction,
            _: ObjectHandle,
            _: &Value,
            _: &Value,
        ) -> Result<(), InternalError> {
            Err(InternalError::assertion("Person", "age is frozen"))
        }
    }

    let (db, _) = database(
        test_support::company(),
        vec![ClassFactory::new("Person").field_hooks("Age", Reject)],
    );
    let mut tx = db.begin();
    let ada = tx.create("Person").expect("person should be created");

    let err = tx.set_value(ada, "Age", 30).expect_err("hook should reject");

    assert_eq!(err.class, ErrorClass::Hook);
    assert!(err.message.contains("before_update"));
    assert_eq!(tx.get_value(ada, "Age").expect("age should read"), Value::Null);
}

#[test]
fn objects_dirtied_during_precommit_join_the_commit() {
    struct TouchHead;
    impl ObjectHooks for TouchHead {
        fn before_commit_insert(
            &self,
            tx: &mut Transaction,
            object: ObjectHandle,
        ) -> Result<(), InternalError> {
            if let Some(head) = tx.get_reference(object, "Head")? {
                tx.set_value(head, "Age", 99)?;
            }
            Ok(())
        }
    }

    let (db, store) = database(
        test_support::company(),
        vec![ClassFactory::new("Department").hooks(TouchHead)],
    );
    let mut tx = db.begin();
    person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let ada = tx.get_ref("Person", 1i64).expect("ada should resolve");
    let department = tx.create("Department").expect("department should be created");
    tx.set_value(department, "Title", "Research").expect("title should be set");
    tx.set_reference(department, "Head", Some(ada)).expect("head should be set");
    tx.commit().expect("commit should succeed");

    assert_eq!(tx.stats().inserts, 1);
    assert_eq!(tx.stats().updates, 1);
    assert_eq!(stored(&store, "people", 1, "Age"), Some(Value::Integer(99)));
}

#[test]
fn after_commit_writes_join_the_next_commit() {
    struct StampAge;
    impl ObjectHooks for StampAge {
        fn after_commit_insert(
            &self,
            tx: &mut Transaction,
            object: ObjectHandle,
        ) -> Result<(), InternalError> {
            tx.set_value(object, "Age", 1)
        }
    }

    let (db, store) = database(
        test_support::company(),
        vec![ClassFactory::new("Person").hooks(StampAge)],
    );
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");

    assert!(tx.is_object_dirty(ada));
    assert_ne!(stored(&store, "people", 1, "Age"), Some(Value::Integer(1)));

    tx.commit().expect("second commit should succeed");
    assert!(!tx.is_object_dirty(ada));
    assert_eq!(stored(&store, "people", 1, "Age"), Some(Value::Integer(1)));
}

///
/// COMMIT
///

#[test]
fn insert_commit_and_read_back() {
    let (db, store) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    tx.set_value(ada, "Age", 36).expect("age should be set");
    tx.commit().expect("commit should succeed");

    assert_eq!(tx.object_state(ada), ObjectState::Clean);
    assert_eq!(tx.stats().inserts, 1);
    assert_eq!(stored(&store, "people", 1, "Name"), Some(Value::from("Ada")));

    let mut tx = db.begin();
    let ada = tx.load("Person", 1i64).expect("ada should load");
    assert_eq!(tx.get_value(ada, "Age").expect("age should read"), Value::Integer(36));
    assert_eq!(tx.get_value(ada, "Mentor").expect("mentor should read"), Value::Null);
}

#[test]
fn second_commit_saves_nothing() {
    let (db, _) = company();
    let mut tx = db.begin();
    person(&mut tx, "Ada");
    tx.commit().expect("first commit should succeed");
    tx.commit().expect("second commit should succeed");

    let stats = tx.stats();
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.updates, 0);
}

#[test]
fn constraint_failures_save_nothing_and_keep_changes() {
    let (db, store) = company();
    let mut tx = db.begin();
    let nameless = tx.create("Person").expect("person should be created");

    let err = tx.commit().expect_err("missing name should fail");
    assert!(err.is_constraint_violation());
    assert!(err.message.contains("Name"));
    assert_eq!(store.lock().row_count("people"), 0);
    assert_eq!(tx.object_state(nameless), ObjectState::InsertPending);

    tx.set_value(nameless, "Name", "x".repeat(41)).expect("name should be set");
    let err = tx.commit().expect_err("oversized name should fail");
    assert!(err.is_constraint_violation());

    tx.set_value(nameless, "Name", "Ada").expect("name should be set");
    tx.commit().expect("fixed object should commit");
    assert_eq!(store.lock().row_count("people"), 1);
}

#[test]
fn rollback_detaches_everything() {
    let (db, store) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");

    tx.rollback().expect("rollback should succeed");

    assert_eq!(tx.object_state(ada), ObjectState::Detached);
    assert!(!tx.has_pending_changes());
    assert_eq!(tx.stats().rollbacks, 1);
    assert_eq!(store.lock().row_count("people"), 0);
}

#[test]
fn closed_transactions_refuse_work() {
    let (db, _) = company();
    let mut tx = db.begin();
    person(&mut tx, "Ada");
    tx.commit().expect("commit should succeed");
    tx.shutdown().expect("shutdown should succeed");

    assert!(tx.commit().is_err());
    assert!(tx.load("Person", 1i64).is_err());
}

///
/// DELETE
///

#[test]
fn deleting_a_head_cascades_to_departments() {
    let (db, store) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    let department = tx.create("Department").expect("department should be created");
    tx.set_value(department, "Title", "Research").expect("title should be set");
    tx.set_reference(department, "Head", Some(ada)).expect("head should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let ada = tx.get_ref("Person", 1i64).expect("ada should resolve");
    tx.mark_for_delete(ada).expect("delete should be accepted");
    let department = tx
        .find("Department", 1i64)
        .expect("lookup should work")
        .expect("department should have been pulled in");
    assert_eq!(tx.object_state(department), ObjectState::MarkedForDelete);

    tx.commit().expect("commit should succeed");
    assert_eq!(tx.stats().deletes, 2);
    assert_eq!(tx.object_state(ada), ObjectState::Detached);
    assert_eq!(store.lock().row_count("people"), 0);
    assert_eq!(store.lock().row_count("departments"), 0);
}

#[test]
fn deleting_a_mentor_nullifies_students() {
    let (db, store) = company();
    let mut tx = db.begin();
    let mentor = person(&mut tx, "Mentor");
    let student = person(&mut tx, "Student");
    tx.set_reference(student, "Mentor", Some(mentor)).expect("mentor should be set");
    tx.commit().expect("commit should succeed");
    assert_eq!(stored(&store, "people", 2, "Mentor"), Some(Value::Long(1)));

    let mut tx = db.begin();
    let mentor = tx.get_ref("Person", 1i64).expect("mentor should resolve");
    tx.mark_for_delete(mentor).expect("delete should be accepted");
    tx.commit().expect("commit should succeed");

    assert_eq!(tx.stats().updates, 1);
    assert_eq!(tx.stats().deletes, 1);
    assert_eq!(stored(&store, "people", 2, "Mentor"), Some(Value::Null));
    assert_eq!(store.lock().row_count("people"), 1);
}

#[test]
fn deleting_a_pending_insert_saves_nothing() {
    let (db, store) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    tx.mark_for_delete(ada).expect("delete should be accepted");

    let err = tx
        .set_value(ada, "Age", 3)
        .expect_err("writes to a deleted object should fail");
    assert_eq!(err.class, ErrorClass::Conflict);

    tx.commit().expect("commit should succeed");
    assert_eq!(tx.stats().deletes, 0);
    assert_eq!(store.lock().row_count("people"), 0);
}

///
/// QUERIES
///

#[test]
fn list_queries_merge_pending_changes() {
    let (db, _) = company();
    let mut tx = db.begin();
    let ann = person(&mut tx, "Ann");
    tx.set_value(ann, "Age", 30).expect("age should be set");
    let bob = person(&mut tx, "Bob");
    tx.set_value(bob, "Age", 20).expect("age should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let cid = person(&mut tx, "Cid");
    tx.set_value(cid, "Age", 25).expect("age should be set");

    let adults = Condition::gt("Age", 21);
    let order = [OrderBy::asc("Age")];
    let found = tx
        .load_keys("Person", &adults, &order, None)
        .expect("query should run");
    let ann = tx.find("Person", 1i64).expect("lookup should work");
    assert_eq!(found, vec![cid, ann.expect("ann should be registered")]);

    let ann = ann.expect("ann should be registered");
    tx.set_value(ann, "Age", 10).expect("age should be set");
    let found = tx
        .load_keys("Person", &adults, &order, None)
        .expect("query should run");
    assert_eq!(found, vec![cid]);

    let filtered = tx
        .filter_loaded(&[ann, cid], &Condition::like("Name", "C%"))
        .expect("filter should run");
    assert_eq!(filtered, vec![cid]);
}

#[test]
fn limited_queries_fill_up_after_pending_edits() {
    let (db, _) = company();
    let mut tx = db.begin();
    for (name, age) in [("A", 30), ("B", 40), ("C", 50)] {
        let object = person(&mut tx, name);
        tx.set_value(object, "Age", age).expect("age should be set");
    }
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let a = tx.load("Person", 1i64).expect("a should load");
    tx.set_value(a, "Age", 10).expect("age should be set");

    let found = tx
        .load_keys("Person", &Condition::gt("Age", 21), &[OrderBy::asc("Age")], Some(2))
        .expect("query should run");
    let names = found
        .iter()
        .map(|object| tx.get_value(*object, "Name").expect("name should read"))
        .collect::<Vec<_>>();
    assert_eq!(names, [Value::from("B"), Value::from("C")]);
}

#[test]
fn collections_follow_foreign_keys_and_relations() {
    let (db, _) = database(test_support::library(), Vec::new());
    let mut tx = db.begin();
    let author = tx.create("Author").expect("author should be created");
    tx.set_value(author, "Name", "Le Guin").expect("name should be set");
    let mut books = Vec::new();
    for title in ["Earthsea", "Lathe"] {
        let book = tx.create("Book").expect("book should be created");
        tx.set_value(book, "Title", title).expect("title should be set");
        tx.set_reference(book, "Author", Some(author)).expect("author should be set");
        books.push(book);
    }
    let fantasy = tx.create_with_key("Tag", "fantasy").expect("tag should be created");
    tx.create_with_key("Tag", "classic").expect("tag should be created");
    tx.relation_add("BookTags", books[0], fantasy).expect("tuple should be added");

    assert_eq!(tx.collection(author, "Books").expect("collection should load"), books);
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let author = tx.get_ref("Author", 1i64).expect("author should resolve");
    let books = tx.collection(author, "Books").expect("collection should load");
    assert_eq!(books.len(), 2);
    assert_eq!(tx.stats().cache_misses, 1);
    tx.collection(author, "Books").expect("collection should load");
    assert_eq!(tx.stats().cache_hits, 1);

    let earthsea = books[0];
    let fantasy = tx.get_ref("Tag", "fantasy").expect("tag should resolve");
    let classic_tag = tx.get_ref("Tag", "classic").expect("tag should resolve");
    assert_eq!(tx.collection(earthsea, "Tags").expect("tags should load"), vec![fantasy]);

    tx.relation_add("BookTags", earthsea, classic_tag).expect("tuple should be added");
    tx.relation_remove("BookTags", earthsea, fantasy).expect("tuple should be removed");
    assert_eq!(
        tx.collection(earthsea, "Tags").expect("tags should load"),
        vec![classic_tag]
    );
    assert_eq!(
        tx.relation_targets("BookTags", 1, classic_tag).expect("targets should load"),
        vec![earthsea]
    );
}

///
/// CACHE
///

#[test]
fn cached_classes_skip_the_data_source_on_later_transactions() {
    let (db, _) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");
    let department = tx.create("Department").expect("department should be created");
    tx.set_value(department, "Title", "Research").expect("title should be set");
    tx.set_reference(department, "Head", Some(ada)).expect("head should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    tx.load("Department", 1i64).expect("department should load");
    assert_eq!(tx.stats().cache_misses, 1);
    assert_eq!(tx.stats().object_loads, 1);

    let mut tx = db.begin();
    let department = tx.load("Department", 1i64).expect("department should load");
    assert_eq!(tx.stats().cache_hits, 1);
    assert_eq!(tx.stats().object_loads, 0);

    tx.set_value(department, "Title", "Labs").expect("title should be set");
    tx.commit().expect("commit should succeed");

    let mut tx = db.begin();
    let department = tx.load("Department", 1i64).expect("department should load");
    assert_eq!(tx.stats().cache_misses, 1);
    assert_eq!(
        tx.get_value(department, "Title").expect("title should read"),
        Value::from("Labs")
    );
}

///
/// PERSISTENT VALUES
///

#[test]
fn persistent_values_live_until_rollback() {
    let (db, _) = company();
    let mut tx = db.begin();
    let ada = person(&mut tx, "Ada");

    tx.set_persistent_value(ada, "note", "draft").expect("value should be set");
    assert_eq!(
        tx.persistent_value(ada, "note").expect("object is live"),
        Some(Value::from("draft"))
    );

    tx.rollback().expect("rollback should succeed");
    assert!(tx.persistent_value(ada, "note").is_err());
}
