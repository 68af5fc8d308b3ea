mod common;

use strata::{
    ErrorKind, ErrorOrigin,
    core::{config::ReferenceMode, value::Value},
};

const CONFIG: &str = r#"
    [transaction]
    reference_mode = "strong"
    disable_triggers = true

    [cache]
    enabled = false

    [data_sources.default]
    kind = "memory"
"#;

#[test]
fn configured_databases_apply_transaction_defaults() {
    let db = strata::open(common::shop_schema(), CONFIG)
        .expect("config should load")
        .build()
        .expect("database should build");

    let options = db.options();
    assert_eq!(options.reference_mode, ReferenceMode::Strong);
    assert!(options.disable_triggers);

    let mut tx = db.begin();
    let customer = tx.create("Customer").expect("customer should be created");
    tx.set_value(customer, "Name", "Ada").expect("name should be set");
    tx.commit().expect("commit should succeed");
    assert_eq!(
        tx.get_value(customer, "Name").expect("name should read"),
        Value::from("Ada")
    );
}

#[test]
fn unknown_source_kinds_are_config_errors() {
    let err = strata::open(
        common::shop_schema(),
        r#"
        [data_sources.default]
        kind = "oracle"
        "#,
    )
    .expect_err("only memory sources ship with the runtime");

    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert_eq!(err.origin, ErrorOrigin::Config);
    assert!(err.message.contains("oracle"));
}

#[test]
fn malformed_config_is_rejected() {
    let err = strata::open(common::shop_schema(), "[transaction]\nuse_cache = \"yes\"")
        .expect_err("use_cache is a boolean");

    assert_eq!(err.origin, ErrorOrigin::Config);
}

#[test]
fn missing_sources_fail_the_build() {
    let err = strata::open(common::shop_schema(), "")
        .expect("empty config is valid")
        .build()
        .expect_err("the default source is not configured");

    assert_eq!(strata::Error::from(err).origin, ErrorOrigin::Config);
}
