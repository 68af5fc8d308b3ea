//! Shared schema fixtures for unit tests.

use std::sync::Arc;
use strata_schema::{def::SchemaDef, node::SchemaInfo};

/// Person → Employee → Manager (one table each, string selector on Kind),
/// Department referencing Person, and an OrderLine with a composite key.
pub const COMPANY_JSON: &str = r#"{
    "classes": [
        { "name": "Person", "label": "Name",
          "subclass_selector_field": "Kind", "subclass_selector_value": "Person",
          "tables": [{ "name": "people", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Name", "data_type": "String", "size": 40 },
              { "name": "Kind", "data_type": "String", "size": 16, "nullable": true },
              { "name": "Age", "data_type": "Integer", "nullable": true },
              { "name": "Mentor", "data_type": "Long", "references": "Person",
                "nullable": true, "on_delete": "Nullify" }
          ]}] },
        { "name": "Employee", "inherits_from": "Person", "subclass_selector_value": "Employee",
          "tables": [{ "name": "employees", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Salary", "data_type": "Decimal", "nullable": true }
          ]}] },
        { "name": "Manager", "inherits_from": "Employee", "subclass_selector_value": "manager",
          "tables": [{ "name": "managers", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Budget", "data_type": "Long" }
          ]}] },
        { "name": "Department", "cached": true,
          "tables": [{ "name": "departments", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Title", "data_type": "String", "size": 40 },
              { "name": "Head", "data_type": "Long", "references": "Person",
                "on_delete": "Cascade" }
          ]}] },
        { "name": "OrderLine",
          "tables": [{ "name": "order_lines", "fields": [
              { "name": "OrderId", "data_type": "Long", "primary_key": true },
              { "name": "Line", "data_type": "Integer", "primary_key": true },
              { "name": "Qty", "data_type": "Integer" }
          ]}] }
    ]
}"#;

/// Authors own books; books and tags meet through the BookTags relation.
pub const LIBRARY_JSON: &str = r#"{
    "classes": [
        { "name": "Author", "cached": true, "cache_collections": true,
          "collections_one_to_many": [
              { "name": "Books", "class": "Book", "foreign_field": "Author", "cache": true }
          ],
          "tables": [{ "name": "authors", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Name", "data_type": "String", "size": 40 }
          ]}] },
        { "name": "Book",
          "collections_many_to_many": [
              { "name": "Tags", "relation": "BookTags", "foreign_field": "Book" }
          ],
          "tables": [{ "name": "books", "fields": [
              { "name": "Id", "data_type": "Long", "primary_key": true },
              { "name": "Title", "data_type": "String", "size": 80 },
              { "name": "Author", "data_type": "Long", "references": "Author",
                "on_delete": "Cascade" }
          ]}] },
        { "name": "Tag",
          "collections_many_to_many": [
              { "name": "Books", "relation": "BookTags", "foreign_field": "Tag" }
          ],
          "tables": [{ "name": "tags", "fields": [
              { "name": "Code", "data_type": "String", "size": 8, "primary_key": true }
          ]}] }
    ],
    "relations": [
        { "name": "BookTags", "table": { "name": "book_tags", "fields": [
            { "name": "Book", "data_type": "Long", "references": "Book" },
            { "name": "Tag", "data_type": "String", "size": 8, "references": "Tag" }
        ]}}
    ]
}"#;

pub fn schema(json: &str) -> Arc<SchemaInfo> {
    let def = SchemaDef::from_json_str(json).expect("fixture schema should parse");
    Arc::new(SchemaInfo::resolve(def).expect("fixture schema should resolve"))
}

pub fn company() -> Arc<SchemaInfo> {
    schema(COMPANY_JSON)
}

pub fn library() -> Arc<SchemaInfo> {
    schema(LIBRARY_JSON)
}
