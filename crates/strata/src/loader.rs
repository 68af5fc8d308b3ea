//! Schema documents from text or files, merged and resolved in one step.

use crate::Error;
use std::{fs, path::Path, sync::Arc};
use strata_schema::{SchemaError, def::SchemaDef, node::SchemaInfo};

///
/// SchemaFormat
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemaFormat {
    Json,
    Toml,
}

impl SchemaFormat {
    /// Format implied by a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

///
/// SchemaLoader
///
/// Collects schema documents; later documents are included into the
/// first. Resolution happens once, in `resolve`.
///

#[derive(Debug, Default)]
pub struct SchemaLoader {
    def: Option<SchemaDef>,
}

impl SchemaLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, format: SchemaFormat, text: &str) -> Result<Self, Error> {
        let def = match format {
            SchemaFormat::Json => SchemaDef::from_json_str(text)?,
            SchemaFormat::Toml => SchemaDef::from_toml_str(text)?,
        };
        self.add(def);

        Ok(self)
    }

    pub fn file(self, path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let format = SchemaFormat::from_path(path).ok_or_else(|| {
            SchemaError::decode(format!("unknown schema format: {}", path.display()))
        })?;
        let text = fs::read_to_string(path)
            .map_err(|err| SchemaError::decode(format!("{}: {err}", path.display())))?;
        tracing::debug!(path = %path.display(), "schema document read");

        self.text(format, &text)
    }

    #[must_use]
    pub fn def(mut self, def: SchemaDef) -> Self {
        self.add(def);
        self
    }

    pub fn resolve(self) -> Result<Arc<SchemaInfo>, Error> {
        let schema = SchemaInfo::resolve(self.def.unwrap_or_default())?;

        Ok(Arc::new(schema))
    }

    fn add(&mut self, def: SchemaDef) {
        match &mut self.def {
            Some(existing) => existing.include(def),
            None => self.def = Some(def),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = r#"{
        "classes": [
            { "name": "Person", "tables": [{ "name": "people", "fields": [
                { "name": "Id", "data_type": "Long", "primary_key": true }
            ]}] }
        ]
    }"#;

    const PETS: &str = r#"
        [[classes]]
        name = "Pet"

        [[classes.tables]]
        name = "pets"

        [[classes.tables.fields]]
        name = "Id"
        data_type = "Long"
        primary_key = true

        [[classes.tables.fields]]
        name = "Owner"
        data_type = "Long"
        references = "Person"
    "#;

    #[test]
    fn documents_in_different_formats_resolve_together() {
        let schema = SchemaLoader::new()
            .text(SchemaFormat::Json, PEOPLE)
            .expect("json should parse")
            .text(SchemaFormat::Toml, PETS)
            .expect("toml should parse")
            .resolve()
            .expect("merged schema should resolve");

        let person = schema.class("Person").expect("Person should exist");
        assert_eq!(person.outer_references.len(), 1);
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = SchemaLoader::new()
            .file("schema.xml")
            .expect_err("xml is not a supported format");

        assert_eq!(err.kind, crate::ErrorKind::Schema);
    }
}
