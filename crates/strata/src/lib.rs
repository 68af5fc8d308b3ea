//! ## Crate layout
//! - `core`: values, transactions, hooks, caching and the data-source contract.
//! - `schema`: schema definitions, the resolved metadata graph and resolution.
//! - `error`: the public error type every facade entry point returns.
//! - `loader`: schema documents from JSON or TOML text and files.
//!
//! The `prelude` module mirrors what application code touches day to day.

pub use strata_core as core;
pub use strata_schema as schema;

pub mod error;
pub mod loader;

pub use error::{Error, ErrorKind, ErrorOrigin};
pub use loader::{SchemaFormat, SchemaLoader};

use std::sync::Arc;
use strata_core::{config::StrataConfig, runtime::DatabaseBuilder};
use strata_schema::node::SchemaInfo;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// open
///
/// Builder for a database whose sources, cache and transaction defaults
/// come from TOML configuration text. Callers add class factories and
/// non-memory sources before `build`.
///

pub fn open(schema: Arc<SchemaInfo>, config: &str) -> Result<DatabaseBuilder, Error> {
    let config = StrataConfig::from_toml_str(config)?;
    let builder = DatabaseBuilder::from_config(schema, &config)?;
    tracing::info!(sources = config.data_sources.len(), "configuration loaded");

    Ok(builder)
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Error, ErrorKind, SchemaLoader,
        core::prelude::*,
        schema::{def::SchemaDef, node::SchemaInfo},
    };
}
