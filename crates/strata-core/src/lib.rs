//! Core runtime for Strata: values and keys, the per-transaction identity
//! map, lazy table loading, the commit engine, hooks, caching and the
//! data-source contract.

// public exports are one module level down
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod object;
pub mod obs;
pub mod runtime;
pub mod source;
pub mod transaction;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Vocabulary for application code. Cache, data-source and metrics
/// plumbing stays in its own module.
///

pub mod prelude {
    pub use crate::{
        config::{IsolationLevel, ReferenceMode, TransactionOptions},
        error::InternalError,
        filter::{Condition, OrderBy},
        hooks::{ClassFactory, Entity, FieldHooks, ObjectHooks},
        object::{ObjectHandle, ObjectState},
        runtime::Database,
        transaction::Transaction,
        value::{PrimaryKey, Value},
    };
}
