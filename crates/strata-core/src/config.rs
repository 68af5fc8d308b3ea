//! Runtime configuration, loaded from TOML.

use crate::error::InternalError;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};

///
/// StrataConfig
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    pub transaction: TransactionOptions,
    pub cache: CacheConfig,
    pub data_sources: BTreeMap<String, DataSourceConfig>,
}

impl StrataConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, InternalError> {
        toml::from_str(text).map_err(|err| InternalError::config(format!("invalid config: {err}")))
    }
}

///
/// IsolationLevel
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

///
/// ReferenceMode
///
/// `Weak` lets clean objects be released from a transaction and rehydrated
/// on next access; `Strong` keeps every object live until the transaction
/// ends.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    #[default]
    Weak,
    Strong,
}

///
/// TransactionOptions
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub reference_mode: ReferenceMode,

    /// Release clean objects once this many are live (weak mode only).
    pub max_live_objects: Option<usize>,

    pub use_cache: bool,

    /// Skip old-value fetches and field hooks on writes.
    pub disable_triggers: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::default(),
            reference_mode: ReferenceMode::default(),
            max_live_objects: None,
            use_cache: true,
            disable_triggers: false,
        }
    }
}

impl TransactionOptions {
    #[must_use]
    pub const fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    #[must_use]
    pub const fn reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.reference_mode = mode;
        self
    }

    #[must_use]
    pub const fn max_live_objects(mut self, max: usize) -> Self {
        self.max_live_objects = Some(max);
        self
    }

    #[must_use]
    pub const fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    #[must_use]
    pub const fn disable_triggers(mut self, disabled: bool) -> Self {
        self.disable_triggers = disabled;
        self
    }
}

///
/// CacheConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub expiration_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiration_secs: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn expiration(&self) -> Option<Duration> {
        self.expiration_secs.map(Duration::from_secs)
    }
}

///
/// DataSourceConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSourceConfig {
    pub kind: String,
    pub connection_string: Option<String>,

    /// Overrides the transaction-wide isolation level for this source.
    pub isolation_level: Option<IsolationLevel>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            connection_string: None,
            isolation_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StrataConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config.transaction, TransactionOptions::default());
        assert!(config.transaction.use_cache);
        assert!(config.cache.enabled);
        assert!(config.data_sources.is_empty());
    }

    #[test]
    fn full_document_parses() {
        let config = StrataConfig::from_toml_str(
            r#"
            [transaction]
            isolation_level = "serializable"
            reference_mode = "strong"
            max_live_objects = 500
            disable_triggers = true

            [cache]
            expiration_secs = 30

            [data_sources.default]
            kind = "memory"

            [data_sources.archive]
            kind = "sql"
            connection_string = "postgres://localhost/archive"
            isolation_level = "snapshot"
            "#,
        )
        .expect("config should parse");

        assert_eq!(
            config.transaction.isolation_level,
            IsolationLevel::Serializable
        );
        assert_eq!(config.transaction.reference_mode, ReferenceMode::Strong);
        assert_eq!(config.transaction.max_live_objects, Some(500));
        assert_eq!(config.cache.expiration(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.data_sources["archive"].isolation_level,
            Some(IsolationLevel::Snapshot)
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StrataConfig::from_toml_str("[transaction]\nisolation = \"serializable\"\n")
            .expect_err("unknown key should be rejected");

        assert_eq!(err.origin, crate::error::ErrorOrigin::Config);
    }

    #[test]
    fn builder_setters_chain() {
        let options = TransactionOptions::default()
            .reference_mode(ReferenceMode::Strong)
            .use_cache(false)
            .max_live_objects(10);

        assert_eq!(options.reference_mode, ReferenceMode::Strong);
        assert!(!options.use_cache);
        assert_eq!(options.max_live_objects, Some(10));
    }
}
