//! Database handle: the resolved schema plus every shared collaborator a
//! transaction needs.

use crate::{
    cache::{InMemoryCache, NoCache, ObjectCache},
    config::{StrataConfig, TransactionOptions},
    error::InternalError,
    hooks::{ClassFactory, FactoryRegistry, HookTable},
    obs::{GlobalMetricsSink, MetricsSink},
    source::{DataSourceFactory, DataSourceRegistry, KeyGenerator, SequenceKeyGenerator},
    transaction::Transaction,
};
use std::{fmt, sync::Arc};
use strata_schema::node::SchemaInfo;

///
/// Runtime
///
/// Shared, immutable state behind a `Database`.
///

pub(crate) struct Runtime {
    pub schema: Arc<SchemaInfo>,
    pub hooks: HookTable,
    pub sources: DataSourceRegistry,
    pub cache: Arc<dyn ObjectCache>,
    pub key_generator: Arc<dyn KeyGenerator>,
    pub metrics: Arc<dyn MetricsSink>,
}

///
/// Database
///

#[derive(Clone)]
pub struct Database {
    runtime: Arc<Runtime>,
    options: TransactionOptions,
}

impl Database {
    #[must_use]
    pub fn builder(schema: Arc<SchemaInfo>) -> DatabaseBuilder {
        DatabaseBuilder::new(schema)
    }

    /// Start a transaction with the database's default options.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        self.begin_with(self.options.clone())
    }

    #[must_use]
    pub fn begin_with(&self, options: TransactionOptions) -> Transaction {
        Transaction::new(Arc::clone(&self.runtime), options)
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaInfo> {
        &self.runtime.schema
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ObjectCache> {
        &self.runtime.cache
    }

    #[must_use]
    pub const fn options(&self) -> &TransactionOptions {
        &self.options
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("classes", &self.runtime.schema.classes.len())
            .field("sources", &self.runtime.sources)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

///
/// DatabaseBuilder
///

pub struct DatabaseBuilder {
    schema: Arc<SchemaInfo>,
    factories: FactoryRegistry,
    sources: DataSourceRegistry,
    cache: Option<Arc<dyn ObjectCache>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    options: TransactionOptions,
}

impl DatabaseBuilder {
    #[must_use]
    pub fn new(schema: Arc<SchemaInfo>) -> Self {
        Self {
            schema,
            factories: FactoryRegistry::new(),
            sources: DataSourceRegistry::new(),
            cache: None,
            key_generator: None,
            metrics: None,
            options: TransactionOptions::default(),
        }
    }

    /// Builder seeded from a loaded configuration: transaction defaults,
    /// cache settings and every configured data source.
    pub fn from_config(
        schema: Arc<SchemaInfo>,
        config: &StrataConfig,
    ) -> Result<Self, InternalError> {
        let cache: Arc<dyn ObjectCache> = if config.cache.enabled {
            Arc::new(InMemoryCache::with_expiration(config.cache.expiration()))
        } else {
            Arc::new(NoCache)
        };

        Ok(Self {
            sources: DataSourceRegistry::from_config(&config.data_sources)?,
            cache: Some(cache),
            options: config.transaction.clone(),
            ..Self::new(schema)
        })
    }

    #[must_use]
    pub fn factory(mut self, factory: ClassFactory) -> Self {
        self.factories.register(factory);
        self
    }

    #[must_use]
    pub fn data_source(
        mut self,
        name: impl Into<String>,
        factory: impl DataSourceFactory + 'static,
    ) -> Self {
        self.sources.register(name, factory);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ObjectCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub fn options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve hooks against the schema and check that every data source
    /// the schema names has a factory.
    pub fn build(self) -> Result<Database, InternalError> {
        let class_sources = self.schema.classes.iter().map(|c| (&c.name, &c.data_source));
        let relation_sources = self
            .schema
            .relations
            .iter()
            .map(|r| (&r.name, &r.data_source));
        for (owner, source) in class_sources.chain(relation_sources) {
            if !self.sources.contains(source) {
                return Err(InternalError::config(format!(
                    "'{owner}' uses data source '{source}', which is not registered"
                )));
            }
        }

        let hooks = self.factories.resolve(&self.schema)?;
        tracing::debug!(
            classes = self.schema.classes.len(),
            relations = self.schema.relations.len(),
            "database built"
        );

        let runtime = Runtime {
            schema: self.schema,
            hooks,
            sources: self.sources,
            cache: self.cache.unwrap_or_else(|| Arc::new(InMemoryCache::new())),
            key_generator: self
                .key_generator
                .unwrap_or_else(|| Arc::new(SequenceKeyGenerator::new())),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(GlobalMetricsSink)),
        };

        Ok(Database {
            runtime: Arc::new(runtime),
            options: self.options,
        })
    }
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("factories", &self.factories)
            .field("sources", &self.sources)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
