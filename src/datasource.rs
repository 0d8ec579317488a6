//! Data sources
//!
//! Each data source exposes one kind of need: its schema is the satisfier
//! schema restricted to the variants that can satisfy that kind, plus the
//! `name` / `env` lookup attributes.

use crate::error::{MapError, ReadError};
use crate::extract::{Extractor, Value, ValueTree};
use crate::needs::{NeedsCache, NeedsClient, TypeRef};
use crate::schema::{Attribute, AttributeTree, Mode, SchemaBuilder};
use crate::shape::{registry, SATISFIER};
use serde::{Deserialize, Serialize};

/// Provider prefix of data source type names
pub const PROVIDER: &str = "encore";

/// Schema of a data source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub description: String,
    pub attributes: AttributeTree,
}

/// Lookup attributes of a read
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadConfig {
    pub name: String,
    #[serde(default)]
    pub env: Option<String>,
}

impl ReadConfig {
    pub fn new(name: impl Into<String>, env: Option<&str>) -> Self {
        Self {
            name: name.into(),
            env: env.map(str::to_string),
        }
    }
}

/// A read-only view of one kind of need
#[derive(Debug, Clone)]
pub struct DataSource {
    name: &'static str,
    type_ref: TypeRef,
    variants: &'static [&'static str],
    schema: Schema,
}

impl DataSource {
    /// Build a data source; fails if the satisfier variants do not map
    pub fn new(
        name: &'static str,
        type_ref: &str,
        description: &str,
        variants: &'static [&'static str],
    ) -> Result<Self, MapError> {
        let mut attributes = SchemaBuilder::new(registry()).build(SATISFIER, Some(variants))?;
        attributes.insert(
            "name".to_string(),
            Attribute::string(Mode::Required, "The name of the Encore resource"),
        );
        attributes.insert(
            "env".to_string(),
            Attribute::string(
                Mode::Optional,
                "The environment of the Encore resource. Defaults to the provider environment",
            ),
        );

        Ok(Self {
            name,
            type_ref: TypeRef::new(type_ref),
            variants,
            schema: Schema {
                description: description.to_string(),
                attributes,
            },
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Full type name, e.g. `encore_pubsub_topic`
    pub fn type_name(&self, provider: &str) -> String {
        format!("{}_{}", provider, self.name)
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Satisfier variants this data source accepts
    pub fn variants(&self) -> &[&'static str] {
        self.variants
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read the state of one resource.
    ///
    /// The state always holds `name` and the resolved `env`; the satisfier
    /// values are added when the resource exists and is provisioned.
    pub async fn read<C: NeedsClient>(
        &self,
        cache: &NeedsCache<C>,
        config: &ReadConfig,
    ) -> Result<ValueTree, ReadError> {
        let env = cache.resolve_env(config.env.as_deref());

        let mut state = ValueTree::new();
        state.insert("name".to_string(), Value::String(config.name.clone()));
        state.insert("env".to_string(), Value::String(env.to_string()));

        let Some(need) = cache.get(&self.type_ref, env, &config.name).await? else {
            tracing::debug!("No {} named {} in {}", self.type_ref, config.name, env);
            return Ok(state);
        };
        let Some(satisfier) = &need.satisfier else {
            return Ok(state);
        };

        let payload = satisfier.project(self.variants)?;
        let values = Extractor::new(registry()).extract(SATISFIER, payload, Some(&[satisfier.kind()]))?;
        state.extend(values);
        Ok(state)
    }
}

pub fn pubsub_topic() -> Result<DataSource, MapError> {
    DataSource::new(
        "pubsub_topic",
        "need.Topic",
        "Encore provisioned Pub/Sub topic information",
        &["GCPPubSubTopic", "AWSSNSTopic"],
    )
}

pub fn pubsub_subscription() -> Result<DataSource, MapError> {
    DataSource::new(
        "pubsub_subscription",
        "need.Subscription",
        "Encore provisioned Pub/Sub Subscription information",
        &["AWSSNSSubscription", "GCPPubSubSubscription"],
    )
}

pub fn sql_database() -> Result<DataSource, MapError> {
    DataSource::new(
        "sql_database",
        "need.Database",
        "Encore provisioned database information",
        &["SQLDatabase"],
    )
}

pub fn cache() -> Result<DataSource, MapError> {
    DataSource::new(
        "cache",
        "need.CacheKeyspace",
        "Encore provisioned cache information",
        &["RedisKeyspace"],
    )
}

pub fn service() -> Result<DataSource, MapError> {
    DataSource::new(
        "service",
        "need.Service",
        "Encore provisioned service information",
        &["Service"],
    )
}

pub fn gateway() -> Result<DataSource, MapError> {
    DataSource::new(
        "gateway",
        "need.Gateway",
        "Encore provisioned gateway information",
        &["Gateway"],
    )
}

/// All data sources
pub fn data_sources() -> Result<Vec<DataSource>, MapError> {
    let constructors: [fn() -> Result<DataSource, MapError>; 6] = [
        pubsub_topic,
        pubsub_subscription,
        sql_database,
        cache,
        service,
        gateway,
    ];
    constructors.into_iter().map(|new| new()).collect()
}

/// Find a data source by short or full type name
pub fn find<'a>(sources: &'a [DataSource], name: &str) -> Option<&'a DataSource> {
    sources
        .iter()
        .find(|ds| ds.name == name || ds.type_name(PROVIDER) == name)
}

/// Type refs the needs cache should query for
pub fn registered_types(sources: &[DataSource]) -> Vec<TypeRef> {
    sources.iter().map(|ds| ds.type_ref.clone()).collect()
}
