//! Needs Cache
//!
//! Fetches every need of an environment in one query and serves lookups by
//! (type ref, name) from the resulting index. Each environment is fetched at
//! most once; concurrent lookups for the same environment wait on the same
//! query, and a failed query leaves the environment unfetched so the next
//! lookup tries again.

use crate::error::{LookupError, MapError, QueryError};
use crate::extract::TYPENAME;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Environment used when neither the lookup nor the cache names one
pub const PRIMARY_ENV: &str = "@primary";

/// Identifier of a resource kind, e.g. `need.Topic`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(String);

impl TypeRef {
    pub fn new(type_ref: impl Into<String>) -> Self {
        Self(type_ref.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A provisioned resource as returned by the platform
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Need {
    pub id: String,
    pub type_ref: TypeRef,
    pub encore_name: String,
    #[serde(default)]
    pub satisfier: Option<Satisfier>,
}

/// The infrastructure satisfying a need: one variant of the satisfier union
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Json")]
pub struct Satisfier {
    kind: String,
    payload: Json,
}

impl Satisfier {
    /// The `__typename` of the variant
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Project the satisfier into one of the given variants
    pub fn project(&self, variants: &[&str]) -> Result<&Json, MapError> {
        if variants.contains(&self.kind.as_str()) {
            Ok(&self.payload)
        } else {
            Err(MapError::WrongVariantRequested {
                requested: variants.join("|"),
                actual: self.kind.clone(),
            })
        }
    }
}

impl TryFrom<Json> for Satisfier {
    type Error = String;

    fn try_from(payload: Json) -> Result<Self, Self::Error> {
        let kind = payload
            .get(TYPENAME)
            .and_then(Json::as_str)
            .ok_or_else(|| format!("satisfier has no {}", TYPENAME))?
            .to_string();
        Ok(Self { kind, payload })
    }
}

/// Remote source of needs
pub trait NeedsClient: Send + Sync {
    /// Fetch every need of `env` whose type ref is in `types`
    fn query_needs(
        &self,
        env: &str,
        types: &[TypeRef],
    ) -> impl Future<Output = Result<Vec<Need>, QueryError>> + Send;
}

/// Needs of one environment, by type ref then name
type EnvIndex = HashMap<TypeRef, HashMap<String, Arc<Need>>>;

/// Per-environment, populate-once index of needs.
///
/// Concurrent first lookups of an environment share one query. If that query
/// fails, every waiting lookup runs its own query in turn until one succeeds
/// or all have failed. An environment whose fetch failed keeps no entry once
/// no lookup is waiting on it, so the next lookup starts over.
pub struct NeedsCache<C> {
    client: C,
    default_env: String,
    types: Vec<TypeRef>,
    envs: RwLock<HashMap<String, Arc<OnceCell<Arc<EnvIndex>>>>>,
}

impl<C: NeedsClient> NeedsCache<C> {
    /// Create a cache querying `types` for every environment.
    ///
    /// An empty `default_env` means [`PRIMARY_ENV`].
    pub fn new(client: C, default_env: impl Into<String>, types: Vec<TypeRef>) -> Self {
        let default_env = default_env.into();
        let default_env = if default_env.is_empty() {
            PRIMARY_ENV.to_string()
        } else {
            default_env
        };

        Self {
            client,
            default_env,
            types,
            envs: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn default_env(&self) -> &str {
        &self.default_env
    }

    /// The environment a lookup applies to
    pub fn resolve_env<'a>(&'a self, env: Option<&'a str>) -> &'a str {
        match env {
            Some(env) if !env.is_empty() => env,
            _ => &self.default_env,
        }
    }

    /// Look up a need, fetching the environment on first use.
    ///
    /// `None` if the environment has no need of that type and name.
    pub async fn get(
        &self,
        type_ref: &TypeRef,
        env: &str,
        name: &str,
    ) -> Result<Option<Arc<Need>>, LookupError> {
        let env = self.resolve_env(Some(env));
        let index = self.env_index(env).await?;
        Ok(index.get(type_ref).and_then(|needs| needs.get(name)).cloned())
    }

    /// True once `env` has been fetched successfully
    pub async fn is_populated(&self, env: &str) -> bool {
        let env = self.resolve_env(Some(env));
        self.envs
            .read()
            .await
            .get(env)
            .is_some_and(|cell| cell.initialized())
    }

    async fn env_index(&self, env: &str) -> Result<Arc<EnvIndex>, LookupError> {
        let cell = self.cell(env).await;
        match cell.get_or_try_init(|| self.fetch(env)).await {
            Ok(index) => Ok(Arc::clone(index)),
            Err(err) => {
                self.forget(env, &cell).await;
                Err(err)
            }
        }
    }

    /// Drop a failed environment's cell unless another lookup still waits on it
    async fn forget(&self, env: &str, cell: &Arc<OnceCell<Arc<EnvIndex>>>) {
        let mut envs = self.envs.write().await;
        let unused = envs.get(env).is_some_and(|current| {
            // One reference in the map, one held by the caller
            Arc::ptr_eq(current, cell) && !current.initialized() && Arc::strong_count(cell) == 2
        });
        if unused {
            envs.remove(env);
        }
    }

    async fn cell(&self, env: &str) -> Arc<OnceCell<Arc<EnvIndex>>> {
        if let Some(cell) = self.envs.read().await.get(env) {
            return Arc::clone(cell);
        }
        let mut envs = self.envs.write().await;
        Arc::clone(envs.entry(env.to_string()).or_default())
    }

    async fn fetch(&self, env: &str) -> Result<Arc<EnvIndex>, LookupError> {
        tracing::debug!("Querying {} need types for environment {}", self.types.len(), env);

        let needs = self
            .client
            .query_needs(env, &self.types)
            .await
            .map_err(|e| match e {
                QueryError::EnvNotFound => {
                    tracing::warn!("Environment {} not found", env);
                    LookupError::EnvironmentNotFound {
                        env: env.to_string(),
                    }
                }
                QueryError::Other(msg) => {
                    tracing::error!("Needs query for {} failed: {}", env, msg);
                    LookupError::RemoteQueryFailed(msg)
                }
            })?;

        let count = needs.len();
        let mut index = EnvIndex::new();
        for need in needs {
            index
                .entry(need.type_ref.clone())
                .or_default()
                .insert(need.encore_name.clone(), Arc::new(need));
        }

        tracing::info!("Indexed {} needs for environment {}", count, env);
        Ok(Arc::new(index))
    }
}
