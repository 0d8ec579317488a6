//! Platform Client
//!
//! Main client for the Encore platform API, combining authentication and
//! HTTP functionality. Answers needs queries for the needs cache.

use super::auth::{load_cli_credentials, Credentials, OAuthData};
use super::http::PlatformHttpClient;
use super::query::needs_query;
use crate::config::Config;
use crate::error::QueryError;
use crate::needs::{Need, NeedsClient, TypeRef};
use crate::shape::registry;
use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Message the platform uses for an unknown environment
const ENV_NOT_FOUND: &str = "env not found";

#[derive(Serialize)]
struct AuthKeyRequest<'a> {
    auth_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct NeedsData {
    app: AppNode,
}

#[derive(Debug, Deserialize)]
struct AppNode {
    env: EnvNode,
}

#[derive(Debug, Deserialize)]
struct EnvNode {
    #[serde(default)]
    needs: Vec<Need>,
}

/// Main platform client
#[derive(Clone)]
pub struct PlatformClient {
    http: PlatformHttpClient,
    base_url: String,
    app_slug: String,
    credentials: Option<Credentials>,
}

impl PlatformClient {
    /// Create an unauthenticated client
    pub fn new(base_url: &str, version: &str) -> Result<Self> {
        Ok(Self {
            http: PlatformHttpClient::new(version)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_slug: String::new(),
            credentials: None,
        })
    }

    /// Create a client from configuration, logging in with the auth key or
    /// the Encore CLI credentials
    pub async fn connect(config: &Config, version: &str) -> Result<Self> {
        let mut client = Self::new(&config.effective_api_url(), version)?;

        match config.auth_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => client
                .auth(key)
                .await
                .context("Failed to log in with the auth key")?,
            None => {
                let data = load_cli_credentials()?.ok_or_else(|| {
                    anyhow!("No auth key configured and no Encore CLI login found. Set ENCORE_AUTH_KEY or run 'encore auth login'")
                })?;
                tracing::info!("Using Encore CLI credentials");
                client.set_oauth(data);
            }
        }

        if let Some(app_id) = config.app_id.as_deref().filter(|a| !a.is_empty()) {
            client.app_slug = app_id.to_string();
        }
        if client.app_slug.is_empty() {
            bail!("No application configured. Set ENCORE_APP_ID or use --app-id");
        }

        tracing::info!("Connected to {} for app {}", client.base_url, client.app_slug);
        Ok(client)
    }

    /// Log in with an auth key
    pub async fn auth(&mut self, auth_key: &str) -> Result<()> {
        let data: OAuthData = self
            .http
            .call(&self.url("/login/auth-key"), &AuthKeyRequest { auth_key }, None)
            .await?;
        tracing::debug!("Logged in as {}", data.actor);
        self.set_oauth(data);
        Ok(())
    }

    fn set_oauth(&mut self, data: OAuthData) {
        self.app_slug = data.app_slug;
        self.credentials = Some(Credentials::new(self.http.clone(), &self.base_url, data.token));
    }

    pub fn app_slug(&self) -> &str {
        &self.app_slug
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run a GraphQL query and decode its `data`
    pub async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: &Value) -> Result<T> {
        let token = match &self.credentials {
            Some(creds) => Some(creds.access_token().await?),
            None => None,
        };

        let raw = self
            .http
            .graphql(&self.url("/graphql"), token.as_deref(), query, variables)
            .await?;
        let response: GraphQLResponse =
            serde_json::from_value(raw).context("Failed to parse GraphQL response")?;

        if !response.errors.is_empty() {
            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            bail!("graphql: {}", messages.join("; "));
        }

        let data = response.data.ok_or_else(|| anyhow!("graphql: response has no data"))?;
        serde_json::from_value(data).context("Failed to decode GraphQL data")
    }
}

impl NeedsClient for PlatformClient {
    async fn query_needs(&self, env: &str, types: &[TypeRef]) -> Result<Vec<Need>, QueryError> {
        let query = needs_query(registry()).map_err(|e| QueryError::Other(e.to_string()))?;
        let variables = json!({
            "appSlug": self.app_slug,
            "envName": env,
            "types": types,
        });

        match self.graphql::<NeedsData>(&query, &variables).await {
            Ok(data) => Ok(data.app.env.needs),
            Err(e) => {
                let msg = format!("{:#}", e);
                if msg.contains(ENV_NOT_FOUND) {
                    Err(QueryError::EnvNotFound)
                } else {
                    Err(QueryError::Other(msg))
                }
            }
        }
    }
}
