//! Platform authentication
//!
//! Handles the OAuth token returned by an auth-key login (or stored by the
//! Encore CLI) and refreshes it shortly before it expires.

use super::http::PlatformHttpClient;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Refresh tokens this many seconds before they actually expire
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// OAuth2 token as exchanged with the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Zero or missing means the token does not expire
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|t| t.timestamp() > 0)
    }

    /// True if the token expires within the refresh buffer
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .is_some_and(|expiry| expiry - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) <= now)
    }
}

/// Login result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthData {
    pub token: OAuthToken,
    /// The ID of the user or app that authorized the token
    #[serde(default)]
    pub actor: String,
    /// Empty when logged in as an app
    #[serde(default)]
    pub email: String,
    /// Empty when logged in as a user
    #[serde(default)]
    pub app_slug: String,
}

/// Token endpoint reply
#[derive(Debug, Deserialize)]
struct RefreshReply {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Platform credentials with token refresh
#[derive(Clone)]
pub struct Credentials {
    http: PlatformHttpClient,
    refresh_url: String,
    token: Arc<RwLock<OAuthToken>>,
}

impl Credentials {
    pub fn new(http: PlatformHttpClient, base_url: &str, token: OAuthToken) -> Self {
        Self {
            http,
            refresh_url: format!("{}/login/oauth:refresh-token", base_url.trim_end_matches('/')),
            token: Arc::new(RwLock::new(token)),
        }
    }

    /// Get an access token for API calls, refreshing it first if it is about to expire
    pub async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if !token.needs_refresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock
        if !token.needs_refresh(Utc::now()) {
            return Ok(token.access_token.clone());
        }
        if token.refresh_token.is_empty() {
            tracing::warn!("Access token expired and no refresh token is available");
            return Ok(token.access_token.clone());
        }

        tracing::debug!("Access token about to expire, refreshing");
        let reply: RefreshReply = self
            .http
            .post_form(
                &self.refresh_url,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.refresh_token.as_str()),
                ],
            )
            .await
            .context("Failed to refresh access token")?;

        token.access_token = reply.access_token;
        if !reply.token_type.is_empty() {
            token.token_type = reply.token_type;
        }
        if !reply.refresh_token.is_empty() {
            token.refresh_token = reply.refresh_token;
        }
        token.expiry = reply
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        tracing::debug!("Access token refreshed, expires at {:?}", token.expiry);
        Ok(token.access_token.clone())
    }
}

/// Credentials file written by `encore auth login`
#[derive(Debug, Deserialize)]
struct CliCredentials {
    #[serde(flatten)]
    token: OAuthToken,
    #[serde(default)]
    actor: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    app_slug: String,
}

/// Get the Encore CLI configuration directory
pub fn get_encore_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ENCORE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("encore"))
}

/// Read the credentials of the local Encore CLI, if logged in
pub fn load_cli_credentials() -> Result<Option<OAuthData>> {
    let Some(dir) = get_encore_config_dir() else {
        return Ok(None);
    };
    let path = dir.join(".auth_token");
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_cli_credentials(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
        .map(Some)
}

fn parse_cli_credentials(content: &str) -> Result<OAuthData> {
    let creds: CliCredentials = serde_json::from_str(content)?;
    Ok(OAuthData {
        token: creds.token,
        actor: creds.actor,
        email: creds.email,
        app_slug: creds.app_slug,
    })
}
