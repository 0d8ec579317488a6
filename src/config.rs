//! Configuration Management
//!
//! Handles persistent configuration storage for encore-needs.

use crate::needs::PRIMARY_ENV;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default platform API endpoint
pub const DEFAULT_API_URL: &str = "https://api.encore.dev";

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Auth key used to log in to the platform. Falls back to the Encore CLI login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    /// Application id, overrides the app of the auth key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Default environment for lookups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Platform API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("encore-needs").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Apply `ENCORE_*` environment variables on top of the file values
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup; empty values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get("ENCORE_AUTH_KEY") {
            self.auth_key = Some(v);
        }
        if let Some(v) = get("ENCORE_APP_ID") {
            self.app_id = Some(v);
        }
        if let Some(v) = get("ENCORE_ENV") {
            self.env = Some(v);
        }
        if let Some(v) = get("ENCORE_API_URL") {
            self.api_url = Some(v);
        }
        self
    }

    /// Overlay another configuration; its set values win
    pub fn merge(mut self, other: Config) -> Self {
        self.auth_key = other.auth_key.or(self.auth_key);
        self.app_id = other.app_id.or(self.app_id);
        self.env = other.env.or(self.env);
        self.api_url = other.api_url.or(self.api_url);
        self
    }

    /// Get effective API endpoint (config > default)
    pub fn effective_api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Get effective default environment (config > primary)
    pub fn effective_env(&self) -> String {
        self.env
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| PRIMARY_ENV.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_api_url(), DEFAULT_API_URL);
        assert_eq!(config.effective_env(), "@primary");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [("ENCORE_ENV", "staging"), ("ENCORE_APP_ID", "")].into();
        let config = Config {
            env: Some("prod".to_string()),
            app_id: Some("my-app".to_string()),
            ..Default::default()
        }
        .with_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.effective_env(), "staging");
        assert_eq!(config.app_id.as_deref(), Some("my-app"));
    }

    #[test]
    fn test_merge_prefers_other() {
        let file = Config {
            env: Some("prod".to_string()),
            api_url: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        let cli = Config {
            env: Some("dev".to_string()),
            ..Default::default()
        };
        let config = file.merge(cli);
        assert_eq!(config.effective_env(), "dev");
        assert_eq!(config.effective_api_url(), "http://localhost:9000");
    }

    #[test]
    fn test_round_trip_skips_unset() {
        let config = Config {
            app_id: Some("my-app".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"app_id":"my-app"}"#);
        assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
    }
}
