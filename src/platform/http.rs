//! HTTP utilities for Encore platform calls

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((end, _)) => format!("{}... [truncated, {} bytes total]", &body[..end], body.len()),
        None => body.to_string(),
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Operating system name as the platform expects it
pub fn goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        os => os,
    }
}

/// CPU architecture name as the platform expects it
pub fn goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        arch => arch,
    }
}

/// Error reported by the platform in a response envelope
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("http {status}: code={code}{}", detail_suffix(.detail))]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub detail: Option<Value>,
}

fn detail_suffix(detail: &Option<Value>) -> String {
    detail.as_ref().map(|d| format!(" detail={}", d)).unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    detail: Option<Value>,
}

/// `{ok, error, data}` wrapper around every non-GraphQL response
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default, alias = "OK")]
    ok: bool,
    #[serde(default, alias = "Error")]
    error: Option<ErrorBody>,
    #[serde(default, alias = "Data")]
    data: Value,
}

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

/// HTTP client wrapper for platform API calls
#[derive(Clone)]
pub struct PlatformHttpClient {
    client: Client,
}

impl PlatformHttpClient {
    /// Create a new HTTP client identifying as the given version
    pub fn new(version: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-encore-version",
            HeaderValue::from_str(version).context("Invalid version header")?,
        );
        headers.insert("x-encore-goos", HeaderValue::from_static(goos()));
        headers.insert("x-encore-goarch", HeaderValue::from_static(goarch()));

        let client = Client::builder()
            .user_agent(format!("EncoreTF/{}", version))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// POST a JSON body to an envelope endpoint and decode its `data`
    pub async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &impl Serialize,
        token: Option<&str>,
    ) -> Result<T> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = read_body(response).await?;

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Undecodable response: {} - {}", status, sanitize_for_log(&body));
            anyhow::anyhow!("decode response: {}", e)
        })?;

        if !envelope.ok {
            let error = envelope.error.unwrap_or_default();
            tracing::error!("API error: {} - code={}", status, error.code);
            return Err(ApiError {
                status: status.as_u16(),
                code: error.code,
                detail: error.detail,
            }
            .into());
        }

        serde_json::from_value(envelope.data).context("decode response data")
    }

    /// POST a form to an OAuth endpoint and decode the JSON reply
    pub async fn post_form<T: DeserializeOwned>(&self, url: &str, form: &[(&str, &str)]) -> Result<T> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }

    /// POST a GraphQL document and return the raw response
    pub async fn graphql(&self, url: &str, token: Option<&str>, query: &str, variables: &Value) -> Result<Value> {
        tracing::debug!("POST {} (graphql)", url);

        let mut request = self.client.post(url).json(&GraphQLRequest { query, variables });
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = read_body(response).await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }
}

async fn read_body(response: Response) -> Result<String> {
    response.text().await.context("Failed to read response body")
}

/// Format a platform error for display
pub fn format_platform_error(error: &anyhow::Error) -> String {
    if let Some(api) = error.downcast_ref::<ApiError>() {
        return match api.status {
            401 => "Authentication failed. Check the auth key or run 'encore auth login'.".to_string(),
            403 => "Permission denied for this application.".to_string(),
            404 => "Not found. Check the application id.".to_string(),
            _ => api.to_string(),
        };
    }

    let error_str = format!("{:#}", error);
    if error_str.contains("401") {
        return "Authentication failed. Check the auth key or run 'encore auth login'.".to_string();
    }
    if error_str.contains("429") {
        return "Rate limit exceeded. Please try again later.".to_string();
    }
    if error_str.contains("500") || error_str.contains("503") {
        return "Encore platform temporarily unavailable. Please try again.".to_string();
    }

    let sanitized = error_str
        .chars()
        .filter(|c| !c.is_control())
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
