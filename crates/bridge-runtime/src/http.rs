//! Shared HTTP plumbing for the provider adapters.

use std::time::Duration;

use bridge_core::error::{BridgeError, Result};
use reqwest::StatusCode;
use serde::Deserialize;

pub const TIMEOUT_VAR: &str = "PROVIDER_TIMEOUT_SECS";

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Read a required credential from the environment
pub fn credential(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| BridgeError::Config(format!("{var} not set in environment or .env file")))
}

/// Optional endpoint override
pub fn base_url(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Request timeout from `PROVIDER_TIMEOUT_SECS`, if set
pub fn timeout_from_env() -> Result<Option<Duration>> {
    match std::env::var(TIMEOUT_VAR) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| BridgeError::Config(format!("{TIMEOUT_VAR} must be a whole number of seconds, got '{raw}'"))),
        _ => Ok(None),
    }
}

pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))
}

/// Map a failed send to a provider error
pub fn transport_error(err: &reqwest::Error) -> BridgeError {
    if err.is_timeout() {
        BridgeError::ProviderUnavailable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        BridgeError::ProviderUnavailable(format!("connection failed: {err}"))
    } else {
        BridgeError::Provider(err.to_string())
    }
}

/// Map a non-2xx response to a provider error, preferring the API's own message
pub fn status_error(status: StatusCode, body: &str) -> BridgeError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status.as_u16() {
        401 | 403 => BridgeError::Auth(message),
        429 => BridgeError::RateLimited(message),
        529 => BridgeError::ProviderUnavailable(message),
        _ if status.is_server_error() => BridgeError::ProviderUnavailable(format!("HTTP {status}: {message}")),
        _ => BridgeError::Provider(format!("HTTP {status}: {message}")),
    }
}

/// POST `body` and decode the JSON reply
pub async fn post_json<B, R>(request: reqwest::RequestBuilder, body: &B) -> Result<R>
where
    B: serde::Serialize + Sync,
    R: serde::de::DeserializeOwned,
{
    let response = request.json(body).send().await.map_err(|e| transport_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| BridgeError::Provider(format!("failed to parse response body: {e}")))
}
