//! HTTP clients for the third-party data sources behind each cascade tier.
//!
//! Every provider takes its API key per call (resolved by the cascade from the
//! agent's credential set) and a base URL that tests can point at a local
//! mock server.

pub mod financial;
pub mod learning;
pub mod research;
pub mod travel;
pub mod weather;

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::cascade::ProviderError;

/// Shared-key alias for providers reached through RapidAPI.
pub const RAPIDAPI: &str = "rapidapi";

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Build the HTTP client shared by all providers.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("goal-agents/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}

/// Check the status and decode a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base(url: impl Into<String>) -> String {
    let mut url = url.into();
    while url.ends_with('/') {
        url.pop();
    }
    url
}
