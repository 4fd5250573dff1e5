use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;

use crate::errors::{AdapterError, AppError};

const MAX_ERROR_BODY: usize = 200;

/// How an upstream expects its API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    None,
    /// `X-Api-Key: <key>`
    Header,
    /// `?apikey=<key>`
    QueryParam,
}

/// Shared JSON-over-HTTP client for every upstream source.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    /// Creates a new `UpstreamClient` with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("addressiq-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create upstream client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Issues a GET and parses the JSON body.
    ///
    /// Returns `Ok(None)` on 404 so the caller can decide between a soft
    /// default and "no data".
    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
        auth: AuthStyle,
        api_key: Option<&str>,
    ) -> Result<Option<Value>, AdapterError> {
        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        if let (AuthStyle::QueryParam, Some(key)) = (auth, api_key) {
            query.push(("apikey", key));
        }

        let url = Url::parse_with_params(url, &query)
            .map_err(|e| AdapterError::Http(format!("invalid upstream url: {}", e)))?;
        tracing::debug!("GET {}", redact(&url));

        let mut request = self.client.get(url.clone());
        if let (AuthStyle::Header, Some(key)) = (auth, api_key) {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("{} returned 404", redact(&url));
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("{} returned {}", redact(&url), status);
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| AdapterError::Decode(e.without_url().to_string()))?;

        Ok(Some(value))
    }
}

/// Renders `url` for logging with any credential replaced.
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "apikey") {
        return url.to_string();
    }
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" {
                "[REDACTED]".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

fn truncate(body: &str, max: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
