//! HTTP bridge implementation of [`MessageSource`].
//!
//! tgscrape does not speak the platform protocol itself. It talks to a
//! small JSON bridge service that holds a logged-in session and exposes:
//!
//! | Endpoint | Response |
//! |----------|----------|
//! | `GET /targets/resolve?input=@x` | `{"id", "username"?, "title"?}` |
//! | `GET /targets/{id}/messages?limit=&cursor=&direction=` | `{"messages": [...]}` |
//! | `GET /users/{id}` | `{"username"?}` |
//!
//! # Error Mapping
//!
//! - 404 → [`SourceError::NotFound`]
//! - 401/403 → [`SourceError::AccessDenied`] on resolve, [`SourceError::Fatal`] on fetch
//! - 429 → [`SourceError::FloodWait`] from `Retry-After` or body `retry_after`, capped at one day
//! - 5xx, timeouts, connection errors → [`SourceError::Transient`]
//! - other statuses and undecodable bodies → [`SourceError::Fatal`]

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use tgscrape_core::models::{RawMessage, ResolvedTarget};
use tgscrape_core::source::{FetchDirection, MessageSource, SourceError};

use crate::config::SourceConfig;

/// Flood wait assumed when a 429 carries no hint.
const DEFAULT_FLOOD_WAIT_SECS: u64 = 1;
/// Upper bound on a flood wait hint from the bridge.
const MAX_FLOOD_WAIT_SECS: u64 = 86_400;

#[derive(Deserialize)]
struct ResolveResponse {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct PageResponse {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize, Default)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Which call a status is being mapped for.
#[derive(Clone, Copy)]
enum Call {
    Resolve,
    Fetch,
}

pub struct HttpMessageSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMessageSource {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            bail!("source.base_url must not be empty");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let Some(base_url) = config.base_url.as_deref() else {
            bail!("source.base_url must be set to scrape");
        };
        Self::new(
            base_url,
            Duration::from_secs(config.timeout_secs),
            config.token(),
        )
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, SourceError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request.send().await.map_err(|e| {
            if e.is_builder() {
                SourceError::Fatal(format!("invalid request: {}", e))
            } else {
                SourceError::Transient(format!("request failed: {}", e))
            }
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                SourceError::Fatal(format!("undecodable response: {}", e))
            } else {
                SourceError::Transient(format!("failed to read response: {}", e))
            }
        })
    }
}

/// Map a non-success response to a [`SourceError`].
async fn status_error(response: Response, call: Call, what: &str) -> SourceError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => match call {
            Call::Resolve => SourceError::AccessDenied(what.to_string()),
            Call::Fetch => SourceError::Fatal(format!("{} for {}", status, what)),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            let header_hint = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let seconds = match header_hint {
                Some(seconds) => seconds,
                None => response
                    .json::<RateLimitBody>()
                    .await
                    .unwrap_or_default()
                    .retry_after
                    .unwrap_or(DEFAULT_FLOOD_WAIT_SECS),
            };
            SourceError::FloodWait {
                seconds: seconds.min(MAX_FLOOD_WAIT_SECS),
            }
        }
        s if s.is_server_error() => SourceError::Transient(format!("{} for {}", s, what)),
        s => {
            let body = response.text().await.unwrap_or_default();
            SourceError::Fatal(format!("{} for {}: {}", s, what, body))
        }
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn resolve_target(&self, input: &str) -> Result<ResolvedTarget, SourceError> {
        let response = self
            .get("/targets/resolve", &[("input", input.to_string())])
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response, Call::Resolve, input).await);
        }
        let body: ResolveResponse = Self::decode(response).await?;
        Ok(ResolvedTarget {
            target_input: input.to_string(),
            target_id: body.id,
            title: body.title.or_else(|| body.username.clone()),
            username: body.username,
        })
    }

    async fn fetch_page(
        &self,
        target: &ResolvedTarget,
        limit: usize,
        cursor: i64,
        direction: FetchDirection,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let response = self
            .get(
                &format!("/targets/{}/messages", target.target_id),
                &[
                    ("limit", limit.to_string()),
                    ("cursor", cursor.to_string()),
                    ("direction", direction.as_str().to_string()),
                ],
            )
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response, Call::Fetch, &target.target_input).await);
        }
        let page: PageResponse = Self::decode(response).await?;
        Ok(page.messages)
    }

    async fn sender_username(&self, sender_id: i64) -> Result<Option<String>, SourceError> {
        let response = self.get(&format!("/users/{}", sender_id), &[]).await?;
        if !response.status().is_success() {
            return Err(status_error(response, Call::Fetch, &format!("user {}", sender_id)).await);
        }
        let user: UserResponse = Self::decode(response).await?;
        Ok(user.username)
    }
}
