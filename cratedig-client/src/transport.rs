//! Catalog transport contract and HTTP implementation.
//!
//! The core only needs "perform this request, give me a value or a
//! failure"; everything else (auth, headers, status mapping) lives behind
//! [`CatalogTransport`] so tests can substitute a canned transport.

use async_trait::async_trait;
use cratedig_core::{CratedigResult, RequestDescriptor, TransportConfig, TransportError, Verb};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Fallback for a 429 without a usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// A source of remote catalog documents.
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    /// Perform the described request, returning the parsed JSON body.
    async fn perform(&self, descriptor: &RequestDescriptor) -> CratedigResult<Value>;
}

/// HTTP transport against the remote catalog API.
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url_for(&self, target: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            target.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn perform(&self, descriptor: &RequestDescriptor) -> CratedigResult<Value> {
        let url = self.url_for(&descriptor.target);
        let mut request = match descriptor.verb {
            Verb::Get => self.client.get(&url),
            Verb::Post => self.client.post(&url),
            Verb::Put => self.client.put(&url),
            Verb::Delete => self.client.delete(&url),
        };
        request = request.header(USER_AGENT, &self.config.user_agent);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }

        let response = request.send().await.map_err(|e| TransportError::Network {
            target: descriptor.target.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    target: descriptor.target.clone(),
                    reason: e.to_string(),
                })?);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(TransportError::RateLimited { retry_after_secs }.into());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                target: descriptor.target.clone(),
            }
            .into());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(body);
        Err(TransportError::Status {
            target: descriptor.target.clone(),
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url)
            .field("user_agent", &self.config.user_agent)
            .field("token", &self.config.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
