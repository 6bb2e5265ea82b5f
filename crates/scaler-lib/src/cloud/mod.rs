//! REST adapters for the managed-database control plane and monitoring APIs
//!
//! [`SqlAdminClient`] implements [`crate::source::InstanceController`] and
//! [`MonitoringClient`] implements [`crate::source::MetricsSource`]. Both
//! share a [`RestClient`] that handles base URLs, bearer tokens and error
//! mapping.

mod monitoring;
mod sqladmin;

pub use monitoring::MonitoringClient;
pub use sqladmin::SqlAdminClient;

use crate::source::SourceError;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

pub const SQLADMIN_BASE_URL: &str = "https://sqladmin.googleapis.com/";
pub const MONITORING_BASE_URL: &str = "https://monitoring.googleapis.com/";

/// Token endpoint of the instance metadata server
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Metadata tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Build the shared HTTP client
pub fn http_client(timeout: Duration) -> Result<Client, SourceError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

enum TokenKind {
    Fixed(String),
    Metadata {
        http: Client,
        url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

/// OAuth bearer tokens for API calls
#[derive(Clone)]
pub struct TokenSource {
    inner: Arc<TokenKind>,
}

impl TokenSource {
    /// Always use the given token
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TokenKind::Fixed(token.into())),
        }
    }

    /// Fetch tokens from the instance metadata server
    pub fn metadata(http: Client) -> Self {
        Self::metadata_at(http, METADATA_TOKEN_URL)
    }

    pub fn metadata_at(http: Client, url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TokenKind::Metadata {
                http,
                url: url.into(),
                cache: Mutex::new(None),
            }),
        }
    }

    /// A configured token wins over the metadata server
    pub fn from_settings(token: Option<String>, http: Client) -> Self {
        match token.filter(|t| !t.trim().is_empty()) {
            Some(token) => Self::fixed(token),
            None => Self::metadata(http),
        }
    }

    pub async fn token(&self) -> Result<String, SourceError> {
        match self.inner.as_ref() {
            TokenKind::Fixed(token) => Ok(token.clone()),
            TokenKind::Metadata { http, url, cache } => {
                let mut cached = cache.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(token.value.clone());
                    }
                }

                debug!(url = %url, "Fetching access token from metadata server");
                let response = http
                    .get(url.as_str())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| SourceError::Credentials(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(SourceError::Credentials(format!(
                        "metadata server returned {}",
                        response.status()
                    )));
                }
                let token: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| SourceError::Credentials(e.to_string()))?;

                let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
                *cached = Some(CachedToken {
                    value: token.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                Ok(token.access_token)
            }
        }
    }
}

/// Authenticated JSON client rooted at a base URL
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: Url,
    tokens: TokenSource,
}

impl RestClient {
    pub fn new(http: Client, base_url: &str, tokens: TokenSource) -> Result<Self, SourceError> {
        // Url::join drops the last path segment unless it ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| SourceError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let request = self.http.get(self.url(path)?).query(query);
        self.send(request).await
    }

    /// Make a PATCH request with JSON body
    pub async fn patch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SourceError> {
        let request = self.http.patch(self.url(path)?).json(body);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SourceError> {
        let token = self.tokens.token().await?;
        let response = request.bearer_auth(token).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))
}
