//! MDS REST client.
//!
//! Unique responsibility: issue typed requests against the MDS control-plane REST API.
//!
//! API base:
//! - `<MDS_HOST>/api/...`
//! - Header: Authorization: Bearer <token>
//!
//! This module encapsulates:
//! - Cluster lifecycle (create, query, get, update tags, delete)
//! - Cluster network-policy association
//! - Policy, region and service-role queries
//!
//! The client is built once from a validated configuration and shared by every
//! resource and data source. Failed requests surface as `MdsClientError::Api`
//! carrying the HTTP status, so callers can tell "not found" from other failures.

use std::{env, time::Duration};

use reqwest::{Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::mds_model::{
    DataPlaneRegionsQuery, EmbeddedClusters, EmbeddedPolicies, EmbeddedServiceRoles, MdsCluster,
    MdsClusterCreateRequest, MdsClusterNetworkPoliciesUpdateRequest, MdsClusterUpdateRequest,
    MdsClustersQuery, MdsPoliciesQuery, MdsPolicy, MdsServiceRoles, Paged, RegionDataPlanes,
};
use crate::mds_poller::{FetchError, Observed};

/// Configuration for the MDS REST client.
#[derive(Clone, Debug)]
pub struct MdsClientConfig {
    /// Base URL of the control plane.
    /// Env: `MDS_HOST` (required)
    pub host: String,

    /// API token sent as bearer token.
    /// Env: `MDS_API_TOKEN` (required)
    pub api_token: String,

    /// Org owning the resources; used to scope dedicated data-plane lookups.
    /// Env: `MDS_ORG_ID` (optional)
    pub org_id: Option<String>,

    /// HTTP request timeout in milliseconds.
    /// Env: `MDS_HTTP_TIMEOUT_MS` (default: 30000)
    pub timeout_ms: u64,

    /// Maximum number of retries of idempotent reads.
    /// Env: `MDS_HTTP_RETRY_MAX` (default: 0)
    pub retry_max: u32,

    /// Backoff time between retries in milliseconds.
    /// Env: `MDS_HTTP_RETRY_BACKOFF_MS` (default: 500)
    pub retry_backoff_ms: u64,

    /// User agent for HTTP requests.
    /// Env: `MDS_USER_AGENT` (default: "vmds-provider/0.1")
    pub user_agent: String,
}

impl MdsClientConfig {
    /// Create a configuration with default transport settings.
    #[must_use]
    pub fn new(host: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_token: api_token.into(),
            org_id: None,
            timeout_ms: 30_000,
            retry_max: 0,
            retry_backoff_ms: 500,
            user_agent: "vmds-provider/0.1".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// In local dev, this will also attempt to load `.env` from the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, MdsClientError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            host: must_env("MDS_HOST")?,
            api_token: must_env("MDS_API_TOKEN")?,
            org_id: env::var("MDS_ORG_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timeout_ms: parse_u64_env("MDS_HTTP_TIMEOUT_MS", 30_000)?,
            retry_max: parse_u32_env("MDS_HTTP_RETRY_MAX", 0)?,
            retry_backoff_ms: parse_u64_env("MDS_HTTP_RETRY_BACKOFF_MS", 500)?,
            user_agent: env::var("MDS_USER_AGENT")
                .unwrap_or_else(|_| "vmds-provider/0.1".to_string()),
        })
    }

    /// Check the configuration and resolve the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an http(s) URL or the token is empty.
    pub fn api_base(&self) -> Result<Url, MdsClientError> {
        if self.api_token.trim().is_empty() {
            return Err(MdsClientError::InvalidConfig("api token is empty".to_string()));
        }

        let raw = format!("{}/api/", self.host.trim_end_matches('/'));
        let url = Url::parse(&raw)
            .map_err(|e| MdsClientError::InvalidConfig(format!("invalid host {:?}: {e}", self.host)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(MdsClientError::InvalidConfig(format!(
                "host must use http or https, got {:?}",
                url.scheme()
            )));
        }

        Ok(url)
    }
}

/// REST client for the MDS control plane.
#[derive(Debug)]
pub struct MdsClient {
    cfg: MdsClientConfig,
    base: Url,
    http: reqwest::Client,
}

impl MdsClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(cfg: MdsClientConfig) -> Result<Self, MdsClientError> {
        let base = cfg.api_base()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(MdsClientError::Http)?;

        Ok(Self { cfg, base, http })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &MdsClientConfig {
        &self.cfg
    }

    /// Submit a cluster creation request.
    ///
    /// The control plane answers before the cluster exists; look it up with
    /// `get_clusters` to learn its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn create_cluster(&self, req: &MdsClusterCreateRequest) -> Result<(), MdsClientError> {
        self.send(Method::POST, &["clusters"], &[], Some(req)).await?;
        Ok(())
    }

    /// List clusters matching a filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_clusters(&self, query: &MdsClustersQuery) -> Result<Vec<MdsCluster>, MdsClientError> {
        let pairs = vec![
            ("serviceType", query.service_type.clone()),
            ("name", query.name.clone()),
            ("fullNameMatch", query.full_name_match.to_string()),
        ];
        let pairs: Vec<_> = pairs.into_iter().filter(|(_, v)| !v.is_empty()).collect();
        let page: Paged<EmbeddedClusters> = self.get_json(&["clusters"], &pairs).await?;
        Ok(page.into_items().clusters)
    }

    /// Get a cluster by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error
    /// (`is_not_found()` is true for a 404).
    pub async fn get_cluster(&self, id: &str) -> Result<MdsCluster, MdsClientError> {
        self.get_json(&["clusters", id], &[]).await
    }

    /// Update a cluster's tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn update_cluster(
        &self,
        id: &str,
        req: &MdsClusterUpdateRequest,
    ) -> Result<MdsCluster, MdsClientError> {
        let body = self
            .send(Method::PATCH, &["clusters", id], &[], Some(req))
            .await?;
        decode(body)
    }

    /// Submit a cluster deletion request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn delete_cluster(&self, id: &str) -> Result<(), MdsClientError> {
        self.send::<()>(Method::DELETE, &["clusters", id], &[], None)
            .await?;
        Ok(())
    }

    /// List the network policies attached to a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_cluster_network_policies(&self, id: &str) -> Result<Vec<MdsPolicy>, MdsClientError> {
        self.get_json(&["clusters", id, "network-policies"], &[])
            .await
    }

    /// Replace the network policies attached to a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn update_cluster_network_policies(
        &self,
        id: &str,
        req: &MdsClusterNetworkPoliciesUpdateRequest,
    ) -> Result<(), MdsClientError> {
        self.send(
            Method::PATCH,
            &["clusters", id, "network-policies"],
            &[],
            Some(req),
        )
        .await?;
        Ok(())
    }

    /// List policies of a type, optionally filtered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_policies(&self, query: &MdsPoliciesQuery) -> Result<Vec<MdsPolicy>, MdsClientError> {
        let page: Paged<EmbeddedPolicies> = self.get_json(&["policies"], &query.to_pairs()).await?;
        Ok(page.into_items().policies)
    }

    /// List regions whose data planes can host the given footprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_regions_with_data_planes(
        &self,
        query: &DataPlaneRegionsQuery,
    ) -> Result<RegionDataPlanes, MdsClientError> {
        let mut pairs = vec![
            ("cpu", query.cpu.clone()),
            ("memory", query.memory.clone()),
            ("storage", query.storage.clone()),
            ("nodeCount", query.node_count.clone()),
            ("provider", query.provider.clone()),
        ];
        if let Some(org_id) = &query.org_id {
            pairs.push(("orgId", org_id.clone()));
        }
        self.get_json(&["infra-connector", "regions"], &pairs).await
    }

    /// List service roles of a service type.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_service_roles(&self, service_type: &str) -> Result<Vec<MdsServiceRoles>, MdsClientError> {
        let pairs = [("type", service_type.to_string())];
        let page: Paged<EmbeddedServiceRoles> = self.get_json(&["service-roles"], &pairs).await?;
        Ok(page.into_items().groups)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, MdsClientError> {
        let body = self.send::<()>(Method::GET, segments, query, None).await?;
        decode(body)
    }

    /// Resolve path segments under the API base. Each segment is
    /// percent-encoded, so an ID cannot escape its position in the path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, MdsClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| MdsClientError::InvalidConfig(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the raw body of a successful response.
    ///
    /// Only GET requests are retried, and only `retry_max` times.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<String, MdsClientError> {
        let url = self.endpoint(segments)?;
        let retry_max = if method == Method::GET { self.cfg.retry_max } else { 0 };

        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);

        loop {
            attempt = attempt.saturating_add(1);
            tracing::debug!(%method, %url, attempt, "mds request");

            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.cfg.api_token);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return Ok(text);
                    }

                    if attempt <= retry_max && is_retryable_status(status) {
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    tracing::debug!(%method, %url, %status, "mds request rejected");
                    return Err(MdsClientError::Api { status, body: text });
                }
                Err(e) => {
                    if attempt <= retry_max && is_retryable_reqwest(&e) {
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }

                    return Err(MdsClientError::Http(e));
                }
            }
        }
    }
}

impl Observed for MdsCluster {
    fn status(&self) -> &str {
        &self.status
    }
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for MDS client operations.
#[derive(Debug, Error)]
pub enum MdsClientError {
    /// Missing required environment variable.
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),
    /// Invalid environment variable value.
    #[error("invalid env var {key}={value:?}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The environment variable value.
        value: String,
        /// The reason for invalidity.
        reason: &'static str,
    },
    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),
    /// JSON decoding error.
    #[error("json decode error: {source}")]
    Json {
        /// The JSON parsing error.
        source: serde_json::Error,
        /// The response body.
        body: String,
    },
    /// API error response.
    #[error("mds api error: status={status}, body={body}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Response body.
        body: String,
    },
}

impl MdsClientError {
    /// HTTP status of an API error.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl FetchError for MdsClientError {
    fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn decode<T: DeserializeOwned>(body: String) -> Result<T, MdsClientError> {
    serde_json::from_str(&body).map_err(|source| MdsClientError::Json { source, body })
}

#[inline]
fn must_env(key: &'static str) -> Result<String, MdsClientError> {
    env::var(key).map_err(|_| MdsClientError::MissingEnv(key))
}

#[inline]
fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, MdsClientError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u64>().map_err(|_| MdsClientError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}

#[inline]
fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, MdsClientError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u32>().map_err(|_| MdsClientError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}

#[inline]
const fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

#[inline]
fn is_retryable_reqwest(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    // Exponential backoff capped at 10 seconds.
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_appends_api_segment() {
        let cfg = MdsClientConfig::new("https://console.mds.example.com/", "token");
        let base = cfg.api_base().map(|u| u.to_string()).unwrap_or_default();
        assert_eq!(base, "https://console.mds.example.com/api/");
    }

    #[test]
    fn api_base_rejects_empty_token() {
        let cfg = MdsClientConfig::new("https://console.mds.example.com", "  ");
        assert!(matches!(cfg.api_base(), Err(MdsClientError::InvalidConfig(_))));
    }

    #[test]
    fn api_base_rejects_non_http_scheme() {
        let cfg = MdsClientConfig::new("ftp://console.mds.example.com", "token");
        assert!(matches!(cfg.api_base(), Err(MdsClientError::InvalidConfig(_))));
    }

    #[test]
    fn ids_are_encoded_as_single_segments() {
        let client = MdsClient::new(MdsClientConfig::new("https://console.mds.example.com", "token"))
            .expect("client should build");
        let url = client.endpoint(&["clusters", "a/b?c#d"]).expect("url should build");
        assert_eq!(url.as_str(), "https://console.mds.example.com/api/clusters/a%2Fb%3Fc%23d");

        let nested = client
            .endpoint(&["clusters", "..", "network-policies"])
            .expect("url should build");
        assert!(nested.path().starts_with("/api/clusters/"));
    }

    #[test]
    fn only_404_is_not_found() {
        let not_found = MdsClientError::Api {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        let forbidden = MdsClientError::Api {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert!(not_found.is_not_found());
        assert!(!forbidden.is_not_found());
        assert!(!MdsClientError::MissingEnv("MDS_HOST").is_not_found());
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(next_backoff(Duration::from_secs(8)), Duration::from_secs(10));
        assert_eq!(next_backoff(Duration::from_millis(500)), Duration::from_secs(1));
    }
}
