//! MDS provider composition root.
//!
//! Unique responsibility: validate the provider configuration once, build the
//! REST client once, and hand it explicitly to every resource and data source.
//!
//! Lifecycle entry points (`Resource`, `DataSource`) take and return JSON
//! state objects; failures are reported as `Diagnostics`.

use std::{collections::BTreeMap, env, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::mds_client::{MdsClient, MdsClientConfig, MdsClientError};
use crate::mds_cluster::ClusterResource;
use crate::mds_cluster_network_policies::ClusterNetworkPoliciesResource;
use crate::mds_data_sources::{NetworkPoliciesDataSource, RegionsDataSource, ServiceRolesDataSource};
use crate::mds_diagnostics::Diagnostics;
use crate::mds_poller::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollPolicy};
use crate::mds_schema::Schema;
use crate::mds_state::{StateError, StateObject, get_str};

/// Type name prefix of every resource and data source.
pub const PROVIDER_TYPE_NAME: &str = "vmds";

/// A managed remote entity with a full lifecycle.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name without the provider prefix (e.g. `cluster`).
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Create the remote entity from a plan; returns the new state.
    async fn create(&self, plan: StateObject) -> Result<StateObject, Diagnostics>;

    /// Refresh a state from the remote entity.
    async fn read(&self, state: StateObject) -> Result<StateObject, Diagnostics>;

    /// Apply a plan to an existing entity; returns the new state.
    async fn update(&self, prior: StateObject, plan: StateObject) -> Result<StateObject, Diagnostics>;

    /// Delete the remote entity and wait until it is gone.
    async fn delete(&self, state: StateObject) -> Result<(), Diagnostics>;

    /// Seed a state from an import ID; the host reads it afterwards.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic when the ID is empty.
    fn import_state(&self, id: &str) -> Result<StateObject, Diagnostics> {
        if id.trim().is_empty() {
            return Err(Diagnostics::error(
                "Missing import ID",
                "An ID is required to import this resource.",
            ));
        }
        let mut state = StateObject::new();
        state.insert("id".to_string(), id.into());
        Ok(state)
    }
}

/// A read-only projection of remote data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Type name without the provider prefix (e.g. `regions`).
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Compute the state from a configuration.
    async fn read(&self, config: StateObject) -> Result<StateObject, Diagnostics>;
}

/// Provider configuration, validated once by `MdsProvider::new`.
#[derive(Clone, Debug)]
pub struct MdsProviderConfig {
    /// REST client configuration.
    pub client: MdsClientConfig,
    /// Timing of every reconciliation poll.
    pub poll: PollPolicy,
}

impl MdsProviderConfig {
    /// Create a configuration with the default poll policy.
    #[must_use]
    pub fn new(client: MdsClientConfig) -> Self {
        Self {
            client,
            poll: PollPolicy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// On top of the client variables:
    /// - `MDS_POLL_INTERVAL_MS`: interval between status fetches (default: 10000)
    /// - `MDS_POLL_TIMEOUT_MS`: maximum wait for a terminal status (default: 3600000)
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ProviderError> {
        let client = MdsClientConfig::from_env()?;
        let interval = parse_ms_env("MDS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL)?;
        let timeout = parse_ms_env("MDS_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT)?;

        Ok(Self {
            client,
            poll: PollPolicy::new(interval, timeout),
        })
    }

    /// Check the poll policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero or exceeds the timeout.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.poll.interval.is_zero() {
            return Err(ProviderError::InvalidPollPolicy(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.poll.timeout < self.poll.interval {
            return Err(ProviderError::InvalidPollPolicy(format!(
                "poll timeout {:?} is shorter than the poll interval {:?}",
                self.poll.timeout, self.poll.interval
            )));
        }
        Ok(())
    }
}

/// The MDS provider: one client, every resource and data source.
pub struct MdsProvider {
    resources: BTreeMap<String, Arc<dyn Resource>>,
    data_sources: BTreeMap<String, Arc<dyn DataSource>>,
}

impl MdsProvider {
    /// Validate the configuration and wire every resource and data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot be built.
    pub fn new(cfg: MdsProviderConfig) -> Result<Self, ProviderError> {
        cfg.validate()?;
        let client = Arc::new(MdsClient::new(cfg.client)?);
        let poll = cfg.poll;

        let resources: Vec<Arc<dyn Resource>> = vec![
            Arc::new(ClusterResource::new(Arc::clone(&client), poll)?),
            Arc::new(ClusterNetworkPoliciesResource::new(Arc::clone(&client), poll)?),
        ];
        let data_sources: Vec<Arc<dyn DataSource>> = vec![
            Arc::new(NetworkPoliciesDataSource::new(Arc::clone(&client))?),
            Arc::new(RegionsDataSource::new(Arc::clone(&client))?),
            Arc::new(ServiceRolesDataSource::new(Arc::clone(&client))?),
        ];

        tracing::info!(
            resources = resources.len(),
            data_sources = data_sources.len(),
            "mds provider configured"
        );

        Ok(Self {
            resources: resources
                .into_iter()
                .map(|r| (full_type_name(r.type_name()), r))
                .collect(),
            data_sources: data_sources
                .into_iter()
                .map(|d| (full_type_name(d.type_name()), d))
                .collect(),
        })
    }

    /// Look up a resource by full type name (e.g. `vmds_cluster`).
    #[must_use]
    pub fn resource(&self, type_name: &str) -> Option<&dyn Resource> {
        self.resources.get(type_name).map(|r| &**r)
    }

    /// Look up a data source by full type name (e.g. `vmds_regions`).
    #[must_use]
    pub fn data_source(&self, type_name: &str) -> Option<&dyn DataSource> {
        self.data_sources.get(type_name).map(|d| &**d)
    }

    /// Full type names of every resource.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Full type names of every data source.
    pub fn data_source_names(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }
}

/// Errors raised while composing the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Client configuration or construction failed.
    #[error(transparent)]
    Client(#[from] MdsClientError),
    /// The poll policy is unusable.
    #[error("invalid poll policy: {0}")]
    InvalidPollPolicy(String),
    /// A resource declared an inconsistent state mapping.
    #[error("invalid state mapping: {0}")]
    StateMapping(#[from] StateError),
}

/// The `id` of a state, refused when missing or blank.
pub(crate) fn require_id<'a>(state: &'a StateObject, entity: &str) -> Result<&'a str, Diagnostics> {
    match get_str(state, "id") {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(Diagnostics::error(
            format!("Missing {entity} ID"),
            format!("The {entity} state has no ID; import or create it first."),
        )),
    }
}

fn full_type_name(name: &str) -> String {
    format!("{PROVIDER_TYPE_NAME}_{name}")
}

fn parse_ms_env(key: &'static str, default: Duration) -> Result<Duration, ProviderError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ProviderError::Client(MdsClientError::InvalidEnv {
                    key,
                    value: v,
                    reason: "expected an unsigned integer",
                })
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MdsProviderConfig {
        MdsProviderConfig::new(MdsClientConfig::new("https://console.mds.example.com", "token"))
    }

    #[test]
    fn registers_every_type_name() {
        let Ok(provider) = MdsProvider::new(config()) else {
            panic!("provider should build");
        };
        let resources: Vec<_> = provider.resource_names().collect();
        let data_sources: Vec<_> = provider.data_source_names().collect();
        assert_eq!(
            resources,
            vec!["vmds_cluster", "vmds_cluster_network_policies_association"]
        );
        assert_eq!(
            data_sources,
            vec!["vmds_network_policies", "vmds_regions", "vmds_service_roles"]
        );
        assert!(provider.resource("vmds_cluster").is_some());
        assert!(provider.data_source("vmds_cluster").is_none());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = config();
        cfg.poll = PollPolicy::new(Duration::ZERO, Duration::from_secs(60));
        assert!(matches!(
            MdsProvider::new(cfg),
            Err(ProviderError::InvalidPollPolicy(_))
        ));
    }

    #[test]
    fn timeout_shorter_than_interval_is_rejected() {
        let mut cfg = config();
        cfg.poll = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(5));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn invalid_host_is_rejected() {
        let cfg = MdsProviderConfig::new(MdsClientConfig::new("not a url", "token"));
        assert!(matches!(MdsProvider::new(cfg), Err(ProviderError::Client(_))));
    }

    #[test]
    fn import_state_passes_the_id_through() {
        let Ok(provider) = MdsProvider::new(config()) else {
            panic!("provider should build");
        };
        let Some(cluster) = provider.resource("vmds_cluster") else {
            panic!("cluster resource should be registered");
        };
        let state = cluster.import_state("c-42").unwrap_or_default();
        assert_eq!(state.get("id").and_then(|v| v.as_str()), Some("c-42"));
        assert!(cluster.import_state(" ").is_err());
    }

    #[test]
    fn blank_or_missing_id_is_refused() {
        let mut state = StateObject::new();
        assert!(require_id(&state, "cluster").is_err());

        state.insert("id".to_string(), "  ".into());
        let Err(diags) = require_id(&state, "cluster") else {
            panic!("a blank id should be refused");
        };
        assert!(diags.to_string().contains("Missing cluster ID"));

        state.insert("id".to_string(), "c-1".into());
        assert_eq!(require_id(&state, "cluster").ok(), Some("c-1"));
    }
}
