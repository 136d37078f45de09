//! `vmds_cluster_network_policies_association` resource.
//!
//! Owns the set of network policies attached to an existing cluster. The
//! resource ID is the cluster ID. Every change waits for the cluster to settle
//! and then reads the attached policies back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::mds_client::MdsClient;
use crate::mds_cluster::wait_for_cluster;
use crate::mds_diagnostics::Diagnostics;
use crate::mds_model::{MdsClusterNetworkPoliciesUpdateRequest, MdsPolicy};
use crate::mds_poller::PollPolicy;
use crate::mds_provider::{Resource, require_id};
use crate::mds_schema::{Attribute, AttributeKind, Schema};
use crate::mds_state::{Projection, StateError, StateObject, decode, set_value, string_value};

/// Network policies attached to one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNetworkPolicies {
    /// Cluster ID.
    pub cluster_id: String,
    /// Attached policies.
    pub policies: Vec<MdsPolicy>,
}

#[derive(Debug, Deserialize)]
struct AssociationPlan {
    id: String,
    policy_ids: Vec<String>,
}

/// The `vmds_cluster_network_policies_association` resource.
pub struct ClusterNetworkPoliciesResource {
    client: Arc<MdsClient>,
    poll: PollPolicy,
    projection: Projection<ClusterNetworkPolicies>,
}

impl ClusterNetworkPoliciesResource {
    /// Create the resource around a shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state projection is inconsistent.
    pub fn new(client: Arc<MdsClient>, poll: PollPolicy) -> Result<Self, StateError> {
        let projection = Projection::builder()
            .field("id", |a: &ClusterNetworkPolicies| string_value(&a.cluster_id))
            .field("policy_ids", |a: &ClusterNetworkPolicies| {
                set_value(a.policies.iter().map(|p| p.id.as_str()))
            })
            .build()?;
        Ok(Self {
            client,
            poll,
            projection,
        })
    }

    async fn fetch(&self, cluster_id: &str) -> Result<ClusterNetworkPolicies, Diagnostics> {
        let policies = self
            .client
            .get_cluster_network_policies(cluster_id)
            .await
            .map_err(|e| {
                Diagnostics::error(
                    "Reading cluster network policies",
                    format!("Could not read network policies of cluster {cluster_id}: {e}"),
                )
            })?;
        Ok(ClusterNetworkPolicies {
            cluster_id: cluster_id.to_string(),
            policies,
        })
    }

    /// Replace the attached set, wait for the cluster, read the set back.
    async fn associate(&self, cluster_id: &str, policy_ids: Vec<String>) -> Result<ClusterNetworkPolicies, Diagnostics> {
        let request = MdsClusterNetworkPoliciesUpdateRequest {
            network_policy_ids: policy_ids,
        };
        self.client
            .update_cluster_network_policies(cluster_id, &request)
            .await
            .map_err(|e| {
                Diagnostics::error(
                    "Updating cluster network policies",
                    format!("Could not update network policies of cluster {cluster_id}: {e}"),
                )
            })?;

        wait_for_cluster(&self.client, &self.poll, cluster_id).await?;
        self.fetch(cluster_id).await
    }

    fn decode_plan(plan: &StateObject) -> Result<AssociationPlan, Diagnostics> {
        let schema = association_schema();
        schema.validate_config(plan).into_result()?;
        require_id(plan, "cluster")?;
        decode::<AssociationPlan>("association plan", plan)
            .map_err(|e| Diagnostics::error("Invalid association plan", e.to_string()))
    }
}

#[async_trait]
impl Resource for ClusterNetworkPoliciesResource {
    fn type_name(&self) -> &'static str {
        "cluster_network_policies_association"
    }

    fn schema(&self) -> Schema {
        association_schema()
    }

    async fn create(&self, plan: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Create cluster network policies association");
        let AssociationPlan { id, policy_ids } = Self::decode_plan(&plan)?;

        let association = self.associate(&id, policy_ids).await?;
        let mut plan = plan;
        self.projection.apply(&association, &mut plan);

        tracing::info!(cluster_id = %id, "END__Create cluster network policies association");
        Ok(plan)
    }

    async fn read(&self, state: StateObject) -> Result<StateObject, Diagnostics> {
        let id = require_id(&state, "cluster")?.to_string();
        let association = self.fetch(&id).await?;
        let mut state = state;
        self.projection.apply(&association, &mut state);
        Ok(state)
    }

    async fn update(&self, prior: StateObject, plan: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Update cluster network policies association");
        if !self.schema().requires_replace(&prior, &plan).is_empty() {
            return Err(Diagnostics::error(
                "Updating cluster network policies",
                "Changing the cluster ID requires replacing the association",
            ));
        }
        let AssociationPlan { id, policy_ids } = Self::decode_plan(&plan)?;

        let association = self.associate(&id, policy_ids).await?;
        let mut plan = plan;
        self.projection.apply(&association, &mut plan);

        tracing::info!(cluster_id = %id, "END__Update cluster network policies association");
        Ok(plan)
    }

    async fn delete(&self, state: StateObject) -> Result<(), Diagnostics> {
        tracing::info!("INIT__Delete cluster network policies association");
        let id = require_id(&state, "cluster")?;

        let remaining = self.associate(id, Vec::new()).await?;
        if !remaining.policies.is_empty() {
            tracing::warn!(cluster_id = %id, remaining = remaining.policies.len(), "policies still attached");
        }

        tracing::info!(cluster_id = %id, "END__Delete cluster network policies association");
        Ok(())
    }
}

fn association_schema() -> Schema {
    Schema::new("Associates a set of network policies with an existing cluster.")
        .attribute(
            "id",
            Attribute::required(AttributeKind::String)
                .describe("ID of the cluster.")
                .requires_replace(),
        )
        .attribute(
            "policy_ids",
            Attribute::required(AttributeKind::StringSet)
                .describe("IDs of network policies to attach to the cluster."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds_client::MdsClientConfig;
    use serde_json::{Value, json};

    fn resource() -> ClusterNetworkPoliciesResource {
        let Ok(client) = MdsClient::new(MdsClientConfig::new("https://console.mds.example.com", "token")) else {
            panic!("client should build");
        };
        let Ok(resource) = ClusterNetworkPoliciesResource::new(Arc::new(client), PollPolicy::default()) else {
            panic!("resource should build");
        };
        resource
    }

    fn obj(value: Value) -> StateObject {
        match value {
            Value::Object(obj) => obj,
            _ => StateObject::new(),
        }
    }

    #[test]
    fn projection_writes_sorted_policy_ids() {
        let association = ClusterNetworkPolicies {
            cluster_id: "c-1".into(),
            policies: vec![
                MdsPolicy {
                    id: "np-2".into(),
                    ..Default::default()
                },
                MdsPolicy {
                    id: "np-1".into(),
                    ..Default::default()
                },
            ],
        };
        let state = resource().projection.project(&association);
        assert_eq!(state["id"], json!("c-1"));
        assert_eq!(state["policy_ids"], json!(["np-1", "np-2"]));
    }

    #[test]
    fn plan_requires_cluster_and_policies() {
        let Err(diags) = ClusterNetworkPoliciesResource::decode_plan(&obj(json!({"id": "c-1"}))) else {
            panic!("plan without policy_ids should be rejected");
        };
        assert!(diags.to_string().contains("policy_ids"));

        let plan = ClusterNetworkPoliciesResource::decode_plan(&obj(json!({
            "id": "c-1",
            "policy_ids": ["np-1"],
        })));
        assert!(plan.is_ok_and(|p| p.id == "c-1" && p.policy_ids == ["np-1"]));
    }

    #[tokio::test]
    async fn changing_cluster_id_is_refused() {
        let prior = obj(json!({"id": "c-1", "policy_ids": ["np-1"]}));
        let plan = obj(json!({"id": "c-2", "policy_ids": ["np-1"]}));
        let res = resource().update(prior, plan).await;
        assert!(res.is_err_and(|d| d.to_string().contains("requires replacing")));
    }
}
