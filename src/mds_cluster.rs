//! `vmds_cluster` resource.
//!
//! Unique responsibility: manage an MDS service instance (cluster) through its
//! whole lifecycle.
//!
//! - Create submits the request, looks the cluster up by exact name, then
//!   polls it until `READY` or `FAILED`.
//! - Only `tags` can change in place; `region` forces a replacement.
//! - Delete submits the request, then polls until the cluster is gone.
//!
//! `dedicated`, `shared` and `network_policy_ids` are creation-time inputs:
//! the API does not report them back, so they keep their planned values.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::mds_client::{MdsClient, MdsClientError};
use crate::mds_diagnostics::Diagnostics;
use crate::mds_model::{
    CLUSTER_STATUS_FAILED, CLUSTER_STATUS_READY, MdsCluster, MdsClusterCreateRequest,
    MdsClusterUpdateRequest, MdsClustersQuery, SERVICE_TYPE_RABBITMQ,
};
use crate::mds_poller::{PollError, PollPolicy, StatusClass, poll_until_deleted, poll_until_settled};
use crate::mds_provider::{Resource, require_id};
use crate::mds_schema::{Attribute, AttributeKind, Schema};
use crate::mds_state::{Projection, StateError, StateObject, decode, list_value, set_value, string_value};

/// Map a cluster status onto the poller's classification.
#[must_use]
pub fn classify_cluster_status(status: &str) -> StatusClass {
    match status {
        CLUSTER_STATUS_READY => StatusClass::Success,
        CLUSTER_STATUS_FAILED => StatusClass::Failure,
        _ => StatusClass::Pending,
    }
}

/// Planned values the cluster resource reads from a plan.
#[derive(Debug, Deserialize)]
struct ClusterPlan {
    name: String,
    #[serde(default)]
    service_type: Option<String>,
    cloud_provider: String,
    instance_size: String,
    region: String,
    #[serde(default)]
    dedicated: Option<bool>,
    #[serde(default)]
    shared: Option<bool>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    network_policy_ids: Vec<String>,
    #[serde(default)]
    data_plane_id: Option<String>,
}

impl ClusterPlan {
    fn into_request(self) -> MdsClusterCreateRequest {
        MdsClusterCreateRequest {
            name: self.name,
            service_type: self
                .service_type
                .unwrap_or_else(|| SERVICE_TYPE_RABBITMQ.to_string()),
            instance_size: self.instance_size,
            provider: self.cloud_provider,
            region: self.region,
            dedicated: self.dedicated.unwrap_or(false),
            shared: self.shared.unwrap_or(false),
            data_plane_id: self.data_plane_id.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            network_policy_ids: self.network_policy_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsPlan {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// The `vmds_cluster` resource.
pub struct ClusterResource {
    client: Arc<MdsClient>,
    poll: PollPolicy,
    projection: Projection<MdsCluster>,
}

impl ClusterResource {
    /// Create the resource around a shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state projection is inconsistent.
    pub fn new(client: Arc<MdsClient>, poll: PollPolicy) -> Result<Self, StateError> {
        Ok(Self {
            client,
            poll,
            projection: cluster_projection()?,
        })
    }

    /// Turn a submitted cluster into a settled one.
    async fn settle(&self, cluster: MdsCluster) -> Result<MdsCluster, Diagnostics> {
        match classify_cluster_status(&cluster.status) {
            StatusClass::Success => Ok(cluster),
            StatusClass::Failure => Err(Diagnostics::error(
                "Error creating cluster",
                format!("Cluster creation failed with the status '{}'", cluster.status),
            )),
            StatusClass::Pending => wait_for_cluster(&self.client, &self.poll, &cluster.id).await,
        }
    }
}

/// Poll a cluster until it is `READY`.
///
/// The first fetch happens one interval after the call.
pub(crate) async fn wait_for_cluster(
    client: &MdsClient,
    policy: &PollPolicy,
    id: &str,
) -> Result<MdsCluster, Diagnostics> {
    let policy = policy.with_initial_delay(policy.interval);
    let outcome = poll_until_settled(&policy, || client.get_cluster(id), classify_cluster_status).await;

    match outcome.into_result(&policy) {
        Ok(Some(cluster)) => Ok(cluster),
        Ok(None) => Err(Diagnostics::error(
            "Fetching cluster",
            format!("Cluster {id} disappeared while waiting for it"),
        )),
        Err(e) => Err(poll_diagnostics(id, &e)),
    }
}

fn poll_diagnostics(id: &str, err: &PollError<MdsClientError>) -> Diagnostics {
    match err {
        PollError::Failed { reason } => Diagnostics::error(
            "Cluster failed",
            format!("Cluster {id} failed with {reason}"),
        ),
        PollError::TimedOut { .. } => Diagnostics::error(
            "Timed out waiting for cluster",
            format!("Cluster {id} did not settle: {err}"),
        ),
        PollError::Transport(e) => Diagnostics::error(
            "Fetching cluster",
            format!("Could not fetch cluster by ID [{id}], unexpected error: {e}"),
        ),
    }
}

#[async_trait]
impl Resource for ClusterResource {
    fn type_name(&self) -> &'static str {
        "cluster"
    }

    fn schema(&self) -> Schema {
        cluster_schema()
    }

    async fn create(&self, plan: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Create cluster");
        let schema = self.schema();
        let mut plan = plan;
        schema.apply_defaults(&mut plan);
        schema.validate_config(&plan).into_result()?;

        let request = decode::<ClusterPlan>("cluster plan", &plan)
            .map_err(|e| Diagnostics::error("Invalid cluster plan", e.to_string()))?
            .into_request();

        self.client.create_cluster(&request).await.map_err(|e| {
            Diagnostics::error(
                "Submitting request to create cluster",
                format!("Could not create cluster, unexpected error: {e}"),
            )
        })?;

        let clusters = self
            .client
            .get_clusters(&MdsClustersQuery {
                service_type: request.service_type,
                name: request.name,
                full_name_match: true,
            })
            .await
            .map_err(|e| {
                Diagnostics::error(
                    "Fetching clusters",
                    format!("Could not fetch clusters by name, unexpected error: {e}"),
                )
            })?;

        let Some(created) = clusters.into_iter().next() else {
            return Err(Diagnostics::error(
                "Fetching clusters",
                "Unable to fetch the created cluster",
            ));
        };
        tracing::info!(id = %created.id, status = %created.status, "cluster submitted");

        let cluster = self.settle(created).await?;
        self.projection.apply(&cluster, &mut plan);

        tracing::info!(id = %cluster.id, "END__Create cluster");
        Ok(plan)
    }

    async fn read(&self, state: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Read cluster");
        let id = require_id(&state, "cluster")?.to_string();

        let cluster = self.client.get_cluster(&id).await.map_err(|e| {
            Diagnostics::error(
                "Reading MDS Cluster",
                format!("Could not read MDS cluster ID {id}: {e}"),
            )
        })?;

        let mut state = state;
        self.projection.apply(&cluster, &mut state);

        tracing::info!(%id, "END__Read cluster");
        Ok(state)
    }

    async fn update(&self, prior: StateObject, plan: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Update cluster");
        let schema = self.schema();
        let replaced = schema.requires_replace(&prior, &plan);
        if !replaced.is_empty() {
            return Err(Diagnostics::error(
                "Updating MDS Cluster",
                format!(
                    "Changing {} requires replacing the cluster; only `tags` can be updated in place",
                    replaced.join(", ")
                ),
            ));
        }

        let id = require_id(&prior, "cluster")?.to_string();
        let mut plan = plan;
        schema.carry_unknown_from_state(&prior, &mut plan);
        let tags = decode::<TagsPlan>("cluster plan", &plan)
            .map_err(|e| Diagnostics::error("Invalid cluster plan", e.to_string()))?
            .tags
            .unwrap_or_default();

        let cluster = self
            .client
            .update_cluster(&id, &MdsClusterUpdateRequest { tags })
            .await
            .map_err(|e| {
                Diagnostics::error(
                    "Updating MDS Cluster",
                    format!("Could not update cluster, unexpected error: {e}"),
                )
            })?;

        let cluster = match classify_cluster_status(&cluster.status) {
            StatusClass::Success => cluster,
            StatusClass::Failure => {
                return Err(Diagnostics::error(
                    "Updating MDS Cluster",
                    format!("Cluster {id} update failed with the status '{}'", cluster.status),
                ));
            }
            StatusClass::Pending => wait_for_cluster(&self.client, &self.poll, &id).await?,
        };

        self.projection.apply(&cluster, &mut plan);

        tracing::info!(%id, "END__Update cluster");
        Ok(plan)
    }

    async fn delete(&self, state: StateObject) -> Result<(), Diagnostics> {
        tracing::info!("INIT__Delete cluster");
        let id = require_id(&state, "cluster")?;

        self.client.delete_cluster(id).await.map_err(|e| {
            Diagnostics::error(
                "Deleting MDS Cluster",
                format!("Could not delete MDS cluster by ID {id}: {e}"),
            )
        })?;

        let policy = self.poll.with_initial_delay(self.poll.interval);
        let client = &*self.client;
        let outcome = poll_until_deleted(&policy, || client.get_cluster(id), classify_cluster_status).await;

        match outcome.into_result(&policy) {
            Ok(_) => {
                tracing::info!(%id, "END__Delete cluster");
                Ok(())
            }
            Err(e) => Err(poll_diagnostics(id, &e)),
        }
    }
}

fn cluster_projection() -> Result<Projection<MdsCluster>, StateError> {
    Projection::builder()
        .field("id", |c: &MdsCluster| string_value(&c.id))
        .field("org_id", |c: &MdsCluster| string_value(&c.org_id))
        .field("name", |c: &MdsCluster| string_value(&c.name))
        .field("service_type", |c: &MdsCluster| string_value(&c.service_type))
        .field("cloud_provider", |c: &MdsCluster| string_value(&c.provider))
        .field("instance_size", |c: &MdsCluster| string_value(&c.instance_size))
        .field("region", |c: &MdsCluster| string_value(&c.region))
        .field("status", |c: &MdsCluster| string_value(&c.status))
        .field("data_plane_id", |c: &MdsCluster| string_value(&c.data_plane_id))
        .field("last_updated", |c: &MdsCluster| string_value(&c.last_updated))
        .field("created", |c: &MdsCluster| string_value(&c.created))
        .field("tags", |c: &MdsCluster| set_value(&c.tags))
        .field("metadata", metadata_value)
        .build()
}

fn metadata_value(cluster: &MdsCluster) -> Value {
    let metadata = cluster.metadata.clone().unwrap_or_default();
    json!({
        "manager_uri": metadata.manager_uri,
        "connection_uri": metadata.connection_uri,
        "metrics_endpoints": list_value(&metadata.metrics_endpoints),
    })
}

fn cluster_schema() -> Schema {
    let metadata = [
        (
            "manager_uri",
            Attribute::computed(AttributeKind::String)
                .describe("URI of the manager. Specific to `RABBITMQ` service."),
        ),
        (
            "connection_uri",
            Attribute::computed(AttributeKind::String)
                .describe("Connection URI to the instance. Specific to `RABBITMQ` service."),
        ),
        (
            "metrics_endpoints",
            Attribute::computed(AttributeKind::StringList)
                .describe("List of metrics endpoints exposed on the instance. Specific to `RABBITMQ` service."),
        ),
    ]
    .into_iter()
    .collect();

    Schema::new(
        "Represents a service instance or cluster. Some attributes are used only once for creation, \
         they are: `dedicated`, `network_policy_ids`.\nChanging only `tags` is supported at the moment. \
         To update the network policies associated with it, use `vmds_cluster_network_policies_association`.",
    )
    .attribute(
        "id",
        Attribute::computed(AttributeKind::String)
            .describe("ID of the cluster.")
            .use_state_for_unknown(),
    )
    .attribute(
        "org_id",
        Attribute::computed(AttributeKind::String)
            .describe("ID of the Org which owns the cluster.")
            .use_state_for_unknown(),
    )
    .attribute(
        "name",
        Attribute::required(AttributeKind::String)
            .describe("Name of the cluster.")
            .use_state_for_unknown(),
    )
    .attribute(
        "service_type",
        Attribute::optional_computed(AttributeKind::String)
            .describe(service_type_description())
            .with_default(Value::from(SERVICE_TYPE_RABBITMQ))
            .use_state_for_unknown(),
    )
    .attribute(
        "cloud_provider",
        Attribute::required(AttributeKind::String)
            .describe("Short-code of provider to use for data-plane. Ex: `aws`, `gcp` .")
            .use_state_for_unknown(),
    )
    .attribute(
        "instance_size",
        Attribute::required(AttributeKind::String)
            .describe("Size of instance. Supported values are: `XX-SMALL`, `X-SMALL`, `SMALL`, `LARGE`, `XX-LARGE`.")
            .use_state_for_unknown(),
    )
    .attribute(
        "region",
        Attribute::required(AttributeKind::String)
            .describe("Region of data plane. Ex: `eu-west-2`, `us-east-2` etc.")
            .use_state_for_unknown()
            .requires_replace(),
    )
    .attribute(
        "dedicated",
        Attribute::optional(AttributeKind::Bool).describe(
            "If present and set to `true`, the cluster will get deployed on a dedicated data-plane in current Org.",
        ),
    )
    .attribute(
        "shared",
        Attribute::optional(AttributeKind::Bool).describe(
            "If present and set to `true`, the cluster will get deployed on a shared data-plane in current Org.",
        ),
    )
    .attribute(
        "tags",
        Attribute::optional(AttributeKind::StringSet)
            .describe("Set of tags or labels to categorise the cluster."),
    )
    .attribute(
        "network_policy_ids",
        Attribute::required(AttributeKind::StringSet)
            .describe("IDs of network policies to attach to the cluster.")
            .use_state_for_unknown(),
    )
    .attribute(
        "status",
        Attribute::computed(AttributeKind::String).describe("Status of the cluster."),
    )
    .attribute(
        "data_plane_id",
        Attribute::optional_computed(AttributeKind::String)
            .describe(
                "ID of the data-plane where the cluster is running. \
                 Required when creating a cluster self-hosted via BYO Cloud.",
            )
            .use_state_for_unknown(),
    )
    .attribute(
        "last_updated",
        Attribute::computed(AttributeKind::String).describe("Time when the cluster was last modified."),
    )
    .attribute(
        "created",
        Attribute::computed(AttributeKind::String)
            .describe("Creation time of the cluster.")
            .use_state_for_unknown(),
    )
    .attribute(
        "metadata",
        Attribute::computed(AttributeKind::Object(metadata))
            .describe("Additional info of the cluster.")
            .use_state_for_unknown(),
    )
}

const fn service_type_description() -> &'static str {
    "Type of MDS Cluster to be created. Supported values: `RABBITMQ`, `POSTGRES`, `MYSQL`, `REDIS`.\n Default is `RABBITMQ`."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds_model::SUPPORTED_SERVICE_TYPES;

    fn obj(value: Value) -> StateObject {
        match value {
            Value::Object(obj) => obj,
            _ => StateObject::new(),
        }
    }

    fn cluster() -> MdsCluster {
        MdsCluster {
            id: "c-1".into(),
            org_id: "org-1".into(),
            name: "orders".into(),
            service_type: "RABBITMQ".into(),
            provider: "aws".into(),
            instance_size: "XX-SMALL".into(),
            region: "eu-west-2".into(),
            status: "READY".into(),
            tags: vec!["prod".into(), "eu".into()],
            ..Default::default()
        }
    }

    #[test]
    fn classifier_covers_terminal_statuses() {
        assert_eq!(classify_cluster_status("READY"), StatusClass::Success);
        assert_eq!(classify_cluster_status("FAILED"), StatusClass::Failure);
        assert_eq!(classify_cluster_status("DEPLOYING"), StatusClass::Pending);
        assert_eq!(classify_cluster_status(""), StatusClass::Pending);
    }

    #[test]
    fn projection_covers_every_computed_attribute() {
        let Ok(projection) = cluster_projection() else {
            panic!("projection should build");
        };
        let projected: Vec<_> = projection.attributes().collect();
        for (name, attr) in &cluster_schema().attributes {
            if attr.computed {
                assert!(projected.contains(name), "{name} is not projected");
            }
        }
    }

    #[test]
    fn missing_metadata_maps_to_empty_object() {
        let Ok(projection) = cluster_projection() else {
            panic!("projection should build");
        };
        let state = projection.project(&cluster());
        assert_eq!(
            state["metadata"],
            json!({"manager_uri": "", "connection_uri": "", "metrics_endpoints": []})
        );
        assert_eq!(state["tags"], json!(["eu", "prod"]));
        assert_eq!(state["cloud_provider"], json!("aws"));
    }

    #[test]
    fn projected_state_validates_against_schema() {
        let Ok(projection) = cluster_projection() else {
            panic!("projection should build");
        };
        let mut state = obj(json!({
            "network_policy_ids": ["np-1"],
            "dedicated": true,
        }));
        projection.apply(&cluster(), &mut state);
        assert!(!cluster_schema().validate_config(&state).has_error());
    }

    #[test]
    fn plan_converts_to_create_request() {
        let plan = obj(json!({
            "name": "orders",
            "cloud_provider": "aws",
            "instance_size": "XX-SMALL",
            "region": "eu-west-2",
            "network_policy_ids": ["np-1"],
            "status": null,
        }));
        let Ok(plan) = decode::<ClusterPlan>("cluster plan", &plan) else {
            panic!("plan should decode");
        };
        let request = plan.into_request();
        assert_eq!(request.service_type, "RABBITMQ");
        assert_eq!(request.provider, "aws");
        assert!(!request.dedicated);
        assert!(request.tags.is_empty());
        assert_eq!(request.network_policy_ids, vec!["np-1".to_string()]);
    }

    #[test]
    fn description_lists_supported_service_types() {
        for service_type in SUPPORTED_SERVICE_TYPES {
            assert!(service_type_description().contains(&format!("`{service_type}`")));
        }
    }
}
