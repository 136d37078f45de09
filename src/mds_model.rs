//! MDS control-plane API shapes.
//!
//! Request bodies, query filters and response payloads exchanged with the
//! MDS REST API. Field names follow the API's camelCase JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cluster status reported when provisioning has completed.
pub const CLUSTER_STATUS_READY: &str = "READY";

/// Cluster status reported when provisioning has failed.
pub const CLUSTER_STATUS_FAILED: &str = "FAILED";

/// Default service type of a cluster.
pub const SERVICE_TYPE_RABBITMQ: &str = "RABBITMQ";

/// Service types accepted by the control plane.
pub const SUPPORTED_SERVICE_TYPES: &[&str] = &["RABBITMQ", "POSTGRES", "MYSQL", "REDIS"];

/// Policy type of network policies.
pub const POLICY_TYPE_NETWORK: &str = "NETWORK";

// ============================================================================
// Clusters
// ============================================================================

/// A cluster as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsCluster {
    /// Cluster ID.
    pub id: String,
    /// Owning org ID.
    pub org_id: String,
    /// Cluster name.
    pub name: String,
    /// Service type (e.g. `RABBITMQ`).
    pub service_type: String,
    /// Cloud provider short-code (e.g. `aws`).
    pub provider: String,
    /// Instance size (e.g. `XX-SMALL`).
    pub instance_size: String,
    /// Data-plane region.
    pub region: String,
    /// Provisioning status (`READY`, `FAILED`, or a pending value).
    pub status: String,
    /// Data-plane ID hosting the cluster.
    pub data_plane_id: String,
    /// Last modification time.
    pub last_updated: String,
    /// Creation time.
    pub created: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Service-specific connection details.
    pub metadata: Option<MdsClusterMetadata>,
}

/// Service-specific cluster details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsClusterMetadata {
    /// Management UI URI.
    pub manager_uri: String,
    /// Client connection URI.
    pub connection_uri: String,
    /// Metrics endpoints, in the order the service exposes them.
    pub metrics_endpoints: Vec<String>,
}

/// Body of a cluster creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MdsClusterCreateRequest {
    /// Cluster name.
    pub name: String,
    /// Service type.
    pub service_type: String,
    /// Instance size.
    pub instance_size: String,
    /// Cloud provider short-code.
    pub provider: String,
    /// Data-plane region.
    pub region: String,
    /// Deploy on a dedicated data plane of the org.
    pub dedicated: bool,
    /// Deploy on a shared data plane.
    pub shared: bool,
    /// Explicit data-plane (BYO cloud).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data_plane_id: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Network policies to attach.
    pub network_policy_ids: Vec<String>,
}

/// Body of a cluster update request. Only tags are mutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MdsClusterUpdateRequest {
    /// Replacement tag set.
    pub tags: Vec<String>,
}

/// Body of a cluster network-policy association update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MdsClusterNetworkPoliciesUpdateRequest {
    /// Complete list of network policy IDs to keep attached.
    pub network_policy_ids: Vec<String>,
}

/// Filter for listing clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MdsClustersQuery {
    /// Service type.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    /// Cluster name (prefix match unless `full_name_match`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Match `name` exactly.
    pub full_name_match: bool,
}

// ============================================================================
// Policies
// ============================================================================

/// A policy (network or access) as reported by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsPolicy {
    /// Policy ID.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Service type the policy applies to.
    pub service_type: String,
    /// Resources the policy is attached to.
    pub resource_ids: Vec<String>,
    /// Permission specs (access policies).
    pub permissions_spec: Vec<MdsPermissionSpec>,
    /// Network specs (network policies).
    pub network_specs: Vec<MdsNetworkSpec>,
}

/// Permission spec of an access policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsPermissionSpec {
    /// Resource the permissions apply to.
    pub resource: String,
    /// Granted permissions.
    pub permissions: Vec<String>,
    /// Role name.
    pub role: String,
}

/// Network spec of a network policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsNetworkSpec {
    /// Allowed CIDR.
    pub cidr: String,
    /// Allowed network port IDs.
    pub network_port_ids: Vec<String>,
}

/// Filter for listing policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MdsPoliciesQuery {
    /// Policy type (e.g. `NETWORK`).
    pub policy_type: String,
    /// Restrict to these names (empty: all).
    pub names: Vec<String>,
}

impl MdsPoliciesQuery {
    /// Flatten into query pairs; `names` repeats the `name` key.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("type", self.policy_type.clone())];
        pairs.extend(self.names.iter().map(|n| ("name", n.clone())));
        pairs
    }
}

// ============================================================================
// Regions
// ============================================================================

/// Filter for regions with data planes able to host a given footprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneRegionsQuery {
    /// CPU requirement (e.g. `0.5`).
    pub cpu: String,
    /// Memory requirement (e.g. `1Gi`).
    pub memory: String,
    /// Storage requirement (e.g. `10Gi`).
    pub storage: String,
    /// Node count.
    pub node_count: String,
    /// Cloud provider short-code.
    pub provider: String,
    /// Restrict to dedicated data planes of this org.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

/// Region name to the data-plane IDs available in it.
pub type RegionDataPlanes = BTreeMap<String, Vec<String>>;

// ============================================================================
// Service roles
// ============================================================================

/// One group of service roles, per service type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsServiceRoles {
    /// Service type.
    pub service_type: String,
    /// Roles of that service type.
    pub roles: Vec<MdsServiceRole>,
}

/// A service role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsServiceRole {
    /// Role ID.
    pub role_id: String,
    /// Role name.
    pub name: String,
    /// Role description.
    pub description: String,
    /// Role type.
    #[serde(rename = "type")]
    pub role_type: String,
    /// Permissions granted by the role.
    pub permissions: Vec<MdsServiceRolePermission>,
}

/// A permission granted by a service role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MdsServiceRolePermission {
    /// Permission ID.
    pub permission_id: String,
    /// Permission name.
    pub name: String,
    /// Permission description.
    pub description: String,
}

// ============================================================================
// Paged responses
// ============================================================================

/// HAL-style paged collection: `{"_embedded": {"<key>": [...]}, "page": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<E> {
    /// Embedded items; absent when the page is empty.
    #[serde(rename = "_embedded")]
    pub embedded: Option<E>,
    /// Page metadata.
    #[serde(default)]
    pub page: Option<PageInfo>,
}

/// Page metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    /// Page size.
    pub size: u32,
    /// Total number of elements.
    pub total_elements: u64,
    /// Total number of pages.
    pub total_pages: u32,
    /// Current page index.
    pub number: u32,
}

/// Embedded cluster list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddedClusters {
    /// Clusters.
    #[serde(rename = "mdsClusterDTOList")]
    pub clusters: Vec<MdsCluster>,
}

/// Embedded policy list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddedPolicies {
    /// Policies.
    #[serde(rename = "policyDTOList")]
    pub policies: Vec<MdsPolicy>,
}

/// Embedded service-role groups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddedServiceRoles {
    /// Role groups.
    #[serde(rename = "serviceRoleDTO")]
    pub groups: Vec<MdsServiceRoles>,
}

impl<E: Default> Paged<E> {
    /// Take the embedded items, or the empty default when absent.
    #[must_use]
    pub fn into_items(self) -> E {
        self.embedded.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_decodes_with_missing_fields() {
        let raw = r#"{"id":"c-1","name":"orders","status":"DEPLOYING","tags":["a"]}"#;
        let cluster: MdsCluster = serde_json::from_str(raw).unwrap_or_default();
        assert_eq!(cluster.id, "c-1");
        assert_eq!(cluster.status, "DEPLOYING");
        assert!(cluster.metadata.is_none());
        assert!(cluster.region.is_empty());
    }

    #[test]
    fn empty_page_has_no_items() {
        let raw = r#"{"page":{"size":20,"totalElements":0,"totalPages":0,"number":0}}"#;
        let paged: Paged<EmbeddedClusters> =
            serde_json::from_str(raw).unwrap_or(Paged { embedded: None, page: None });
        assert!(paged.into_items().clusters.is_empty());
    }

    #[test]
    fn policies_query_repeats_name_key() {
        let query = MdsPoliciesQuery {
            policy_type: POLICY_TYPE_NETWORK.to_string(),
            names: vec!["allow-office".into(), "allow-vpn".into()],
        };
        let pairs = query.to_pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("type", "NETWORK".to_string()));
        assert_eq!(pairs[2], ("name", "allow-vpn".to_string()));
    }

    #[test]
    fn create_request_omits_empty_data_plane() {
        let body = serde_json::to_value(MdsClusterCreateRequest {
            name: "orders".into(),
            ..Default::default()
        })
        .unwrap_or_default();
        assert!(body.get("dataPlaneId").is_none());
        assert_eq!(body["name"], "orders");
    }
}
