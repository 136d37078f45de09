//! Read-only data sources: network policies, regions, service roles.
//!
//! Each data source decodes its configuration, issues one query and projects
//! the response on top of the configuration.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::mds_client::MdsClient;
use crate::mds_diagnostics::Diagnostics;
use crate::mds_model::{
    DataPlaneRegionsQuery, MdsPoliciesQuery, MdsPolicy, MdsServiceRole, POLICY_TYPE_NETWORK,
    RegionDataPlanes,
};
use crate::mds_provider::DataSource;
use crate::mds_schema::{Attribute, AttributeKind, Schema};
use crate::mds_state::{Projection, StateError, StateObject, decode, list_value, string_value};

/// ID written by the network policies data source.
pub const NETWORK_POLICIES_ID: &str = "datasource_network_policies";

/// ID written by the regions data source.
pub const REGIONS_ID: &str = "datasource_regions";

const ID_DESCRIPTION: &str =
    "The testing framework requires an id attribute to be present in every data source and resource";

fn read_config<T: serde::de::DeserializeOwned>(
    schema: &Schema,
    what: &'static str,
    config: &StateObject,
) -> Result<T, Diagnostics> {
    schema.validate_config(config).into_result()?;
    decode(what, config).map_err(|e| Diagnostics::error("Invalid configuration", e.to_string()))
}

fn nested(attributes: impl IntoIterator<Item = (&'static str, Attribute)>) -> BTreeMap<&'static str, Attribute> {
    attributes.into_iter().collect()
}

// ============================================================================
// vmds_network_policies
// ============================================================================

#[derive(Debug, Deserialize)]
struct NetworkPoliciesConfig {
    #[serde(default)]
    names: Option<Vec<String>>,
}

/// The `vmds_network_policies` data source.
pub struct NetworkPoliciesDataSource {
    client: Arc<MdsClient>,
    projection: Projection<Vec<MdsPolicy>>,
}

impl NetworkPoliciesDataSource {
    /// Create the data source around a shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state projection is inconsistent.
    pub fn new(client: Arc<MdsClient>) -> Result<Self, StateError> {
        let projection = Projection::builder()
            .field("id", |_: &Vec<MdsPolicy>| string_value(NETWORK_POLICIES_ID))
            .field("policies", |policies: &Vec<MdsPolicy>| {
                Value::Array(
                    policies
                        .iter()
                        .map(|p| json!({"id": p.id, "name": p.name}))
                        .collect(),
                )
            })
            .build()?;
        Ok(Self { client, projection })
    }
}

#[async_trait]
impl DataSource for NetworkPoliciesDataSource {
    fn type_name(&self) -> &'static str {
        "network_policies"
    }

    fn schema(&self) -> Schema {
        Schema::new("Lists network policies, optionally filtered by name.")
            .attribute("names", Attribute::optional(AttributeKind::StringSet))
            .attribute("id", Attribute::computed(AttributeKind::String).describe(ID_DESCRIPTION))
            .attribute(
                "policies",
                Attribute::optional_computed(AttributeKind::ListNested(nested([
                    ("id", Attribute::computed(AttributeKind::String)),
                    ("name", Attribute::optional_computed(AttributeKind::String)),
                ]))),
            )
    }

    async fn read(&self, config: StateObject) -> Result<StateObject, Diagnostics> {
        let cfg: NetworkPoliciesConfig = read_config(&self.schema(), "network policies configuration", &config)?;
        let query = MdsPoliciesQuery {
            policy_type: POLICY_TYPE_NETWORK.to_string(),
            names: cfg.names.unwrap_or_default(),
        };

        let policies = self
            .client
            .get_policies(&query)
            .await
            .map_err(|e| Diagnostics::error("Unable to Read MDS Network Policies", e.to_string()))?;
        tracing::debug!(count = policies.len(), "network policies fetched");

        let mut state = config;
        self.projection.apply(&policies, &mut state);
        Ok(state)
    }
}

// ============================================================================
// vmds_regions
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegionsConfig {
    cpu: String,
    cloud_provider: String,
    memory: String,
    storage: String,
    node_count: String,
    #[serde(default)]
    dedicated_data_plane: Option<bool>,
}

/// The `vmds_regions` data source.
pub struct RegionsDataSource {
    client: Arc<MdsClient>,
    projection: Projection<RegionDataPlanes>,
}

impl RegionsDataSource {
    /// Create the data source around a shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state projection is inconsistent.
    pub fn new(client: Arc<MdsClient>) -> Result<Self, StateError> {
        let projection = Projection::builder()
            .field("id", |_: &RegionDataPlanes| string_value(REGIONS_ID))
            .field("regions", regions_value)
            .build()?;
        Ok(Self { client, projection })
    }
}

/// Regions in name order; the map is already sorted.
fn regions_value(regions: &RegionDataPlanes) -> Value {
    Value::Array(
        regions
            .iter()
            .map(|(name, data_plane_ids)| {
                json!({
                    "id": name,
                    "name": name,
                    "data_plane_ids": list_value(data_plane_ids),
                })
            })
            .collect(),
    )
}

#[async_trait]
impl DataSource for RegionsDataSource {
    fn type_name(&self) -> &'static str {
        "regions"
    }

    fn schema(&self) -> Schema {
        Schema::new("Lists regions whose data planes can host the requested footprint.")
            .attribute("cpu", Attribute::required(AttributeKind::String))
            .attribute("cloud_provider", Attribute::required(AttributeKind::String))
            .attribute("memory", Attribute::required(AttributeKind::String))
            .attribute("storage", Attribute::required(AttributeKind::String))
            .attribute("node_count", Attribute::required(AttributeKind::String))
            .attribute("dedicated_data_plane", Attribute::optional(AttributeKind::Bool))
            .attribute("id", Attribute::computed(AttributeKind::String).describe(ID_DESCRIPTION))
            .attribute(
                "regions",
                Attribute::computed(AttributeKind::ListNested(nested([
                    ("id", Attribute::computed(AttributeKind::String)),
                    ("name", Attribute::computed(AttributeKind::String)),
                    ("data_plane_ids", Attribute::computed(AttributeKind::StringList)),
                ]))),
            )
    }

    async fn read(&self, config: StateObject) -> Result<StateObject, Diagnostics> {
        let cfg: RegionsConfig = read_config(&self.schema(), "regions configuration", &config)?;
        let org_id = if cfg.dedicated_data_plane.unwrap_or(false) {
            self.client.config().org_id.clone()
        } else {
            None
        };
        let query = DataPlaneRegionsQuery {
            cpu: cfg.cpu,
            memory: cfg.memory,
            storage: cfg.storage,
            node_count: cfg.node_count,
            provider: cfg.cloud_provider,
            org_id,
        };

        let regions = self
            .client
            .get_regions_with_data_planes(&query)
            .await
            .map_err(|e| Diagnostics::error("Unable to Read MDS Regions", e.to_string()))?;
        tracing::debug!(count = regions.len(), "regions fetched");

        let mut state = config;
        self.projection.apply(&regions, &mut state);
        Ok(state)
    }
}

// ============================================================================
// vmds_service_roles
// ============================================================================

#[derive(Debug, Deserialize)]
struct ServiceRolesConfig {
    #[serde(rename = "type")]
    service_type: String,
}

/// The `vmds_service_roles` data source.
pub struct ServiceRolesDataSource {
    client: Arc<MdsClient>,
    projection: Projection<Vec<MdsServiceRole>>,
}

impl ServiceRolesDataSource {
    /// Create the data source around a shared client.
    ///
    /// # Errors
    ///
    /// Returns an error if the state projection is inconsistent.
    pub fn new(client: Arc<MdsClient>) -> Result<Self, StateError> {
        let projection = Projection::builder()
            .field("roles", |roles: &Vec<MdsServiceRole>| {
                Value::Array(roles.iter().map(role_value).collect())
            })
            .build()?;
        Ok(Self { client, projection })
    }
}

fn role_value(role: &MdsServiceRole) -> Value {
    let permissions: Vec<Value> = role
        .permissions
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "description": p.description,
                "permission_id": p.permission_id,
            })
        })
        .collect();
    json!({
        "role_id": role.role_id,
        "name": role.name,
        "description": role.description,
        "type": role.role_type,
        "permissions": permissions,
    })
}

#[async_trait]
impl DataSource for ServiceRolesDataSource {
    fn type_name(&self) -> &'static str {
        "service_roles"
    }

    fn schema(&self) -> Schema {
        let permission = nested([
            ("description", Attribute::computed(AttributeKind::String)),
            ("name", Attribute::computed(AttributeKind::String)),
            ("permission_id", Attribute::computed(AttributeKind::String)),
        ]);
        Schema::new("Lists the roles of a service type and the permissions each grants.")
            .attribute(
                "type",
                Attribute::required(AttributeKind::String).describe("Service type, e.g. `RABBITMQ`."),
            )
            .attribute(
                "roles",
                Attribute::computed(AttributeKind::ListNested(nested([
                    ("role_id", Attribute::computed(AttributeKind::String)),
                    ("name", Attribute::computed(AttributeKind::String)),
                    ("description", Attribute::computed(AttributeKind::String)),
                    ("type", Attribute::computed(AttributeKind::String)),
                    ("permissions", Attribute::computed(AttributeKind::ListNested(permission))),
                ]))),
            )
    }

    async fn read(&self, config: StateObject) -> Result<StateObject, Diagnostics> {
        tracing::info!("INIT__Read service roles");
        let cfg: ServiceRolesConfig = read_config(&self.schema(), "service roles configuration", &config)?;

        let groups = self
            .client
            .get_service_roles(&cfg.service_type)
            .await
            .map_err(|e| Diagnostics::error("Unable to Read MDS Service roles", e.to_string()))?;
        let roles: Vec<MdsServiceRole> = groups.into_iter().flat_map(|g| g.roles).collect();

        let mut state = config;
        self.projection.apply(&roles, &mut state);

        tracing::info!(service_type = %cfg.service_type, roles = roles.len(), "END__Read service roles");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mds_model::MdsServiceRolePermission;

    fn permission(id: &str) -> MdsServiceRolePermission {
        MdsServiceRolePermission {
            permission_id: id.into(),
            name: format!("perm-{id}"),
            description: String::new(),
        }
    }

    #[test]
    fn regions_are_listed_by_name() {
        let mut regions = RegionDataPlanes::new();
        regions.insert("us-east-2".into(), vec!["dp-2".into()]);
        regions.insert("eu-west-2".into(), vec!["dp-9".into(), "dp-1".into()]);

        assert_eq!(
            regions_value(&regions),
            json!([
                {"id": "eu-west-2", "name": "eu-west-2", "data_plane_ids": ["dp-9", "dp-1"]},
                {"id": "us-east-2", "name": "us-east-2", "data_plane_ids": ["dp-2"]},
            ])
        );
    }

    #[test]
    fn each_role_keeps_its_own_permissions() {
        let roles = [
            MdsServiceRole {
                role_id: "r-1".into(),
                role_type: "RABBITMQ".into(),
                permissions: vec![permission("p-1")],
                ..Default::default()
            },
            MdsServiceRole {
                role_id: "r-2".into(),
                permissions: vec![permission("p-2"), permission("p-3")],
                ..Default::default()
            },
        ];
        let values: Vec<Value> = roles.iter().map(role_value).collect();

        assert_eq!(values[0]["type"], json!("RABBITMQ"));
        assert_eq!(values[0]["permissions"].as_array().map(Vec::len), Some(1));
        assert_eq!(values[1]["permissions"].as_array().map(Vec::len), Some(2));
        assert_eq!(values[1]["permissions"][1]["permission_id"], json!("p-3"));
    }
}
