//! Command-line driver for the `vmds_provider` library.
//!
//! Runs one provider operation and prints the resulting state as JSON.
//!
//! ## Usage
//!
//! 1. Create a `.env` file with `MDS_HOST` and `MDS_API_TOKEN`
//! 2. Run: `cargo run -- regions --cpu 0.5 --memory 1Gi --storage 10Gi --node-count 1 --cloud-provider aws`
//!
//! Set `RUST_LOG=vmds_provider=debug` to follow the polling.

#![allow(clippy::print_stdout)] // Allow println! in the binary

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use vmds_provider::{MdsProvider, MdsProviderConfig, StateObject};

#[derive(Parser)]
#[command(name = "vmds")]
#[command(about = "Manage MDS clusters from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List regions able to host a cluster footprint
    Regions {
        /// CPU requirement, e.g. 0.5
        #[arg(long)]
        cpu: String,
        /// Memory requirement, e.g. 1Gi
        #[arg(long)]
        memory: String,
        /// Storage requirement, e.g. 10Gi
        #[arg(long)]
        storage: String,
        /// Number of nodes
        #[arg(long, default_value = "1")]
        node_count: String,
        /// Cloud provider short-code, e.g. aws
        #[arg(long)]
        cloud_provider: String,
        /// Only dedicated data planes of the configured org
        #[arg(long)]
        dedicated: bool,
    },
    /// List network policies
    NetworkPolicies {
        /// Restrict to these policy names
        #[arg(long = "name")]
        names: Vec<String>,
    },
    /// List the roles of a service type
    ServiceRoles {
        /// Service type
        #[arg(long = "type", default_value = "RABBITMQ")]
        service_type: String,
    },
    /// Cluster lifecycle commands
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
    /// Replace the network policies attached to a cluster
    Associate {
        /// Cluster ID
        cluster_id: String,
        /// Network policy IDs to attach
        #[arg(long = "policy-id")]
        policy_ids: Vec<String>,
    },
    /// Print the attribute schema of a resource or data source
    Schema {
        /// Full type name, e.g. vmds_cluster
        type_name: String,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Create a cluster and wait until it is ready
    Create {
        /// Cluster name
        #[arg(long)]
        name: String,
        /// Service type
        #[arg(long)]
        service_type: Option<String>,
        /// Cloud provider short-code
        #[arg(long)]
        cloud_provider: String,
        /// Instance size, e.g. XX-SMALL
        #[arg(long)]
        instance_size: String,
        /// Data-plane region
        #[arg(long)]
        region: String,
        /// Deploy on a dedicated data plane
        #[arg(long)]
        dedicated: bool,
        /// Tags
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Network policy IDs to attach
        #[arg(long = "policy-id")]
        network_policy_ids: Vec<String>,
    },
    /// Show a cluster
    Get {
        /// Cluster ID
        id: String,
    },
    /// Replace the tags of a cluster
    Tag {
        /// Cluster ID
        id: String,
        /// Tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a cluster and wait until it is gone
    Delete {
        /// Cluster ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let provider = MdsProvider::new(MdsProviderConfig::from_env()?)?;

    let output: Value = match cli.command {
        Commands::Regions {
            cpu,
            memory,
            storage,
            node_count,
            cloud_provider,
            dedicated,
        } => {
            let config = json!({
                "cpu": cpu,
                "memory": memory,
                "storage": storage,
                "node_count": node_count,
                "cloud_provider": cloud_provider,
                "dedicated_data_plane": dedicated,
            });
            read_data_source(&provider, "vmds_regions", config).await?.into()
        }
        Commands::NetworkPolicies { names } => {
            let names = if names.is_empty() { Value::Null } else { json!(names) };
            read_data_source(&provider, "vmds_network_policies", json!({ "names": names }))
                .await?
                .into()
        }
        Commands::ServiceRoles { service_type } => {
            read_data_source(&provider, "vmds_service_roles", json!({ "type": service_type }))
                .await?
                .into()
        }
        Commands::Cluster { command } => run_cluster(&provider, command).await?.into(),
        Commands::Associate {
            cluster_id,
            policy_ids,
        } => {
            let resource = resource(&provider, "vmds_cluster_network_policies_association")?;
            let plan = object(json!({ "id": cluster_id, "policy_ids": policy_ids }));
            resource.create(plan).await?.into()
        }
        Commands::Schema { type_name } => schema(&provider, &type_name)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_cluster(
    provider: &MdsProvider,
    command: ClusterCommands,
) -> Result<StateObject, Box<dyn std::error::Error>> {
    let cluster = resource(provider, "vmds_cluster")?;

    let state = match command {
        ClusterCommands::Create {
            name,
            service_type,
            cloud_provider,
            instance_size,
            region,
            dedicated,
            tags,
            network_policy_ids,
        } => {
            let plan = object(json!({
                "name": name,
                "service_type": service_type,
                "cloud_provider": cloud_provider,
                "instance_size": instance_size,
                "region": region,
                "dedicated": dedicated,
                "tags": tags,
                "network_policy_ids": network_policy_ids,
            }));
            cluster.create(plan).await?
        }
        ClusterCommands::Get { id } => cluster.read(cluster.import_state(&id)?).await?,
        ClusterCommands::Tag { id, tags } => {
            let prior = cluster.read(cluster.import_state(&id)?).await?;
            let mut plan = prior.clone();
            plan.insert("tags".to_string(), json!(tags));
            cluster.update(prior, plan).await?
        }
        ClusterCommands::Delete { id } => {
            cluster.delete(cluster.import_state(&id)?).await?;
            object(json!({ "id": id, "deleted": true }))
        }
    };

    Ok(state)
}

async fn read_data_source(
    provider: &MdsProvider,
    type_name: &str,
    config: Value,
) -> Result<StateObject, Box<dyn std::error::Error>> {
    let data_source = provider
        .data_source(type_name)
        .ok_or_else(|| format!("unknown data source {type_name}"))?;
    Ok(data_source.read(object(config)).await?)
}

fn schema(provider: &MdsProvider, type_name: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let schema = match (provider.resource(type_name), provider.data_source(type_name)) {
        (Some(resource), _) => resource.schema(),
        (None, Some(data_source)) => data_source.schema(),
        (None, None) => return Err(format!("unknown type {type_name}").into()),
    };
    Ok(serde_json::to_value(schema)?)
}

fn resource<'a>(
    provider: &'a MdsProvider,
    type_name: &str,
) -> Result<&'a dyn vmds_provider::Resource, Box<dyn std::error::Error>> {
    provider
        .resource(type_name)
        .ok_or_else(|| format!("unknown resource {type_name}").into())
}

fn object(value: Value) -> StateObject {
    match value {
        Value::Object(obj) => obj,
        _ => StateObject::new(),
    }
}
