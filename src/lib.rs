//! `vmds` provider - declarative management of MDS clusters.
//!
//! A library for driving the MDS control plane the way an infrastructure
//! provider does:
//! - **Client**: typed REST access to clusters, policies, regions and service roles
//! - **Poller**: bounded waits until a cluster reaches `READY`/`FAILED` or disappears
//! - **State mapping**: projection of API snapshots into JSON state objects
//! - **Resources**: `vmds_cluster`, `vmds_cluster_network_policies_association`
//! - **Data sources**: `vmds_network_policies`, `vmds_regions`, `vmds_service_roles`
//!
//! ## Quick Start
//!
//! All configuration is loaded from environment variables. Create a `.env` file:
//!
//! ```text
//! MDS_HOST=https://console.mds.example.com
//! MDS_API_TOKEN=your_api_token_here
//! MDS_ORG_ID=your_org_id
//! ```
//!
//! Then build the provider and drive a resource:
//!
//! ```ignore
//! use serde_json::json;
//! use vmds_provider::{MdsProvider, MdsProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = MdsProvider::new(MdsProviderConfig::from_env()?)?;
//!     let cluster = provider.resource("vmds_cluster").ok_or("unknown resource")?;
//!
//!     let plan = json!({
//!         "name": "orders",
//!         "cloud_provider": "aws",
//!         "instance_size": "XX-SMALL",
//!         "region": "eu-west-2",
//!         "network_policy_ids": ["np-1"],
//!     });
//!     let serde_json::Value::Object(plan) = plan else { unreachable!() };
//!
//!     let state = cluster.create(plan).await?;
//!     println!("cluster {} is {}", state["id"], state["status"]);
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy for strict discipline
#![deny(clippy::all)]                 // All standard Clippy lints
#![deny(clippy::pedantic)]            // Very strict Clippy lints
#![deny(clippy::nursery)]             // Experimental lints
#![deny(clippy::unwrap_used)]         // unwrap() is forbidden
#![deny(clippy::expect_used)]         // expect() is forbidden
#![deny(clippy::panic)]               // panic!() is forbidden
#![deny(clippy::print_stdout)]        // println!() is forbidden in production
#![deny(clippy::todo)]                // TODO is forbidden
#![deny(clippy::unimplemented)]       // unimplemented!() is forbidden
#![deny(clippy::missing_const_for_fn)] // Force const when possible
#![deny(clippy::unwrap_in_result)]    // unwrap() in Result is forbidden
#![deny(clippy::module_inception)]    // Module with same name as crate is forbidden
#![deny(clippy::redundant_clone)]     // Useless clones are forbidden
#![deny(clippy::shadow_unrelated)]    // Shadowing unrelated variables is forbidden
#![deny(clippy::too_many_arguments)]  // Limit function arguments
#![deny(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Tests assert through panics
#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

// ============================================================================
// Modules
// ============================================================================

/// Diagnostics reported by lifecycle operations.
pub mod mds_diagnostics;

/// MDS control-plane API shapes.
pub mod mds_model;

/// Bounded status polling.
///
/// Use this module to wait until a remote entity settles or disappears.
pub mod mds_poller;

/// REST client for the MDS control plane.
///
/// Use this module for typed, single-request access to the API.
pub mod mds_client;

/// Projection of API snapshots into state objects.
pub mod mds_state;

/// Attribute schemas, validation and defaults.
pub mod mds_schema;

/// Provider composition: configuration, client sharing, type registry.
pub mod mds_provider;

/// The `vmds_cluster` resource.
pub mod mds_cluster;

/// The `vmds_cluster_network_policies_association` resource.
pub mod mds_cluster_network_policies;

/// The `vmds_network_policies`, `vmds_regions` and `vmds_service_roles` data sources.
pub mod mds_data_sources;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use mds_client::{MdsClient, MdsClientConfig, MdsClientError};
pub use mds_diagnostics::{Diagnostic, Diagnostics, Severity};
pub use mds_poller::{PollOutcome, PollPolicy, StatusClass, poll_until_deleted, poll_until_settled};
pub use mds_provider::{DataSource, MdsProvider, MdsProviderConfig, ProviderError, Resource};
pub use mds_state::{Projection, StateObject};
