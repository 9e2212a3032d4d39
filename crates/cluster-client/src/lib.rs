//! Cluster Client
//!
//! Object-store access for the machine lifecycle controller: reads and status
//! writes for `Machine` resources, and the narrow set of reads and patches the
//! controller performs on core/v1 `Node` objects.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClusterClient::new(kube::Client::try_default().await?);
//!
//! let machine = client.get_machine("default-x7k2p").await?;
//! let nodes = client.list_nodes_by_provider_id("aws:///us-west-2a/i-0abc").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Optimistic concurrency**: status and taint writes carry the
//!   `resourceVersion` they were computed from
//! - **Typed errors**: `NotFound` and `Conflict` are split out of API errors
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{ClusterClient, matching_nodes, status_patch};
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, WriteCounters};
