//! Gateway to the clustered document store
//!
//! The orchestrator consumes two capabilities of the cluster: the snapshot
//! repository API (list and restore) and the live-index API (list, delete,
//! health). [`ClusterGateway`] is the seam; [`ElasticsearchGateway`] speaks
//! HTTP to a real cluster and [`InMemoryCluster`] backs tests.

mod http;
mod memory;

pub use http::{ElasticsearchGateway, GatewayConfig};
pub use memory::InMemoryCluster;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur talking to the cluster
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// Connection could not be made or was cut
    #[error("Request to {endpoint} failed: {message}")]
    Transport {
        /// Path that was requested
        endpoint: String,
        /// Underlying client error
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Could not decode response from {endpoint}: {message}")]
    Decode {
        /// Path that was requested
        endpoint: String,
        /// Decoder error
        message: String,
    },

    /// Non-success HTTP status
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Path that was requested
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// No answer within the call's time bound
    #[error("Request to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// Path that was requested
        endpoint: String,
        /// Bound that was exceeded
        timeout: Duration,
    },
}

impl ClusterError {
    /// True for [`ClusterError::Timeout`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::Timeout { .. })
    }
}

/// Completion state of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    /// `SUCCESS`
    Success,
    /// Any other state, kept verbatim
    Other(String),
}

impl From<&str> for SnapshotState {
    fn from(value: &str) -> Self {
        if value == "SUCCESS" {
            SnapshotState::Success
        } else {
            SnapshotState::Other(value.to_string())
        }
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotState::Success => f.write_str("SUCCESS"),
            SnapshotState::Other(state) => f.write_str(state),
        }
    }
}

/// One snapshot stored in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Repository the snapshot lives in
    pub repository: String,
    /// Snapshot name
    pub snapshot: String,
    /// Index names captured by the snapshot
    pub indices: BTreeSet<String>,
    /// Completion state
    pub state: SnapshotState,
}

impl SnapshotRecord {
    /// Build a record from any iterable of index names
    pub fn new<I, S>(
        repository: impl Into<String>,
        snapshot: impl Into<String>,
        indices: I,
        state: SnapshotState,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            repository: repository.into(),
            snapshot: snapshot.into(),
            indices: indices.into_iter().map(Into::into).collect(),
            state,
        }
    }

    /// Exact, case-sensitive membership test
    pub fn contains_index(&self, name: &str) -> bool {
        self.indices.contains(name)
    }
}

/// Open/closed state of a live index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenState {
    /// `open`
    Open,
    /// Any other state, kept verbatim
    Other(String),
}

impl From<&str> for OpenState {
    fn from(value: &str) -> Self {
        if value == "open" {
            OpenState::Open
        } else {
            OpenState::Other(value.to_string())
        }
    }
}

impl fmt::Display for OpenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenState::Open => f.write_str("open"),
            OpenState::Other(state) => f.write_str(state),
        }
    }
}

/// Health color reported for a live index or the whole cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// All shards allocated
    Green,
    /// Primaries allocated, some replicas missing
    Yellow,
    /// Some primaries unallocated
    Red,
    /// Unrecognized color, kept verbatim
    Other(String),
}

impl From<&str> for Health {
    fn from(value: &str) -> Self {
        match value {
            "green" => Health::Green,
            "yellow" => Health::Yellow,
            "red" => Health::Red,
            other => Health::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Green => f.write_str("green"),
            Health::Yellow => f.write_str("yellow"),
            Health::Red => f.write_str("red"),
            Health::Other(health) => f.write_str(health),
        }
    }
}

/// One index currently present on the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndexRecord {
    /// Bare index name
    pub name: String,
    /// Whether the index is open
    pub open_state: OpenState,
    /// Index health color
    pub health: Health,
}

impl LiveIndexRecord {
    /// Build a record from its parts
    pub fn new(name: impl Into<String>, open_state: OpenState, health: Health) -> Self {
        Self {
            name: name.into(),
            open_state,
            health,
        }
    }

    /// Open index with the given health
    pub fn open(name: impl Into<String>, health: Health) -> Self {
        Self::new(name, OpenState::Open, health)
    }
}

/// Shard accounting of a completed restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardCounts {
    /// Shards the restore covered
    pub total: u32,
    /// Shards that failed to restore
    pub failed: u32,
    /// Shards restored successfully
    pub successful: u32,
}

/// Result reported by a synchronous restore call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Snapshot restored from
    pub snapshot: String,
    /// Index names the restore produced
    pub indices: Vec<String>,
    /// Shard accounting
    pub shards: ShardCounts,
}

/// Cluster-wide health summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHealth {
    /// Name the cluster reports for itself
    pub cluster_name: String,
    /// Overall health color
    pub status: Health,
}

/// Capabilities the orchestrator needs from the cluster.
///
/// `repository_path` is the `repository/snapshot` part of an
/// [`IndexIdentifier`](crate::index::IndexIdentifier); `index` is its bare
/// index name.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// List snapshots stored under `repository_path`
    async fn list_snapshots(&self, repository_path: &str)
        -> Result<Vec<SnapshotRecord>, ClusterError>;

    /// List indices currently present on the cluster
    async fn list_indices(&self) -> Result<Vec<LiveIndexRecord>, ClusterError>;

    /// Restore `index` from `repository_path`, waiting for completion
    async fn restore_index(
        &self,
        repository_path: &str,
        index: &str,
    ) -> Result<RestoreOutcome, ClusterError>;

    /// Delete a live index by bare name
    async fn delete_index(&self, index: &str) -> Result<(), ClusterError>;

    /// Fetch cluster-wide health
    async fn cluster_health(&self) -> Result<ClusterHealth, ClusterError>;
}
