//! # esio
//!
//! Orchestrates the recovery and cleanup of time-partitioned Elasticsearch
//! indices that live in snapshot repositories.
//!
//! ## Overview
//!
//! A client asks whether the indices covering a time window are available.
//! The orchestrator expands the window into index identifiers, verifies that
//! each one can be recovered from its snapshot repository, and reconciles the
//! desired set against the live cluster. Mutating requests enqueue restore or
//! delete work on bounded operation queues that background workers drain
//! under a strict concurrency cap.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use esio::cluster::{ClusterGateway, ElasticsearchGateway, GatewayConfig};
//! use esio::index::{Resolution, TimeRangeIndexer};
//! use esio::orchestrator::{IndexRequest, Orchestrator};
//! use esio::queue::OperationKind;
//! use esio::worker::{OperationService, WorkerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway: Arc<dyn ClusterGateway> =
//!     Arc::new(ElasticsearchGateway::new(GatewayConfig::new("http://localhost:9200"))?);
//!
//! let restores = OperationService::new(OperationKind::Restore, 1);
//! let deletes = OperationService::new(OperationKind::Delete, 1);
//! restores.spawn(Arc::clone(&gateway), WorkerConfig::default());
//! deletes.spawn(Arc::clone(&gateway), WorkerConfig::default());
//!
//! let indexer = TimeRangeIndexer::new(Resolution::Day, "logs-%Y/logs-%Y-%m-%d/logs-v1-%Y-%m-%d");
//! let orchestrator = Orchestrator::new(gateway, indexer, restores, deletes);
//!
//! let response = orchestrator
//!     .restore(IndexRequest::new(1_577_836_800, 1_578_009_600))
//!     .await?;
//! println!("{:?}: {:?}", response.outcome, response.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`index`]: identifiers, time windows and the calendar walk between them
//! - [`cluster`]: gateway to the snapshot and live-index APIs
//! - [`snapshot`]: snapshot repository validation
//! - [`status`]: reconciliation into Ready / Pending / Restoring / Deleting
//! - [`queue`]: bounded operation queues
//! - [`worker`]: background restore and delete workers
//! - [`orchestrator`]: request-level GET / POST / DELETE behavior
//! - [`server`]: HTTP surface

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, EsioError>;

/// Main error type for orchestrator operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EsioError {
    /// Bad time range, resolution or repository pattern
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] index::IndexError),

    /// Snapshot repository validation failed
    #[error("Snapshot validation failed: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),

    /// Live cluster state could not be classified
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] status::ReconcileError),

    /// Delete requested while indices in the range are queued for restore
    #[error("Indices in range {window} are being restored: {}", format_identifiers(.restoring))]
    RangeConflict {
        /// Human-readable requested window
        window: String,
        /// Identifiers currently held by the restore queue
        restoring: Vec<index::IndexIdentifier>,
    },

    /// Process configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Coarse error taxonomy used to pick a transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected immediately, never retried
    InputValidation,
    /// A snapshot or index is missing upstream
    NotFound,
    /// Snapshot repository or live cluster could not be queried
    UpstreamUnreachable,
    /// Upstream call exceeded its time bound
    UpstreamTimeout,
    /// Live cluster reported a state outside the expected enum
    StateInconsistency,
    /// Delete refused because of a concurrent restore
    RangeConflict,
}

impl EsioError {
    /// Classify the error into the taxonomy
    pub fn kind(&self) -> ErrorKind {
        use snapshot::SnapshotError;
        use status::ReconcileError;

        match self {
            EsioError::InvalidInput(_) | EsioError::Config(_) => ErrorKind::InputValidation,
            EsioError::Snapshot(err) => match err {
                SnapshotError::NoSnapshotsFound { .. }
                | SnapshotError::IndexNotInRepository { .. } => ErrorKind::NotFound,
                SnapshotError::SnapshotNotSuccessful { .. } => ErrorKind::InputValidation,
                SnapshotError::RepositoryUnreachable { .. } => ErrorKind::UpstreamUnreachable,
                SnapshotError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            },
            EsioError::Reconcile(err) => match err {
                ReconcileError::ClusterUnreachable(_) => ErrorKind::UpstreamUnreachable,
                ReconcileError::UpstreamTimeout(_) => ErrorKind::UpstreamTimeout,
                ReconcileError::UnexpectedIndexState { .. }
                | ReconcileError::UnexpectedHealthState { .. } => ErrorKind::StateInconsistency,
            },
            EsioError::RangeConflict { .. } => ErrorKind::RangeConflict,
        }
    }
}

fn format_identifiers(ids: &[index::IndexIdentifier]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Index identifiers, time windows and resolution stepping
pub mod index;

/// Gateway to the clustered document store
pub mod cluster;

/// Snapshot repository validation
pub mod snapshot;

/// Reconciliation of requested indices against live cluster state
pub mod status;

/// Bounded operation queues
pub mod queue;

/// Background restore and delete workers
pub mod worker;

/// Request-level orchestration
pub mod orchestrator;

/// HTTP surface
pub mod server;

/// Process configuration
pub mod config;

/// Logging setup
pub mod observability;

/// Prometheus metrics
pub mod metrics;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = EsioError::from(snapshot::SnapshotError::IndexNotInRepository {
            index: "logs-v1-2020-01-01".to_string(),
            repository: "logs-2020/logs-2020-01-01".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = EsioError::from(status::ReconcileError::UnexpectedHealthState {
            index: "logs-v1-2020-01-01".to_string(),
            health: "purple".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::StateInconsistency);

        let err = EsioError::from(index::IndexError::InvalidResolution("hour".to_string()));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[test]
    fn test_range_conflict_message_lists_identifiers() {
        let err = EsioError::RangeConflict {
            window: "[2020-01-01, 2020-01-02]".to_string(),
            restoring: vec![
                index::IndexIdentifier::new("a/b/c").unwrap(),
                index::IndexIdentifier::new("a/b/d").unwrap(),
            ],
        };
        assert!(err.to_string().contains("a/b/c, a/b/d"));
        assert_eq!(err.kind(), ErrorKind::RangeConflict);
    }
}
