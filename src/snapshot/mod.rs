//! Snapshot repository validation
//!
//! Confirms that every computed identifier can actually be recovered: its
//! repository must list at least one snapshot, and the snapshot that
//! contains the index must have completed successfully.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cluster::{ClusterError, ClusterGateway, SnapshotState};
use crate::index::IndexIdentifier;

/// Reasons an identifier is not recoverable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Listing failed on transport or decode
    #[error("Could not query snapshot repository '{repository}': {message}")]
    RepositoryUnreachable {
        /// `repository/snapshot` path that was listed
        repository: String,
        /// Gateway error text
        message: String,
    },

    /// Listing exceeded its time bound
    #[error("Snapshot repository '{repository}' did not answer in time: {message}")]
    UpstreamTimeout {
        /// `repository/snapshot` path that was listed
        repository: String,
        /// Gateway error text
        message: String,
    },

    /// Repository lists no snapshots at all
    #[error("No snapshots found in repo: {repository}")]
    NoSnapshotsFound {
        /// `repository/snapshot` path that was listed
        repository: String,
    },

    /// First snapshot holding the index did not complete
    #[error("Snapshot '{snapshot}' holding index '{index}' is in state '{state}', not 'SUCCESS'")]
    SnapshotNotSuccessful {
        /// Bare index name
        index: String,
        /// Snapshot that holds it
        snapshot: String,
        /// State reported for that snapshot
        state: String,
    },

    /// No snapshot in the repository holds the index
    #[error("Index with name '{index}' not found in repo: '{repository}'")]
    IndexNotInRepository {
        /// Bare index name
        index: String,
        /// `repository/snapshot` path that was listed
        repository: String,
    },
}

/// Checks identifiers against their snapshot repositories.
///
/// Snapshot listings are re-fetched on every call; nothing is cached.
#[derive(Clone)]
pub struct SnapshotValidator {
    gateway: Arc<dyn ClusterGateway>,
}

impl SnapshotValidator {
    /// Validator backed by `gateway`
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self { gateway }
    }

    /// Validate a single identifier
    #[instrument(skip(self, identifier), fields(index = %identifier))]
    pub async fn validate(&self, identifier: &IndexIdentifier) -> Result<(), SnapshotError> {
        let repository = identifier.repository_path();
        let target = identifier.index_name();

        debug!(repository = %repository, target = %target, "Checking snapshot");

        let records = self
            .gateway
            .list_snapshots(repository)
            .await
            .map_err(|err| upstream_error(repository, err))?;

        if records.is_empty() {
            return Err(SnapshotError::NoSnapshotsFound {
                repository: repository.to_string(),
            });
        }

        match records.iter().find(|record| record.contains_index(target)) {
            Some(record) if record.state == SnapshotState::Success => Ok(()),
            Some(record) => {
                warn!(
                    snapshot = %record.snapshot,
                    state = %record.state,
                    "Snapshot holding index is not successful"
                );
                Err(SnapshotError::SnapshotNotSuccessful {
                    index: target.to_string(),
                    snapshot: record.snapshot.clone(),
                    state: record.state.to_string(),
                })
            }
            None => Err(SnapshotError::IndexNotInRepository {
                index: target.to_string(),
                repository: repository.to_string(),
            }),
        }
    }

    /// Validate identifiers in order, stopping at the first failure
    pub async fn validate_all(&self, identifiers: &[IndexIdentifier]) -> Result<(), SnapshotError> {
        for identifier in identifiers {
            self.validate(identifier).await?;
        }
        Ok(())
    }
}

fn upstream_error(repository: &str, err: ClusterError) -> SnapshotError {
    if err.is_timeout() {
        SnapshotError::UpstreamTimeout {
            repository: repository.to_string(),
            message: err.to_string(),
        }
    } else {
        SnapshotError::RepositoryUnreachable {
            repository: repository.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{InMemoryCluster, SnapshotRecord};

    const REPO: &str = "logs-2020/logs-2020-01-01";

    fn id(name: &str) -> IndexIdentifier {
        IndexIdentifier::new(format!("{REPO}/{name}")).unwrap()
    }

    fn validator(cluster: &InMemoryCluster) -> SnapshotValidator {
        SnapshotValidator::new(Arc::new(cluster.clone()))
    }

    #[tokio::test]
    async fn test_successful_snapshot_validates() {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(
            REPO,
            "snap-1",
            ["logs-v1-2020-01-01", "logs-v2-2020-01-01"],
            SnapshotState::Success,
        ));

        assert_eq!(validator(&cluster).validate(&id("logs-v1-2020-01-01")).await, Ok(()));
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let cluster = InMemoryCluster::new();
        assert_eq!(
            validator(&cluster).validate(&id("logs-v1-2020-01-01")).await,
            Err(SnapshotError::NoSnapshotsFound {
                repository: REPO.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_index_missing_from_every_snapshot() {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(REPO, "a", ["x"], SnapshotState::Success));
        cluster.add_snapshot(SnapshotRecord::new(REPO, "b", ["y"], SnapshotState::Success));

        assert!(matches!(
            validator(&cluster).validate(&id("Z")).await,
            Err(SnapshotError::IndexNotInRepository { index, .. }) if index == "Z"
        ));
    }

    #[tokio::test]
    async fn test_unsorted_membership_is_found_in_later_snapshot() {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(REPO, "a", ["zeta", "alpha"], SnapshotState::Success));
        cluster.add_snapshot(SnapshotRecord::new(
            REPO,
            "b",
            ["omega", "delta", "beta"],
            SnapshotState::Success,
        ));

        assert_eq!(validator(&cluster).validate(&id("delta")).await, Ok(()));
    }

    #[tokio::test]
    async fn test_partial_snapshot_is_rejected() {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(
            REPO,
            "snap-1",
            ["logs-v1-2020-01-01"],
            SnapshotState::from("PARTIAL"),
        ));

        assert!(matches!(
            validator(&cluster).validate(&id("logs-v1-2020-01-01")).await,
            Err(SnapshotError::SnapshotNotSuccessful { state, .. }) if state == "PARTIAL"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_repository() {
        let cluster = InMemoryCluster::new();
        cluster.set_unreachable(true);

        assert!(matches!(
            validator(&cluster).validate(&id("x")).await,
            Err(SnapshotError::RepositoryUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_all_fails_fast() {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(REPO, "a", ["x"], SnapshotState::Success));

        let ids = vec![id("missing"), id("x"), id("also-missing")];
        let err = validator(&cluster).validate_all(&ids).await.unwrap_err();

        assert!(matches!(err, SnapshotError::IndexNotInRepository { index, .. } if index == "missing"));
        assert_eq!(cluster.snapshot_calls(), 1);
    }
}
