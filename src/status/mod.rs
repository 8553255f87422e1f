//! Reconciliation of requested indices against live cluster state
//!
//! [`StatusReconciler`] merges three sources into an [`IndexStatus`]: the
//! requested identifiers, the live index listing, and membership of the
//! restore and delete queues.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::cluster::{ClusterGateway, Health, OpenState};
use crate::index::IndexIdentifier;
use crate::metrics;
use crate::worker::OperationService;

/// Failures that prevent classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Live index listing failed
    #[error("Could not list indices from cluster: {0}")]
    ClusterUnreachable(String),

    /// Live index listing exceeded its time bound
    #[error("Cluster did not answer in time: {0}")]
    UpstreamTimeout(String),

    /// A requested index is live but not open
    #[error("Found existing index on cluster that was not 'open': {index} ({state})")]
    UnexpectedIndexState {
        /// Bare index name
        index: String,
        /// State the cluster reported
        state: String,
    },

    /// A requested index is live with an unknown health color
    #[error("Found online index: '{index}' with invalid health state '{health}'")]
    UnexpectedHealthState {
        /// Bare index name
        index: String,
        /// Health the cluster reported
        health: String,
    },
}

/// Classification of one requested index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Live, open, green or yellow
    Ready,
    /// Absent and not queued
    Pending,
    /// Live and red, or held by the restore queue
    Restoring,
    /// Absent and held by the delete queue
    Deleting,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Ready => "ready",
            Classification::Pending => "pending",
            Classification::Restoring => "restoring",
            Classification::Deleting => "deleting",
        };
        f.write_str(label)
    }
}

/// Four-way partition of the identifiers covering a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Restored and serving
    pub ready: Vec<IndexIdentifier>,
    /// Recoverable but not requested yet
    pub pending: Vec<IndexIdentifier>,
    /// Queued for or undergoing restore
    pub restoring: Vec<IndexIdentifier>,
    /// Queued for or undergoing deletion
    pub deleting: Vec<IndexIdentifier>,
}

impl IndexStatus {
    /// Number of classified identifiers
    pub fn len(&self) -> usize {
        self.ready.len() + self.pending.len() + self.restoring.len() + self.deleting.len()
    }

    /// True when nothing was classified
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing Pending, Restoring or Deleting
    pub fn is_all_ready(&self) -> bool {
        self.pending.is_empty() && self.restoring.is_empty() && self.deleting.is_empty()
    }

    /// At least one Pending and nothing else
    pub fn is_all_pending(&self) -> bool {
        !self.pending.is_empty()
            && self.ready.is_empty()
            && self.restoring.is_empty()
            && self.deleting.is_empty()
    }

    /// Which list holds `identifier`, if any
    pub fn classification(&self, identifier: &IndexIdentifier) -> Option<Classification> {
        if self.ready.contains(identifier) {
            Some(Classification::Ready)
        } else if self.pending.contains(identifier) {
            Some(Classification::Pending)
        } else if self.restoring.contains(identifier) {
            Some(Classification::Restoring)
        } else if self.deleting.contains(identifier) {
            Some(Classification::Deleting)
        } else {
            None
        }
    }

    fn push(&mut self, identifier: IndexIdentifier, classification: Classification) {
        match classification {
            Classification::Ready => self.ready.push(identifier),
            Classification::Pending => self.pending.push(identifier),
            Classification::Restoring => self.restoring.push(identifier),
            Classification::Deleting => self.deleting.push(identifier),
        }
    }
}

/// Classifies requested identifiers against live state and queue membership
#[derive(Clone)]
pub struct StatusReconciler {
    gateway: Arc<dyn ClusterGateway>,
    restores: OperationService,
    deletes: OperationService,
}

impl StatusReconciler {
    /// Reconciler reading live state from `gateway` and membership from the queues
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        restores: OperationService,
        deletes: OperationService,
    ) -> Self {
        Self {
            gateway,
            restores,
            deletes,
        }
    }

    /// Partition `requested` into Ready / Pending / Restoring / Deleting.
    ///
    /// Live indices decide first: open and green/yellow is Ready, open and
    /// red is Restoring. Anything not live is Deleting if queued for delete,
    /// otherwise Restoring if queued for restore, otherwise Pending. Delete
    /// membership wins when an identifier is in both queues. Repeated
    /// identifiers are classified once.
    #[instrument(skip(self, requested), fields(requested = requested.len()))]
    pub async fn reconcile(&self, requested: &[IndexIdentifier]) -> Result<IndexStatus, ReconcileError> {
        let live = self.gateway.list_indices().await.map_err(|err| {
            error!(error = %err, "Could not list live indices");
            if err.is_timeout() {
                ReconcileError::UpstreamTimeout(err.to_string())
            } else {
                ReconcileError::ClusterUnreachable(err.to_string())
            }
        })?;

        let wanted: HashSet<&str> = requested.iter().map(|id| id.index_name()).collect();
        let mut online: HashMap<&str, Classification> = HashMap::new();

        for record in &live {
            let name = record.name.as_str();
            if !wanted.contains(name) {
                continue;
            }
            if let OpenState::Other(state) = &record.open_state {
                return Err(ReconcileError::UnexpectedIndexState {
                    index: record.name.clone(),
                    state: state.clone(),
                });
            }
            let classification = match &record.health {
                Health::Green | Health::Yellow => Classification::Ready,
                Health::Red => Classification::Restoring,
                Health::Other(health) => {
                    return Err(ReconcileError::UnexpectedHealthState {
                        index: record.name.clone(),
                        health: health.clone(),
                    })
                }
            };
            online.insert(name, classification);
        }

        let mut status = IndexStatus::default();
        let mut seen: HashSet<&IndexIdentifier> = HashSet::with_capacity(requested.len());

        for identifier in requested {
            if !seen.insert(identifier) {
                continue;
            }
            let classification = match online.get(identifier.index_name()) {
                Some(classification) => *classification,
                None if self.deletes.contains(identifier) => Classification::Deleting,
                None if self.restores.contains(identifier) => Classification::Restoring,
                None => Classification::Pending,
            };
            status.push(identifier.clone(), classification);
        }

        debug!(
            ready = status.ready.len(),
            pending = status.pending.len(),
            restoring = status.restoring.len(),
            deleting = status.deleting.len(),
            "Reconciled index status"
        );
        metrics::record_classification(&status);

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{InMemoryCluster, LiveIndexRecord};
    use crate::queue::OperationKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn id(name: &str) -> IndexIdentifier {
        IndexIdentifier::new(format!("repo/snap/{name}")).unwrap()
    }

    struct Fixture {
        cluster: InMemoryCluster,
        restores: OperationService,
        deletes: OperationService,
        reconciler: StatusReconciler,
    }

    fn fixture() -> Fixture {
        let cluster = InMemoryCluster::new();
        let restores = OperationService::new(OperationKind::Restore, 1);
        let deletes = OperationService::new(OperationKind::Delete, 1);
        let reconciler =
            StatusReconciler::new(Arc::new(cluster.clone()), restores.clone(), deletes.clone());
        Fixture {
            cluster,
            restores,
            deletes,
            reconciler,
        }
    }

    #[tokio::test]
    async fn test_live_health_classification() {
        let f = fixture();
        f.cluster.put_index(LiveIndexRecord::open("green", Health::Green));
        f.cluster.put_index(LiveIndexRecord::open("yellow", Health::Yellow));
        f.cluster.put_index(LiveIndexRecord::open("red", Health::Red));
        f.cluster.put_index(LiveIndexRecord::open("unrelated", Health::Green));

        let requested = vec![id("green"), id("yellow"), id("red"), id("absent")];
        let status = f.reconciler.reconcile(&requested).await.unwrap();

        assert_eq!(
            status,
            IndexStatus {
                ready: vec![id("green"), id("yellow")],
                pending: vec![id("absent")],
                restoring: vec![id("red")],
                deleting: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_queue_membership_classification() {
        let f = fixture();
        f.restores.push(id("restoring"));
        f.deletes.push(id("deleting"));
        f.restores.push(id("both"));
        f.deletes.push(id("both"));

        let requested = vec![id("restoring"), id("deleting"), id("both"), id("idle")];
        let status = f.reconciler.reconcile(&requested).await.unwrap();

        assert_eq!(status.restoring, vec![id("restoring")]);
        assert_eq!(status.deleting, vec![id("deleting"), id("both")]);
        assert_eq!(status.pending, vec![id("idle")]);
    }

    #[tokio::test]
    async fn test_live_state_precedes_queue_membership() {
        let f = fixture();
        f.cluster.put_index(LiveIndexRecord::open("a", Health::Green));
        f.deletes.push(id("a"));

        let status = f.reconciler.reconcile(&[id("a")]).await.unwrap();
        assert_eq!(status.ready, vec![id("a")]);
        assert!(status.deleting.is_empty());
    }

    #[tokio::test]
    async fn test_closed_index_is_rejected() {
        let f = fixture();
        f.cluster.put_index(LiveIndexRecord::new(
            "a",
            OpenState::from("close"),
            Health::Green,
        ));

        assert_eq!(
            f.reconciler.reconcile(&[id("a")]).await,
            Err(ReconcileError::UnexpectedIndexState {
                index: "a".to_string(),
                state: "close".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_health_is_rejected() {
        let f = fixture();
        f.cluster.put_index(LiveIndexRecord::open("a", Health::from("")));

        assert!(matches!(
            f.reconciler.reconcile(&[id("a")]).await,
            Err(ReconcileError::UnexpectedHealthState { .. })
        ));
    }

    #[tokio::test]
    async fn test_unrequested_bad_index_is_ignored() {
        let f = fixture();
        f.cluster.put_index(LiveIndexRecord::new(
            "other",
            OpenState::from("close"),
            Health::from("grey"),
        ));

        let status = f.reconciler.reconcile(&[id("a")]).await.unwrap();
        assert_eq!(status.pending, vec![id("a")]);
    }

    #[tokio::test]
    async fn test_unreachable_cluster() {
        let f = fixture();
        f.cluster.set_unreachable(true);

        assert!(matches!(
            f.reconciler.reconcile(&[id("a")]).await,
            Err(ReconcileError::ClusterUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicates_classified_once() {
        let f = fixture();
        let status = f.reconciler.reconcile(&[id("a"), id("a")]).await.unwrap();
        assert_eq!(status.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_reconcile_partitions_requested_set(
            states in prop::collection::vec(0u8..6, 1..24)
        ) {
            let f = fixture();
            let requested: Vec<IndexIdentifier> =
                (0..states.len()).map(|i| id(&format!("idx-{i}"))).collect();

            for (identifier, state) in requested.iter().zip(&states) {
                let name = identifier.index_name();
                match state {
                    0 => f.cluster.put_index(LiveIndexRecord::open(name, Health::Green)),
                    1 => f.cluster.put_index(LiveIndexRecord::open(name, Health::Red)),
                    2 => { f.restores.push(identifier.clone()); }
                    3 => { f.deletes.push(identifier.clone()); }
                    4 => {
                        f.restores.push(identifier.clone());
                        f.deletes.push(identifier.clone());
                    }
                    _ => {}
                }
            }

            let status = tokio_test::block_on(f.reconciler.reconcile(&requested)).unwrap();

            prop_assert_eq!(status.len(), requested.len());
            let mut seen = HashSet::new();
            for identifier in status
                .ready
                .iter()
                .chain(&status.pending)
                .chain(&status.restoring)
                .chain(&status.deleting)
            {
                prop_assert!(seen.insert(identifier.clone()), "{} classified twice", identifier);
            }
            for identifier in &requested {
                prop_assert!(seen.contains(identifier));
            }
        }
    }
}
