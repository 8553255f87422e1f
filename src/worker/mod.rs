//! Background restore and delete workers
//!
//! An [`OperationService`] pairs one [`BoundedOperationQueue`] with the
//! worker that drains it. Services are created once at startup and shared
//! by handle with request handlers (which push) and the reconciler (which
//! reads membership). Workers run for the process lifetime and never report
//! errors back to request handling: a failed attempt is logged, its entry is
//! dropped, and the next reconciliation observes the index as not Ready.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::cluster::{ClusterError, ClusterGateway};
use crate::index::IndexIdentifier;
use crate::metrics;
use crate::queue::{BoundedOperationQueue, OperationKind, QueueSnapshot, ServiceLease};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause before each remote call, giving the cluster time to settle
    /// between heavy operations. Zero disables it.
    pub settle_delay: Duration,
}

impl WorkerConfig {
    /// Override the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Why a single restore or delete attempt did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationFailure {
    /// Gateway call failed
    #[error("cluster call failed: {0}")]
    Cluster(#[from] ClusterError),

    /// Restore response did not name the index
    #[error("index '{index}' was not in list of restored indices: {restored:?}")]
    NotRestored {
        /// Bare index name
        index: String,
        /// Names the response did list
        restored: Vec<String>,
    },

    /// Restore finished with failed shards
    #[error("not all shards for index '{index}' were successfully recovered ({successful}/{total})")]
    IncompleteShards {
        /// Bare index name
        index: String,
        /// Shards restored
        successful: u32,
        /// Shards expected
        total: u32,
    },
}

/// A queue together with the worker that services it
#[derive(Clone, Debug)]
pub struct OperationService {
    queue: Arc<BoundedOperationQueue>,
}

impl OperationService {
    /// Service over a fresh queue
    pub fn new(kind: OperationKind, max_concurrent: usize) -> Self {
        Self::with_queue(BoundedOperationQueue::new(kind, max_concurrent))
    }

    /// Service over an existing queue
    pub fn with_queue(queue: BoundedOperationQueue) -> Self {
        Self {
            queue: Arc::new(queue),
        }
    }

    /// Operation this service performs
    pub fn kind(&self) -> OperationKind {
        self.queue.kind()
    }

    /// Underlying queue
    pub fn queue(&self) -> &Arc<BoundedOperationQueue> {
        &self.queue
    }

    /// Admit an identifier; `false` if it is already queued or in service
    pub fn push(&self, identifier: IndexIdentifier) -> bool {
        let admitted = self.queue.push(identifier);
        metrics::record_queue(self.queue.snapshot());
        admitted
    }

    /// True while the identifier is awaiting or in service
    pub fn contains(&self, identifier: &IndexIdentifier) -> bool {
        self.queue.contains(identifier)
    }

    /// Point-in-time queue counts
    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    /// Worker servicing this queue against `gateway`
    pub fn worker(&self, gateway: Arc<dyn ClusterGateway>, config: WorkerConfig) -> OperationWorker {
        OperationWorker {
            queue: Arc::clone(&self.queue),
            gateway,
            config,
        }
    }

    /// Start the worker on the current runtime
    pub fn spawn(&self, gateway: Arc<dyn ClusterGateway>, config: WorkerConfig) -> JoinHandle<()> {
        let worker = self.worker(gateway, config);
        tokio::spawn(worker.run())
    }
}

/// Drains one queue against the cluster
#[derive(Clone)]
pub struct OperationWorker {
    queue: Arc<BoundedOperationQueue>,
    gateway: Arc<dyn ClusterGateway>,
    config: WorkerConfig,
}

impl OperationWorker {
    /// Operation this worker performs
    pub fn kind(&self) -> OperationKind {
        self.queue.kind()
    }

    /// Service the queue forever.
    ///
    /// Each entry is started in admission order once one of the queue's
    /// service slots is free; with a cap of one the worker is strictly
    /// one-at-a-time.
    pub async fn run(self) {
        info!(
            queue = %self.kind(),
            max_concurrent = self.queue.max_concurrent(),
            settle_delay = ?self.config.settle_delay,
            "Queue worker started"
        );

        loop {
            let lease = self.queue.next().await;
            metrics::record_queue(self.queue.snapshot());

            let worker = self.clone();
            tokio::spawn(async move { worker.service(lease).await });
        }
    }

    /// Run one leased entry to completion and release it.
    ///
    /// The lease is also released if this future is dropped early.
    pub async fn service(&self, lease: ServiceLease) {
        let identifier = lease.identifier().clone();
        debug!(
            queue = %self.kind(),
            index = %identifier,
            waited = ?lease.age(),
            remaining = self.queue.count(),
            "Servicing entry"
        );

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let started = Instant::now();
        let result = self.perform(&identifier).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => {
                info!(queue = %self.kind(), index = %identifier, elapsed = ?elapsed, "Operation succeeded");
                metrics::record_operation(self.kind(), "success", elapsed);
            }
            Err(failure) => {
                error!(queue = %self.kind(), index = %identifier, error = %failure, "Operation failed");
                metrics::record_operation(self.kind(), "failure", elapsed);
            }
        }

        self.queue.complete(lease);
        metrics::record_queue(self.queue.snapshot());
    }

    /// Perform the queue's operation for one identifier
    #[instrument(skip(self, identifier), fields(queue = %self.kind(), index = %identifier))]
    pub async fn perform(&self, identifier: &IndexIdentifier) -> Result<(), OperationFailure> {
        match self.kind() {
            OperationKind::Restore => self.restore(identifier).await,
            OperationKind::Delete => self.delete(identifier).await,
        }
    }

    async fn restore(&self, identifier: &IndexIdentifier) -> Result<(), OperationFailure> {
        let index = identifier.index_name();
        info!(repository = %identifier.repository_path(), index = %index, "Restoring snapshot");

        let outcome = self
            .gateway
            .restore_index(identifier.repository_path(), index)
            .await?;

        if !outcome.indices.iter().any(|restored| restored == index) {
            return Err(OperationFailure::NotRestored {
                index: index.to_string(),
                restored: outcome.indices,
            });
        }
        if outcome.shards.successful != outcome.shards.total {
            if outcome.shards.failed > 0 {
                warn!(failed = outcome.shards.failed, "Restore reported failed shards");
            }
            return Err(OperationFailure::IncompleteShards {
                index: index.to_string(),
                successful: outcome.shards.successful,
                total: outcome.shards.total,
            });
        }
        Ok(())
    }

    async fn delete(&self, identifier: &IndexIdentifier) -> Result<(), OperationFailure> {
        self.gateway.delete_index(identifier.index_name()).await?;
        Ok(())
    }
}
