//! Request-level orchestration
//!
//! Each request runs the same front half: expand the window into
//! identifiers, validate every identifier against its snapshot repository
//! (failing fast on the first problem), then reconcile against the live
//! cluster. The three methods differ only in what they enqueue afterwards.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cluster::ClusterGateway;
use crate::index::{IndexIdentifier, TimeRangeIndexer, TimeWindow};
use crate::metrics;
use crate::queue::QueueSnapshot;
use crate::snapshot::SnapshotValidator;
use crate::status::{IndexStatus, StatusReconciler};
use crate::worker::OperationService;
use crate::{EsioError, Result};

/// Time window plus optional per-request overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    /// Window start, seconds since the Unix epoch
    pub start: i64,
    /// Window end (exclusive), seconds since the Unix epoch
    pub end: i64,
    /// Override of the default resolution
    pub resolution: Option<String>,
    /// Override of the default repository pattern
    pub repo_pattern: Option<String>,
}

impl IndexRequest {
    /// Request using the process defaults
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            resolution: None,
            repo_pattern: None,
        }
    }

    /// Override the resolution for this request
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Override the repository pattern for this request
    pub fn with_repo_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.repo_pattern = Some(pattern.into());
        self
    }
}

/// Summary of how a request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every index is Ready
    Success,
    /// Nothing is restored yet and nothing is in flight
    NotYetAvailable,
    /// Some indices are Ready or in flight but not all
    Partial,
    /// Work was enqueued
    Accepted,
    /// Delete found nothing live to remove
    AlreadyClean,
    /// A status check found only Ready and Deleting indices
    ProcessingError,
}

impl Outcome {
    /// Label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::NotYetAvailable => "not_yet_available",
            Outcome::Partial => "partial",
            Outcome::Accepted => "accepted",
            Outcome::AlreadyClean => "already_clean",
            Outcome::ProcessingError => "processing_error",
        }
    }
}

/// Outcome plus the classification it was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorResponse {
    /// How the request was handled
    pub outcome: Outcome,
    /// Classification after any enqueueing
    pub status: IndexStatus,
}

impl OrchestratorResponse {
    fn new(outcome: Outcome, status: IndexStatus) -> Self {
        Self { outcome, status }
    }
}

/// Ties together expansion, validation, reconciliation and the two queues
#[derive(Clone)]
pub struct Orchestrator {
    indexer: TimeRangeIndexer,
    validator: SnapshotValidator,
    reconciler: StatusReconciler,
    restores: OperationService,
    deletes: OperationService,
}

impl Orchestrator {
    /// Orchestrator sharing `gateway` between validation and reconciliation
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        indexer: TimeRangeIndexer,
        restores: OperationService,
        deletes: OperationService,
    ) -> Self {
        Self {
            indexer,
            validator: SnapshotValidator::new(Arc::clone(&gateway)),
            reconciler: StatusReconciler::new(gateway, restores.clone(), deletes.clone()),
            restores,
            deletes,
        }
    }

    /// Expander holding the process defaults
    pub fn indexer(&self) -> &TimeRangeIndexer {
        &self.indexer
    }

    /// Restore queue handle
    pub fn restores(&self) -> &OperationService {
        &self.restores
    }

    /// Delete queue handle
    pub fn deletes(&self) -> &OperationService {
        &self.deletes
    }

    /// Backlog and in-service counts for both queues
    pub fn queues(&self) -> [QueueSnapshot; 2] {
        [self.restores.snapshot(), self.deletes.snapshot()]
    }

    /// Report availability without changing anything
    #[instrument(skip(self), fields(start = request.start, end = request.end))]
    pub async fn status(&self, request: IndexRequest) -> Result<OrchestratorResponse> {
        let result = self.status_inner(&request).await;
        record("GET", &result);
        result
    }

    /// Enqueue every Pending index in the window for restore
    #[instrument(skip(self), fields(start = request.start, end = request.end))]
    pub async fn restore(&self, request: IndexRequest) -> Result<OrchestratorResponse> {
        let result = self.restore_inner(&request).await;
        record("POST", &result);
        result
    }

    /// Enqueue every Ready index in the window for deletion.
    ///
    /// Refused with [`EsioError::RangeConflict`] while any index in the
    /// window is held by the restore queue; neither queue is touched then.
    #[instrument(skip(self), fields(start = request.start, end = request.end))]
    pub async fn delete(&self, request: IndexRequest) -> Result<OrchestratorResponse> {
        let result = self.delete_inner(&request).await;
        record("DELETE", &result);
        result
    }

    async fn status_inner(&self, request: &IndexRequest) -> Result<OrchestratorResponse> {
        let (_, identifiers) = self.prepare(request).await?;
        let status = self.reconciler.reconcile(&identifiers).await?;

        let outcome = if status.is_all_ready() {
            Outcome::Success
        } else if status.is_all_pending() {
            Outcome::NotYetAvailable
        } else if !status.pending.is_empty() || !status.restoring.is_empty() {
            Outcome::Partial
        } else {
            warn!(deleting = status.deleting.len(), "Status requested while indices are being deleted");
            Outcome::ProcessingError
        };

        Ok(OrchestratorResponse::new(outcome, status))
    }

    async fn restore_inner(&self, request: &IndexRequest) -> Result<OrchestratorResponse> {
        let (_, identifiers) = self.prepare(request).await?;
        let status = self.reconciler.reconcile(&identifiers).await?;

        if status.is_all_ready() {
            return Ok(OrchestratorResponse::new(Outcome::Success, status));
        }

        let pushed = push_all(&self.restores, &status.pending);
        let status = self.reconciler.reconcile(&identifiers).await?;

        let outcome = if pushed > 0 {
            info!(pushed, "Queued indices for restore");
            Outcome::Accepted
        } else {
            Outcome::Partial
        };
        Ok(OrchestratorResponse::new(outcome, status))
    }

    async fn delete_inner(&self, request: &IndexRequest) -> Result<OrchestratorResponse> {
        let (window, identifiers) = self.prepare(request).await?;

        let restoring: Vec<IndexIdentifier> = identifiers
            .iter()
            .filter(|id| self.restores.contains(id))
            .cloned()
            .collect();
        if !restoring.is_empty() {
            warn!(window = %window, restoring = restoring.len(), "Delete refused while restoring");
            return Err(EsioError::RangeConflict {
                window: window.to_string(),
                restoring,
            });
        }

        let status = self.reconciler.reconcile(&identifiers).await?;
        let pushed = push_all(&self.deletes, &status.ready);
        let status = self.reconciler.reconcile(&identifiers).await?;

        let outcome = if pushed > 0 {
            info!(pushed, "Queued indices for deletion");
            Outcome::Accepted
        } else {
            Outcome::AlreadyClean
        };
        Ok(OrchestratorResponse::new(outcome, status))
    }

    /// Expand and validate; no queue or live-index call happens on failure
    async fn prepare(&self, request: &IndexRequest) -> Result<(TimeWindow, Vec<IndexIdentifier>)> {
        let window = TimeWindow::from_epoch_secs(request.start, request.end)?;
        let identifiers = self.indexer.expand(
            &window,
            request.resolution.as_deref(),
            request.repo_pattern.as_deref(),
        )?;
        self.validator.validate_all(&identifiers).await?;
        Ok((window, identifiers))
    }
}

fn push_all(service: &OperationService, identifiers: &[IndexIdentifier]) -> usize {
    identifiers
        .iter()
        .filter(|id| service.push((*id).clone()))
        .count()
}

fn record(method: &str, result: &Result<OrchestratorResponse>) {
    match result {
        Ok(response) => metrics::record_request(method, response.outcome.as_str()),
        Err(_) => metrics::record_request(method, "error"),
    }
}
