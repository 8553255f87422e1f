//! End-to-end orchestration against the in-memory cluster
//!
//! Covers the GET / POST / DELETE flows from window expansion through
//! validation, reconciliation and background restore/delete workers.

mod common;

use common::*;
use esio::cluster::Health;
use esio::index::IndexError;
use esio::orchestrator::{IndexRequest, Outcome};
use esio::snapshot::SnapshotError;
use esio::EsioError;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_window_is_half_open() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02", "2020-01-03"]);
    let orchestrator = idle_orchestrator(&cluster);

    let response = orchestrator
        .status(IndexRequest::new(JAN_01, JAN_03))
        .await
        .unwrap();

    assert_eq!(
        response.status.pending,
        vec![day_id("2020-01-01"), day_id("2020-01-02")]
    );
    assert_eq!(cluster.snapshot_calls(), 2);
}

#[tokio::test]
async fn test_all_ready_is_success() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02"]);
    mark_live(&cluster, "2020-01-01", Health::Green);
    mark_live(&cluster, "2020-01-02", Health::Yellow);

    let response = idle_orchestrator(&cluster)
        .status(IndexRequest::new(JAN_01, JAN_03))
        .await
        .unwrap();

    assert_eq!(response.outcome, Outcome::Success);
    assert_eq!(response.status.ready.len(), 2);
    assert!(response.status.pending.is_empty());
    assert!(response.status.restoring.is_empty());
    assert!(response.status.deleting.is_empty());
}

#[tokio::test]
async fn test_missing_index_fails_fast_for_every_method() {
    // Jan-02 snapshot exists but does not contain the expected index
    let cluster = cluster_with_snapshots(&["2020-01-01"]);
    cluster.add_snapshot(esio::cluster::SnapshotRecord::new(
        "logs-2020/logs-2020-01-02",
        "logs-2020-01-02",
        ["logs-v2-2020-01-02"],
        esio::cluster::SnapshotState::Success,
    ));
    let orchestrator = idle_orchestrator(&cluster);

    let request = IndexRequest::new(JAN_01, JAN_03);
    for result in [
        orchestrator.status(request.clone()).await,
        orchestrator.restore(request.clone()).await,
        orchestrator.delete(request.clone()).await,
    ] {
        assert!(matches!(
            result,
            Err(EsioError::Snapshot(SnapshotError::IndexNotInRepository { ref index, .. }))
                if index == "logs-v1-2020-01-02"
        ));
    }

    assert_eq!(cluster.list_calls(), 0);
    assert_eq!(cluster.restore_calls(), 0);
    assert_eq!(cluster.delete_calls(), 0);
    assert!(orchestrator.restores().queue().is_empty());
    assert!(orchestrator.deletes().queue().is_empty());
}

#[tokio::test]
async fn test_post_enqueues_single_pending_index() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02"]);
    mark_live(&cluster, "2020-01-01", Health::Green);
    let orchestrator = idle_orchestrator(&cluster);

    let response = orchestrator
        .restore(IndexRequest::new(JAN_01, JAN_03))
        .await
        .unwrap();

    assert_eq!(response.outcome, Outcome::Accepted);
    assert_eq!(response.status.ready, vec![day_id("2020-01-01")]);
    assert_eq!(response.status.restoring, vec![day_id("2020-01-02")]);
    assert!(response.status.pending.is_empty());
    assert_eq!(orchestrator.restores().queue().pending(), vec![day_id("2020-01-02")]);
}

#[tokio::test]
async fn test_delete_refused_while_restore_is_queued() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02"]);
    mark_live(&cluster, "2020-01-02", Health::Green);
    let orchestrator = idle_orchestrator(&cluster);
    orchestrator.restores().push(day_id("2020-01-01"));

    let err = orchestrator
        .delete(IndexRequest::new(JAN_01, JAN_03))
        .await
        .unwrap_err();

    assert!(matches!(err, EsioError::RangeConflict { .. }));
    assert_eq!(orchestrator.restores().queue().pending(), vec![day_id("2020-01-01")]);
    assert!(orchestrator.deletes().queue().is_empty());
}

#[tokio::test]
async fn test_restore_then_delete_round_trip_with_workers() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02"]);
    let (orchestrator, handles) = running_orchestrator(&cluster);
    let request = IndexRequest::new(JAN_01, JAN_03);

    let accepted = orchestrator.restore(request.clone()).await.unwrap();
    assert_eq!(accepted.outcome, Outcome::Accepted);

    eventually(|| {
        cluster.live_index("logs-v1-2020-01-01").is_some()
            && cluster.live_index("logs-v1-2020-01-02").is_some()
    })
    .await;
    eventually(|| orchestrator.restores().snapshot().in_service == 0).await;

    let ready = orchestrator.status(request.clone()).await.unwrap();
    assert_eq!(ready.outcome, Outcome::Success);
    assert_eq!(cluster.peak_concurrent_restores(), 1);

    let deleting = orchestrator.delete(request.clone()).await.unwrap();
    assert_eq!(deleting.outcome, Outcome::Accepted);

    eventually(|| {
        cluster.live_index("logs-v1-2020-01-01").is_none()
            && cluster.live_index("logs-v1-2020-01-02").is_none()
    })
    .await;
    eventually(|| orchestrator.deletes().snapshot().in_service == 0).await;

    let clean = orchestrator.delete(request.clone()).await.unwrap();
    assert_eq!(clean.outcome, Outcome::AlreadyClean);

    let gone = orchestrator.status(request).await.unwrap();
    assert_eq!(gone.outcome, Outcome::NotYetAvailable);

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_red_restore_reports_partial() {
    let cluster = cluster_with_snapshots(&["2020-01-01", "2020-01-02"]);
    cluster.set_restore_health(Health::Red);
    let (orchestrator, handles) = running_orchestrator(&cluster);
    let request = IndexRequest::new(JAN_01, JAN_03);

    orchestrator.restore(request.clone()).await.unwrap();
    eventually(|| cluster.restore_calls() == 2).await;
    eventually(|| orchestrator.restores().snapshot().in_service == 0).await;

    let response = orchestrator.status(request).await.unwrap();
    assert_eq!(response.outcome, Outcome::Partial);
    assert_eq!(response.status.restoring.len(), 2);

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_failed_delete_is_dropped_from_queue() {
    let cluster = cluster_with_snapshots(&["2020-01-01"]);
    mark_live(&cluster, "2020-01-01", Health::Green);
    cluster.set_fail_deletes(true);
    let (orchestrator, handles) = running_orchestrator(&cluster);
    let request = IndexRequest::new(JAN_01, JAN_01 + 86_400);

    orchestrator.delete(request.clone()).await.unwrap();
    eventually(|| cluster.delete_calls() == 1).await;
    eventually(|| !orchestrator.deletes().contains(&day_id("2020-01-01"))).await;

    let response = orchestrator.status(request).await.unwrap();
    assert_eq!(response.outcome, Outcome::Success);

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_per_request_overrides() {
    let cluster = esio::cluster::InMemoryCluster::new();
    cluster.add_snapshot(esio::cluster::SnapshotRecord::new(
        "metrics-2020/metrics-2020-01",
        "metrics-2020-01",
        ["metrics-2020-01"],
        esio::cluster::SnapshotState::Success,
    ));
    let orchestrator = idle_orchestrator(&cluster);

    let response = orchestrator
        .status(
            IndexRequest::new(JAN_01, JAN_03)
                .with_resolution("month")
                .with_repo_pattern("metrics-%Y/metrics-%Y-%m/metrics-%Y-%m"),
        )
        .await
        .unwrap();

    assert_eq!(response.outcome, Outcome::NotYetAvailable);
    assert_eq!(response.status.pending.len(), 1);
    assert_eq!(response.status.pending[0].index_name(), "metrics-2020-01");
}

#[tokio::test]
async fn test_unknown_resolution_is_typed_error() {
    let cluster = cluster_with_snapshots(&["2020-01-01"]);
    let err = idle_orchestrator(&cluster)
        .status(IndexRequest::new(JAN_01, JAN_03).with_resolution("fortnight"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EsioError::InvalidInput(IndexError::InvalidResolution("fortnight".to_string()))
    );
}
