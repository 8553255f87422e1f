// Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use esio::cluster::{
    ClusterGateway, Health, InMemoryCluster, LiveIndexRecord, SnapshotRecord, SnapshotState,
};
use esio::index::{IndexIdentifier, Resolution, TimeRangeIndexer};
use esio::orchestrator::Orchestrator;
use esio::queue::{BoundedOperationQueue, OperationKind};
use esio::worker::{OperationService, WorkerConfig};

pub const PATTERN: &str = "logs-%Y/logs-%Y-%m-%d/logs-v1-%Y-%m-%d";

/// 2020-01-01T00:00:00Z
pub const JAN_01: i64 = 1_577_836_800;
/// 2020-01-03T00:00:00Z
pub const JAN_03: i64 = 1_578_009_600;

pub fn day_id(day: &str) -> IndexIdentifier {
    IndexIdentifier::new(format!("logs-2020/logs-{day}/logs-v1-{day}")).unwrap()
}

/// Cluster with a successful snapshot for each of `days`
pub fn cluster_with_snapshots(days: &[&str]) -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    for day in days {
        cluster.add_snapshot(SnapshotRecord::new(
            format!("logs-2020/logs-{day}"),
            format!("logs-{day}"),
            [format!("logs-v1-{day}")],
            SnapshotState::Success,
        ));
    }
    cluster
}

pub fn mark_live(cluster: &InMemoryCluster, day: &str, health: Health) {
    cluster.put_index(LiveIndexRecord::open(format!("logs-v1-{day}"), health));
}

fn service(kind: OperationKind) -> OperationService {
    OperationService::with_queue(
        BoundedOperationQueue::new(kind, 1).with_poll_interval(Duration::from_millis(20)),
    )
}

/// Orchestrator whose queues have no workers attached
pub fn idle_orchestrator(cluster: &InMemoryCluster) -> Orchestrator {
    Orchestrator::new(
        Arc::new(cluster.clone()),
        TimeRangeIndexer::new(Resolution::Day, PATTERN),
        service(OperationKind::Restore),
        service(OperationKind::Delete),
    )
}

/// Orchestrator with both workers running and no settle delay
pub fn running_orchestrator(
    cluster: &InMemoryCluster,
) -> (Orchestrator, Vec<tokio::task::JoinHandle<()>>) {
    let gateway: Arc<dyn ClusterGateway> = Arc::new(cluster.clone());
    let restores = service(OperationKind::Restore);
    let deletes = service(OperationKind::Delete);
    let config = WorkerConfig::default().with_settle_delay(Duration::ZERO);
    let handles = vec![
        restores.spawn(Arc::clone(&gateway), config.clone()),
        deletes.spawn(Arc::clone(&gateway), config),
    ];
    let orchestrator = Orchestrator::new(
        gateway,
        TimeRangeIndexer::new(Resolution::Day, PATTERN),
        restores,
        deletes,
    );
    (orchestrator, handles)
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition should hold within 5s");
}
