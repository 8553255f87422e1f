use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    ClusterError, ClusterGateway, ClusterHealth, Health, LiveIndexRecord, RestoreOutcome,
    ShardCounts, SnapshotRecord, SnapshotState,
};

/// In-process cluster used by tests and local dry runs.
///
/// Restores succeed when a SUCCESS snapshot in the repository lists the
/// index; the restored index appears live with [`InMemoryCluster::set_restore_health`]
/// health (green by default). Shard results, latency and reachability can be
/// adjusted to exercise failure paths.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    unreachable: AtomicBool,
    list_calls: AtomicUsize,
    snapshot_calls: AtomicUsize,
    restore_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    active_restores: AtomicUsize,
    peak_restores: AtomicUsize,
}

#[derive(Default)]
struct State {
    snapshots: HashMap<String, Vec<SnapshotRecord>>,
    indices: BTreeMap<String, LiveIndexRecord>,
    restore_delay: Duration,
    restore_health: Option<Health>,
    restore_shards: Option<ShardCounts>,
    fail_deletes: bool,
}

impl InMemoryCluster {
    /// Empty cluster with no repositories or live indices
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot under its repository path
    pub fn add_snapshot(&self, record: SnapshotRecord) {
        self.inner
            .state
            .write()
            .snapshots
            .entry(record.repository.clone())
            .or_default()
            .push(record);
    }

    /// Place an index on the live cluster, replacing any previous record
    pub fn put_index(&self, record: LiveIndexRecord) {
        self.inner
            .state
            .write()
            .indices
            .insert(record.name.clone(), record);
    }

    /// Remove a live index, returning it if present
    pub fn remove_index(&self, name: &str) -> Option<LiveIndexRecord> {
        self.inner.state.write().indices.remove(name)
    }

    /// Current record for a live index
    pub fn live_index(&self, name: &str) -> Option<LiveIndexRecord> {
        self.inner.state.read().indices.get(name).cloned()
    }

    /// Make every call fail with a transport error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hold every restore for `delay` before it completes
    pub fn set_restore_delay(&self, delay: Duration) {
        self.inner.state.write().restore_delay = delay;
    }

    /// Health given to indices created by restores
    pub fn set_restore_health(&self, health: Health) {
        self.inner.state.write().restore_health = Some(health);
    }

    /// Override the shard counts reported by restores
    pub fn set_restore_shards(&self, shards: ShardCounts) {
        self.inner.state.write().restore_shards = Some(shards);
    }

    /// Make every delete fail
    pub fn set_fail_deletes(&self, fail: bool) {
        self.inner.state.write().fail_deletes = fail;
    }

    /// Number of live index listings served
    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Number of snapshot listings served
    pub fn snapshot_calls(&self) -> usize {
        self.inner.snapshot_calls.load(Ordering::SeqCst)
    }

    /// Number of restores started
    pub fn restore_calls(&self) -> usize {
        self.inner.restore_calls.load(Ordering::SeqCst)
    }

    /// Number of deletes attempted
    pub fn delete_calls(&self) -> usize {
        self.inner.delete_calls.load(Ordering::SeqCst)
    }

    /// Highest number of restores observed in flight at once
    pub fn peak_concurrent_restores(&self) -> usize {
        self.inner.peak_restores.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, endpoint: &str) -> Result<(), ClusterError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(ClusterError::Transport {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn finish_restore(&self, repository_path: &str, index: &str) -> RestoreOutcome {
        let mut state = self.inner.state.write();

        let snapshot = state.snapshots.get(repository_path).and_then(|records| {
            records
                .iter()
                .find(|r| r.state == SnapshotState::Success && r.contains_index(index))
                .map(|r| r.snapshot.clone())
        });

        let Some(snapshot) = snapshot else {
            return RestoreOutcome::default();
        };

        let shards = state.restore_shards.unwrap_or(ShardCounts {
            total: 1,
            failed: 0,
            successful: 1,
        });
        if shards.successful > 0 {
            let health = state.restore_health.clone().unwrap_or(Health::Green);
            state
                .indices
                .insert(index.to_string(), LiveIndexRecord::open(index, health));
        }

        RestoreOutcome {
            snapshot,
            indices: vec![index.to_string()],
            shards,
        }
    }
}

#[async_trait]
impl ClusterGateway for InMemoryCluster {
    async fn list_snapshots(
        &self,
        repository_path: &str,
    ) -> Result<Vec<SnapshotRecord>, ClusterError> {
        self.inner.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(repository_path)?;
        Ok(self
            .inner
            .state
            .read()
            .snapshots
            .get(repository_path)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_indices(&self) -> Result<Vec<LiveIndexRecord>, ClusterError> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable("_cat/indices")?;
        Ok(self.inner.state.read().indices.values().cloned().collect())
    }

    async fn restore_index(
        &self,
        repository_path: &str,
        index: &str,
    ) -> Result<RestoreOutcome, ClusterError> {
        self.inner.restore_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(repository_path)?;

        let active = self.inner.active_restores.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_restores.fetch_max(active, Ordering::SeqCst);

        let delay = self.inner.state.read().restore_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.finish_restore(repository_path, index);
        self.inner.active_restores.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn delete_index(&self, index: &str) -> Result<(), ClusterError> {
        self.inner.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(index)?;

        let mut state = self.inner.state.write();
        if state.fail_deletes || state.indices.remove(index).is_none() {
            return Err(ClusterError::Status {
                endpoint: index.to_string(),
                status: 404,
                body: format!("no such index [{index}]"),
            });
        }
        Ok(())
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, ClusterError> {
        self.check_reachable("_cluster/health")?;
        Ok(ClusterHealth {
            cluster_name: "in-memory".to_string(),
            status: Health::Green,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        cluster.add_snapshot(SnapshotRecord::new(
            "logs-2020/logs-2020-01-01",
            "logs-2020-01-01",
            ["logs-v1-2020-01-01"],
            SnapshotState::Success,
        ));
        cluster
    }

    #[tokio::test]
    async fn test_restore_makes_index_live() {
        let cluster = seeded();
        let outcome = cluster
            .restore_index("logs-2020/logs-2020-01-01", "logs-v1-2020-01-01")
            .await
            .unwrap();

        assert_eq!(outcome.indices, vec!["logs-v1-2020-01-01".to_string()]);
        assert_eq!(outcome.shards.successful, outcome.shards.total);
        assert_eq!(
            cluster.live_index("logs-v1-2020-01-01").unwrap().health,
            Health::Green
        );
    }

    #[tokio::test]
    async fn test_restore_of_unknown_index_reports_nothing() {
        let cluster = seeded();
        let outcome = cluster
            .restore_index("logs-2020/logs-2020-01-01", "missing")
            .await
            .unwrap();
        assert!(outcome.indices.is_empty());
        assert!(cluster.live_index("missing").is_none());
    }

    #[tokio::test]
    async fn test_delete_and_unreachable() {
        let cluster = seeded();
        cluster.put_index(LiveIndexRecord::open("idx", Health::Yellow));
        cluster.delete_index("idx").await.unwrap();
        assert!(cluster.delete_index("idx").await.is_err());

        cluster.set_unreachable(true);
        assert!(matches!(
            cluster.list_indices().await,
            Err(ClusterError::Transport { .. })
        ));
        assert_eq!(cluster.list_calls(), 1);
    }
}
