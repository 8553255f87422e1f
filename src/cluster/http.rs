// HTTP client for the Elasticsearch snapshot and cat APIs

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    ClusterError, ClusterGateway, ClusterHealth, Health, LiveIndexRecord, OpenState,
    RestoreOutcome, ShardCounts, SnapshotRecord, SnapshotState,
};

/// Connection settings for [`ElasticsearchGateway`]
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Cluster root, e.g. `http://localhost:9200`
    pub base_url: String,
    /// Bound on listing, delete and health calls
    pub request_timeout: Duration,
    /// Bound on a restore waiting for completion
    pub operation_timeout: Duration,
}

impl GatewayConfig {
    /// Config with default timeouts
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Bound for listing, delete and health calls
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound for a single restore
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            request_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(3600),
        }
    }
}

/// [`ClusterGateway`] over the Elasticsearch REST API
pub struct ElasticsearchGateway {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    operation_timeout: Duration,
}

#[derive(Deserialize)]
struct SnapshotListResponse {
    #[serde(default)]
    snapshots: Vec<SnapshotEntry>,
}

#[derive(Deserialize)]
struct SnapshotEntry {
    snapshot: String,
    #[serde(default)]
    indices: Vec<String>,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
struct CatIndexEntry {
    #[serde(default)]
    health: String,
    #[serde(default)]
    status: String,
    index: String,
}

#[derive(Serialize)]
struct RestoreRequest<'a> {
    indices: &'a str,
}

#[derive(Deserialize)]
struct RestoreResponse {
    snapshot: RestoreSnapshot,
}

#[derive(Deserialize)]
struct RestoreSnapshot {
    #[serde(default)]
    snapshot: String,
    #[serde(default)]
    indices: Vec<String>,
    #[serde(default)]
    shards: RestoreShards,
}

#[derive(Deserialize, Default)]
struct RestoreShards {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    successful: u32,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    cluster_name: String,
    status: String,
}

impl ElasticsearchGateway {
    /// Build the HTTP client
    pub fn new(config: GatewayConfig) -> Result<Self, ClusterError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClusterError::Transport {
                endpoint: config.base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            operation_timeout: config.operation_timeout,
        })
    }

    /// Cluster root without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Run `call` under `timeout`, covering both the send and the body decode
    async fn bounded<T, F>(&self, endpoint: &str, timeout: Duration, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClusterError::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            }),
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClusterError> {
        request.send().await.map_err(|e| transport_error(endpoint, e))
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ClusterError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response.json::<T>().await.map_err(|e| ClusterError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> ClusterError {
    ClusterError::Transport {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ClusterGateway for ElasticsearchGateway {
    #[instrument(skip(self))]
    async fn list_snapshots(
        &self,
        repository_path: &str,
    ) -> Result<Vec<SnapshotRecord>, ClusterError> {
        let endpoint = self.endpoint(&format!("_snapshot/{repository_path}"));
        debug!(endpoint = %endpoint, "Listing snapshots");

        self.bounded(&endpoint, self.request_timeout, async {
            let response = self.send(&endpoint, self.client.get(&endpoint)).await?;

            // A missing repository or snapshot lists as empty
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }

            let body: SnapshotListResponse = Self::decode(&endpoint, response).await?;
            Ok(body
                .snapshots
                .into_iter()
                .map(|entry| {
                    SnapshotRecord::new(
                        repository_path,
                        entry.snapshot,
                        entry.indices,
                        SnapshotState::from(entry.state.as_str()),
                    )
                })
                .collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_indices(&self) -> Result<Vec<LiveIndexRecord>, ClusterError> {
        let endpoint = self.endpoint("_cat/indices?format=json");

        self.bounded(&endpoint, self.request_timeout, async {
            let response = self.send(&endpoint, self.client.get(&endpoint)).await?;
            let entries: Vec<CatIndexEntry> = Self::decode(&endpoint, response).await?;
            Ok(entries
                .into_iter()
                .map(|entry| {
                    LiveIndexRecord::new(
                        entry.index,
                        OpenState::from(entry.status.as_str()),
                        Health::from(entry.health.as_str()),
                    )
                })
                .collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn restore_index(
        &self,
        repository_path: &str,
        index: &str,
    ) -> Result<RestoreOutcome, ClusterError> {
        let endpoint = self.endpoint(&format!(
            "_snapshot/{repository_path}/_restore?wait_for_completion=true"
        ));
        debug!(endpoint = %endpoint, index = %index, "Restoring snapshot");

        self.bounded(&endpoint, self.operation_timeout, async {
            let request = self
                .client
                .post(&endpoint)
                .json(&RestoreRequest { indices: index });
            let response = self.send(&endpoint, request).await?;
            let body: RestoreResponse = Self::decode(&endpoint, response).await?;
            Ok(RestoreOutcome {
                snapshot: body.snapshot.snapshot,
                indices: body.snapshot.indices,
                shards: ShardCounts {
                    total: body.snapshot.shards.total,
                    failed: body.snapshot.shards.failed,
                    successful: body.snapshot.shards.successful,
                },
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<(), ClusterError> {
        let endpoint = self.endpoint(index);

        self.bounded(&endpoint, self.request_timeout, async {
            let response = self.send(&endpoint, self.client.delete(&endpoint)).await?;
            let _: serde_json::Value = Self::decode(&endpoint, response).await?;
            Ok(())
        })
        .await
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, ClusterError> {
        let endpoint = self.endpoint("_cluster/health");

        self.bounded(&endpoint, self.request_timeout, async {
            let response = self.send(&endpoint, self.client.get(&endpoint)).await?;
            let body: HealthResponse = Self::decode(&endpoint, response).await?;
            Ok(ClusterHealth {
                cluster_name: body.cluster_name,
                status: Health::from(body.status.as_str()),
            })
        })
        .await
    }
}
