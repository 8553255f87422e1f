use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use esio::cluster::{ClusterGateway, ElasticsearchGateway};
use esio::config::Config;
use esio::index::TimeRangeIndexer;
use esio::observability::init_logging;
use esio::orchestrator::Orchestrator;
use esio::queue::{BoundedOperationQueue, OperationKind};
use esio::server::{self, AppState};
use esio::worker::OperationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.log_format);
    config.validate().context("invalid configuration")?;

    info!(
        es_host = %config.es_host,
        resolution = %config.resolution,
        repo_pattern = %config.repo_pattern,
        max_restore = config.max_restore,
        max_delete = config.max_delete,
        "Starting esio"
    );

    let gateway: Arc<dyn ClusterGateway> = Arc::new(
        ElasticsearchGateway::new(config.gateway_config())
            .context("failed to build Elasticsearch client")?,
    );

    let restores = OperationService::with_queue(
        BoundedOperationQueue::new(OperationKind::Restore, config.max_restore)
            .with_poll_interval(config.poll_interval()),
    );
    let deletes = OperationService::with_queue(
        BoundedOperationQueue::new(OperationKind::Delete, config.max_delete)
            .with_poll_interval(config.poll_interval()),
    );
    let restore_worker = restores.spawn(Arc::clone(&gateway), config.worker_config());
    let delete_worker = deletes.spawn(Arc::clone(&gateway), config.worker_config());

    let indexer = TimeRangeIndexer::new(config.resolution, config.repo_pattern.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&gateway),
        indexer,
        restores,
        deletes,
    ));

    let router = server::router(AppState::new(orchestrator, gateway));
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    server::serve(listener, router, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    restore_worker.abort();
    delete_worker.abort();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
