//! HTTP surface
//!
//! | Method | Path | |
//! |---|---|---|
//! | `GET` | `/{start}/{end}` | availability of the window |
//! | `POST` | `/{start}/{end}` | restore Pending indices |
//! | `DELETE` | `/{start}/{end}` | delete Ready indices |
//! | `GET` | `/healthz` | cluster reachability |
//! | `GET` | `/metrics` | Prometheus text |
//!
//! `start` and `end` are epoch seconds. `resolution` and `repo_pattern`
//! query parameters override the process defaults for one request. Window
//! responses carry the `{ready, pending, restoring, deleting}` lists.

/// API error type
pub mod error;
mod handlers;

pub use error::{ApiError, ApiErrorBody};
pub use handlers::RangeQuery;

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cluster::ClusterGateway;
use crate::orchestrator::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Request orchestration
    pub orchestrator: Arc<Orchestrator>,
    /// Cluster used by `/healthz`
    pub gateway: Arc<dyn ClusterGateway>,
}

impl AppState {
    /// State shared by every handler
    pub fn new(orchestrator: Arc<Orchestrator>, gateway: Arc<dyn ClusterGateway>) -> Self {
        Self {
            orchestrator,
            gateway,
        }
    }
}

/// Build the router with request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::handle_health))
        .route("/metrics", get(handlers::handle_metrics))
        .route(
            "/{start}/{end}",
            get(handlers::handle_status)
                .post(handlers::handle_restore)
                .delete(handlers::handle_delete),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %Uuid::new_v4()
                )
            }),
        )
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
