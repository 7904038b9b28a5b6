//! dockyard-router — the edge router in front of every deployment.
//!
//! Per request:
//!
//! ```text
//! Host ──► leftmost label ──► domain:<label> ?? label ──► project id
//!                                                           │
//!                      <id>:Port set ◄──────────────────────┤
//!                         │ yes                             │ no
//!                         ▼                                 ▼
//!              proxy to 127.0.0.1:<port>        normalize path → dist/<id><path>
//!                                                 cache ──► artifact store
//! ```

pub mod cache;
pub mod error;
pub mod path;
pub mod proxy;
pub mod resolve;

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dockyard_artifacts::ArtifactStore;
use dockyard_core::config::RouterConfig;
use dockyard_state::Coordinator;
use http::{HeaderValue, StatusCode, header};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use cache::{ArtifactCache, ArtifactCacheConfig, CacheStats};
pub use error::{RouterError, RouterResult};
pub use resolve::Target;

const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Shared state for the router handler.
pub struct RouterState {
    pub coordinator: Coordinator,
    pub artifacts: ArtifactStore,
    pub cache: Mutex<ArtifactCache>,
    pub config: RouterConfig,
}

impl RouterState {
    pub fn new(coordinator: Coordinator, artifacts: ArtifactStore, config: RouterConfig) -> Self {
        Self {
            cache: Mutex::new(ArtifactCache::new(ArtifactCacheConfig::from(&config))),
            coordinator,
            artifacts,
            config,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ArtifactCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Every path and method goes through the same handler.
pub fn build_router(state: Arc<RouterState>) -> Router {
    Router::new().fallback(handle).with_state(state)
}

/// Serve until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RouterState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "edge router listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("edge router shutting down");
        })
        .await
}

async fn handle(State(state): State<Arc<RouterState>>, request: Request) -> Response {
    match route(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "request failed");
            e.into_response()
        }
    }
}

async fn route(state: &RouterState, request: Request) -> RouterResult<Response> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .ok_or(RouterError::NoHost)?;
    let label = resolve::host_label(host).ok_or(RouterError::NoHost)?;

    match resolve::resolve(&state.coordinator, &label).await? {
        Target::Proxy { project, port } => {
            debug!(%project, port, "routing to process");
            proxy::forward(request, &state.config.upstream_host, port).await
        }
        Target::Static { project } => {
            let path = path::normalize(
                request.uri().path(),
                &state.config.static_prefix,
                &state.config.default_document,
            );
            serve_static(state, &project, &path).await
        }
    }
}

async fn serve_static(state: &RouterState, project: &str, path: &str) -> RouterResult<Response> {
    let key = path::artifact_key(project, path);

    let cached = state.lock_cache().get(&key);
    let data = match cached {
        Some(data) => data,
        None => {
            let data = state.artifacts.get(&key).await?;
            state.lock_cache().insert(&key, data.clone());
            data
        }
    };

    Ok(file_response(path, data))
}

fn file_response(path: &str, data: Bytes) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut response = Response::new(Body::from(data));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    response
}
