use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use conform_check::Orchestrator;
use conform_core::ConformError;
use conform_repo::Workspace;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::require_api_key;
use crate::routes;

/// Prefix under which every route is mounted.
pub const API_PREFIX: &str = "/api/v1";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub(crate) orchestrator: Orchestrator,
    api_key: Option<Arc<str>>,
    pub(crate) workspace: Arc<Workspace>,
}

impl AppState {
    /// An empty `api_key` is treated as unset.
    pub fn new(orchestrator: Orchestrator, api_key: Option<String>, workspace_root: PathBuf) -> Self {
        Self {
            orchestrator,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
            workspace: Arc::new(Workspace::new(workspace_root)),
        }
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/compliance/check", axum::routing::post(routes::start_check))
        .route(
            "/compliance/check/{id}",
            get(routes::get_check).delete(routes::delete_check),
        )
        .route("/compliance/check/{id}/todo", get(routes::get_todo))
        .route("/compliance/checks", get(routes::list_checks))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let api = Router::new()
        .route("/health", get(routes::health))
        .merge(protected);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ConformError::Io`] if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ConformError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
