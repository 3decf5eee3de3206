//! Router construction and the server run loop.

use crate::routes::{self, AppState};
use crate::{openai_compat, ws};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tabrelay_types::config::RelayConfig;
use tabrelay_wire::RelayService;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Errors that stop the server from running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address '{addr}': {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("Invalid peer socket path '{path}': {reason}")]
    InvalidWsPath { path: String, reason: &'static str },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Routes the API owns; the peer socket cannot share them.
const API_ROUTES: &[&str] = &["/v1/chat/completions", "/v1/models", "/health"];

/// Reject peer socket routes axum cannot mount next to the API.
pub fn check_ws_route(route: &str) -> Result<(), ServerError> {
    let invalid = |reason| {
        Err(ServerError::InvalidWsPath {
            path: route.to_string(),
            reason,
        })
    };
    if !route.starts_with('/') {
        return invalid("must start with '/'");
    }
    if API_ROUTES.contains(&route) {
        return invalid("collides with an API route");
    }
    if route.contains(['{', '}', '*', ':']) {
        return invalid("must be a literal path without captures or wildcards");
    }
    Ok(())
}

/// Build the full router over shared state.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ServerError> {
    let ws_route = state.config.ws_route();
    check_ws_route(&ws_route)?;
    let router = Router::new()
        .route("/v1/chat/completions", post(openai_compat::chat_completions))
        .route("/v1/models", get(openai_compat::list_models))
        .route("/health", get(routes::health))
        .route(&ws_route, get(ws::peer_socket))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    Ok(router)
}

/// Serve on an already-bound listener until `shutdown` completes.
///
/// Starts the relay first and stops it on the way out, so requests still
/// waiting on the peer are released instead of holding the shutdown open.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::clone(&state))?;
    state.relay.start();

    let local_addr = listener.local_addr()?;
    info!(
        "TabRelay listening on http://{local_addr} (peer socket ws://{local_addr}{})",
        state.config.ws_route()
    );

    let stopping = Arc::clone(&state);
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutdown signal received");
        stopping.begin_shutdown();
        stopping.relay.stop().await;
    })
    .await;

    state.relay.stop().await;
    result.map_err(ServerError::from)
}

/// Bind the configured address and serve until `shutdown` completes.
pub async fn run_server<F>(config: RelayConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|source| ServerError::InvalidAddr {
            addr: config.listen_addr.clone(),
            source,
        })?;
    check_ws_route(&config.ws_route())?;
    let listener = TcpListener::bind(addr).await?;
    let state = Arc::new(AppState::new(RelayService::new(), config));
    serve(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state_with_ws_path(ws_path: &str) -> Arc<AppState> {
        let config = RelayConfig {
            ws_path: ws_path.to_string(),
            ..RelayConfig::default()
        };
        Arc::new(AppState::new(RelayService::new(), config))
    }

    #[tokio::test]
    async fn test_ws_path_without_slash_is_mounted() {
        let app = build_router(state_with_ws_path("ws")).unwrap();
        let response = app
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // Not an upgrade request, but the route exists.
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ws_path_colliding_with_api_is_rejected() {
        let err = build_router(state_with_ws_path("/health")).unwrap_err();
        assert!(matches!(err, ServerError::InvalidWsPath { .. }));
    }

    #[test]
    fn test_check_ws_route() {
        assert!(check_ws_route("/ws").is_ok());
        assert!(check_ws_route("/peer/socket").is_ok());
        assert!(check_ws_route("ws").is_err());
        assert!(check_ws_route("/v1/models").is_err());
        assert!(check_ws_route("/{id}").is_err());
        assert!(check_ws_route("/:id").is_err());
    }

    #[tokio::test]
    async fn test_run_server_rejects_bad_ws_path_before_binding() {
        let config = RelayConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ws_path: "/v1/chat/completions".to_string(),
            ..RelayConfig::default()
        };
        let err = run_server(config, std::future::pending()).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidWsPath { .. }));
    }
}
