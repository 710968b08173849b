//! One listener for everything
//!
//! A WebSocket upgrade on any path enters the control session; plain GETs
//! serve the viewer assets; every other method is a 404.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::static_files;
use super::ws::handle_socket;
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", any(entry_handler))
        .route("/{*path}", any(entry_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn entry_handler(
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Ok(ws) = ws {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return ws.on_upgrade(move |socket| handle_socket(socket, state, host));
    }

    if method == Method::GET {
        return static_files::serve_static(&state.opts.public_dir, uri.path()).await;
    }

    StatusCode::NOT_FOUND.into_response()
}
