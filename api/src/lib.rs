//! Read-only HTTP view of the image store.
//!
//! `GET /` and `GET /<path>` either list a directory as HTML or stream a
//! stored image back with chunked transfer encoding. Anything that does not
//! resolve to an entry under the storage root is a bare 404.

pub mod listing;
pub mod resolve;
pub mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sdcam_common::config::StorageConfig;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use resolve::{resolve, ListingEntry, Resolved};

pub struct AppState {
    root: PathBuf,
    read_chunk_bytes: usize,
}

impl AppState {
    pub fn new(root: impl Into<PathBuf>, read_chunk_bytes: usize) -> Self {
        Self {
            root: root.into(),
            read_chunk_bytes: read_chunk_bytes.max(1),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(&storage.root, storage.read_chunk_bytes)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_resource))
        .route("/*path", get(serve_resource))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_resource(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    match resolve(&state.root, uri.path()).await {
        Resolved::Directory(entries) => {
            // resolve() only yields a directory for a path it could decode.
            let segments = resolve::request_segments(uri.path()).unwrap_or_default();
            let html = listing::render_listing(&segments, &entries);
            (
                [(CONTENT_TYPE, "text/html"), (CONTENT_ENCODING, "identity")],
                html,
            )
                .into_response()
        }
        Resolved::File(file) => (
            [(CONTENT_TYPE, "image/pgm")],
            stream::file_body(file, state.read_chunk_bytes),
        )
            .into_response(),
        Resolved::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener, ApiError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::Bind(addr.to_string(), e))
}

/// Serve `state` on `listener` until the process exits.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ApiError> {
    if let Ok(addr) = listener.local_addr() {
        info!(
            addr = addr.to_string(),
            root = state.root.display().to_string(),
            "HTTP server listening"
        );
    }
    axum::serve(listener, router(state))
        .await
        .map_err(ApiError::Serve)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("HTTP server failed: {0}")]
    Serve(std::io::Error),
}
