/// Request router (C8) — spec.md §4.8.
///
/// Trivial method dispatch over two small resource trees, built the way the
/// teacher assembles `api_server.rs`'s `Router::new().route(path, method(handler))`
/// chain, with a catch-all fallback responding `403` (ported from
/// `original_source/api/restful.go`'s default case) instead of axum's
/// built-in 404.
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::frontend_service::{self, FrontendState};
use crate::response;
use crate::storage_service::{self, StorageState};

/// Shards and whole files both run well past axum's 2 MiB default body
/// limit.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

async fn not_found_fallback() -> axum::response::Response {
    response::envelope(403, "no such route")
}

/// Invoked when a path matches but the HTTP method doesn't (spec.md §4.3's
/// "405 on unsupported method") — keeps the `{code, msg}` envelope instead
/// of axum's default plaintext 405.
async fn method_not_allowed_fallback() -> axum::response::Response {
    response::envelope(405, "method not allowed")
}

/// Builds the frontend role's router (`/file`, `/checkfile`).
pub fn frontend_router(state: FrontendState, read_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/file",
            put(frontend_service::put_file)
                .get(frontend_service::get_file)
                .delete(frontend_service::delete_file)
                .fallback(method_not_allowed_fallback),
        )
        .route(
            "/checkfile",
            get(frontend_service::check_file).fallback(method_not_allowed_fallback),
        )
        .fallback(not_found_fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(read_timeout))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Builds the storage role's router (`/shard`, `/checkshard`).
pub fn storage_router(state: StorageState, read_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/shard",
            put(storage_service::put_shard)
                .delete(storage_service::delete_shard)
                .get(storage_service::get_shard)
                .fallback(method_not_allowed_fallback),
        )
        .route(
            "/checkshard",
            get(storage_service::check_shard).fallback(method_not_allowed_fallback),
        )
        .fallback(not_found_fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(read_timeout))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
