use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::repositories;
use crate::store::IndexStore;

pub struct AppState {
    pub index: Arc<IndexStore>,
}

impl AppState {
    #[must_use]
    pub fn new(index: Arc<IndexStore>) -> Self {
        Self { index }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn repositories_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/repositories", get(repositories::suggest_repositories))
        .route("/repositories/sync", post(repositories::sync_repositories))
        .route("/repositories/active", get(repositories::list_active))
        .route(
            "/repositories/{name}/activate",
            post(repositories::activate),
        )
        .route(
            "/repositories/{name}/commits",
            get(repositories::search_commits),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", repositories_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
