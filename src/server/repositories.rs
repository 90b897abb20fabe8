use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::auth::RequireToken;
use super::dto::QueryParams;
use super::response::{ApiError, ApiResponse};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::store::IndexStore;

/// Runs `op`, and if the tenant turns out not to be provisioned, syncs once and retries.
fn with_provisioning<T>(
    index: &IndexStore,
    token: &str,
    op: impl Fn(&IndexStore) -> Result<T>,
) -> Result<T> {
    match op(index) {
        Err(Error::NotProvisioned(reason)) => {
            tracing::info!("Provisioning on demand: {reason}");
            index.sync_repositories(token)?;
            op(index)
        }
        other => other,
    }
}

/// Moves a store call off the async executor.
async fn run_blocking<T, F>(state: &AppState, f: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&IndexStore) -> Result<T> + Send + 'static,
{
    let index = Arc::clone(&state.index);
    tokio::task::spawn_blocking(move || f(&index))
        .await
        .map_err(|e| {
            tracing::error!("Store task failed: {e}");
            ApiError::internal("Internal server error")
        })?
        .map_err(ApiError::from)
}

pub async fn suggest_repositories(
    RequireToken(token): RequireToken,
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> impl IntoResponse {
    let names = run_blocking(&state, move |index| {
        with_provisioning(index, &token, |index| {
            index.suggest_inactive(&token, &params.q)
        })
    })
    .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(names)))
}

pub async fn sync_repositories(
    RequireToken(token): RequireToken,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let repositories = run_blocking(&state, move |index| index.sync_repositories(&token)).await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(repositories)))
}

pub async fn list_active(
    RequireToken(token): RequireToken,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let repositories = run_blocking(&state, move |index| {
        with_provisioning(index, &token, |index| index.list_active(&token))
    })
    .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(repositories)))
}

pub async fn activate(
    RequireToken(token): RequireToken,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    run_blocking(&state, move |index| {
        with_provisioning(index, &token, |index| index.activate(&token, &name))
    })
    .await?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn search_commits(
    RequireToken(token): RequireToken,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<QueryParams>,
) -> impl IntoResponse {
    let commits = run_blocking(&state, move |index| {
        with_provisioning(index, &token, |index| {
            index.search_commits(&token, &name, &params.q)
        })
    })
    .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(commits)))
}
