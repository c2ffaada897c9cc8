//! Task handlers.
//!
//! Mutations answer `200` once the search index has caught up. When the
//! ledger committed but the index did not confirm, they answer `202` with
//! `x-index-sync: pending`; the body still carries the committed record.

use std::future::Future;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tasq_core::ledger::TaskError;
use tasq_core::models::task::TaskRecord;
use tasq_core::sync::Synced;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentPrincipal;
use crate::models::{SearchQuery, TaskInput, TaskResponse, drafts_from_inputs};

pub const INDEX_SYNC_HEADER: HeaderName = HeaderName::from_static("x-index-sync");

fn pending_header() -> (HeaderName, HeaderValue) {
    (INDEX_SYNC_HEADER, HeaderValue::from_static("pending"))
}

/// Run a mutation on its own task so a dropped connection cannot cancel it
/// between the ledger commit and index propagation.
async fn detached<T, F>(mutation: F) -> AppResult<T>
where
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(|e| AppError::Internal(format!("mutation task failed: {e}")))?
        .map_err(AppError::from)
}

fn synced_task(synced: Synced<TaskRecord>) -> Response {
    if synced.is_converged() {
        return Json(TaskResponse::from(synced.value)).into_response();
    }
    (
        StatusCode::ACCEPTED,
        [pending_header()],
        Json(TaskResponse::from(synced.value)),
    )
        .into_response()
}

/// `POST /todo/add`
pub async fn create_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<TaskInput>,
) -> AppResult<Response> {
    let draft = body.to_draft()?;
    let tasks = state.tasks.clone();
    let synced = detached(async move { tasks.create(&principal.account_id, &draft).await }).await?;
    Ok(synced_task(synced))
}

/// `POST /todo/add/bulk`: all or nothing; every invalid entry is reported.
pub async fn create_bulk_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<Vec<TaskInput>>,
) -> AppResult<Response> {
    let drafts = drafts_from_inputs(&body)?;
    let tasks = state.tasks.clone();
    let synced =
        detached(async move { tasks.create_many(&principal.account_id, &drafts).await }).await?;
    let converged = synced.iter().all(Synced::is_converged);
    let tasks: Vec<TaskResponse> = synced
        .into_iter()
        .map(|s| TaskResponse::from(s.into_value()))
        .collect();
    if converged {
        Ok(Json(tasks).into_response())
    } else {
        Ok((StatusCode::ACCEPTED, [pending_header()], Json(tasks)).into_response())
    }
}

/// `GET /todo`
pub async fn list_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let records = state.search.list_by_owner(&principal.account_id).await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

/// `GET /todo/search?name=`
pub async fn search_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let fragment = query.fragment()?;
    let records = state
        .search
        .search_by_name_and_owner(&principal.account_id, &fragment)
        .await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

/// `GET /todo/completed`
pub async fn completed_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let records = state
        .search
        .list_by_owner_and_completion(&principal.account_id, true)
        .await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

/// `GET /todo/pending`
pub async fn pending_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let records = state
        .search
        .list_by_owner_and_completion(&principal.account_id, false)
        .await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

/// `GET /todo/{id}`: served from the ledger.
pub async fn get_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<TaskResponse>> {
    let record = state
        .tasks
        .get(&id, &principal.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    Ok(Json(TaskResponse::from(record)))
}

/// `PUT /todo/edit/{id}`
pub async fn update_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Json(body): Json<TaskInput>,
) -> AppResult<Response> {
    let draft = body.to_draft()?;
    let tasks = state.tasks.clone();
    let synced =
        detached(async move { tasks.update(&id, &principal.account_id, &draft).await }).await?;
    Ok(synced_task(synced))
}

/// `PATCH /todo/{id}/complete`
pub async fn complete_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let tasks = state.tasks.clone();
    let synced = detached(async move { tasks.complete(&id, &principal.account_id).await }).await?;
    Ok(synced_task(synced))
}

/// `DELETE /todo/delete/{id}`
pub async fn delete_handler(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let tasks = state.tasks.clone();
    let synced = detached(async move { tasks.delete(&id, &principal.account_id).await }).await?;
    if synced.is_converged() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok((StatusCode::ACCEPTED, [pending_header()]).into_response())
    }
}
