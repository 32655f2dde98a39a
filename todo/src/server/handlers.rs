//! `/todos` endpoints.
//!
//! Reads go straight to the query side. Writes go through the request
//! coordinator: the handler mints nothing itself, it only builds the command
//! around the token it is given and renders whatever the completion event
//! carried back.

use super::state::AppState;
use crate::types::{TodoCommand, TodoId};
use crate::view::TodoView;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use relay_runtime::DispatchMode;
use relay_web::{AppError, WebResult};
use serde::Deserialize;

/// Body of `POST /todos`.
///
/// Clients may send a full view; only `title` and `order` are used, and new
/// items always start out not completed.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTodoRequest {
    /// Title of the new item
    #[serde(default)]
    pub title: String,
    /// Position in the list
    #[serde(default)]
    pub order: Option<i32>,
}

/// Body of `PATCH /todos/:id`; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodoRequest {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New completion flag
    #[serde(default)]
    pub completed: Option<bool>,
    /// New position
    #[serde(default)]
    pub order: Option<i32>,
}

/// `GET /todos`
#[tracing::instrument(skip(state))]
pub async fn list_todos(State(state): State<AppState>) -> Json<Vec<TodoView>> {
    let items = state.queries.list(&state.user_id).await;
    Json(state.views.list(&items))
}

/// `GET /todos/:id`
///
/// # Errors
///
/// 404 if the list holds no such item.
#[tracing::instrument(skip(state))]
pub async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<TodoId>,
) -> WebResult<Json<TodoView>> {
    let item = state
        .queries
        .item(&state.user_id, &id)
        .await
        .ok_or_else(|| AppError::not_found("Todo", id))?;
    Ok(Json(state.views.item(&item)))
}

/// `POST /todos`: create an item and return it once `ItemCreated` arrived.
///
/// # Errors
///
/// 422 for an invalid title, 500 if the event never arrives.
#[tracing::instrument(skip(state, request))]
pub async fn create_todo(
    State(state): State<AppState>,
    Json(request): Json<CreateTodoRequest>,
) -> WebResult<(StatusCode, Json<TodoView>)> {
    let user_id = state.user_id.clone();
    let item_id = TodoId::new();

    let item = state
        .coordinator
        .execute(state.tracker.items(), DispatchMode::AwaitAcceptance, |tracker| {
            TodoCommand::CreateItem {
                user_id,
                item_id,
                title: request.title,
                completed: false,
                order: request.order,
                tracker: Some(tracker),
            }
        })
        .await?;

    tracing::info!(%item_id, "Todo created");
    Ok((StatusCode::CREATED, Json(state.views.item(&item))))
}

/// `PATCH /todos/:id`: partial update, answered with the updated item.
///
/// # Errors
///
/// 404 for an unknown item, 422 for an invalid title, 500 if the event
/// never arrives.
#[tracing::instrument(skip(state, request))]
pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<TodoId>,
    Json(request): Json<UpdateTodoRequest>,
) -> WebResult<Json<TodoView>> {
    let user_id = state.user_id.clone();

    let item = state
        .coordinator
        .execute(state.tracker.items(), DispatchMode::AwaitAcceptance, |tracker| {
            TodoCommand::UpdateItem {
                user_id,
                item_id: id,
                title: request.title,
                completed: request.completed,
                order: request.order,
                tracker: Some(tracker),
            }
        })
        .await?;

    Ok(Json(state.views.item(&item)))
}

/// `DELETE /todos/:id`: answered with `{}` once `ItemDeleted` arrived.
///
/// # Errors
///
/// 404 for an unknown item, 500 if the event never arrives.
#[tracing::instrument(skip(state))]
pub async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<TodoId>,
) -> WebResult<Json<serde_json::Value>> {
    let user_id = state.user_id.clone();

    state
        .coordinator
        .execute(state.tracker.items(), DispatchMode::AwaitAcceptance, |tracker| {
            TodoCommand::DeleteItem {
                user_id,
                item_id: id,
                tracker: Some(tracker),
            }
        })
        .await?;

    tracing::info!(%id, "Todo deleted");
    Ok(Json(serde_json::json!({})))
}

/// `DELETE /todos`: clear the list, answered with what is left (nothing).
///
/// The command is handed off without waiting for acceptance; only the
/// `ListCleared` event is awaited.
///
/// # Errors
///
/// 500 if the command cannot be handed off or the event never arrives.
#[tracing::instrument(skip(state))]
pub async fn clear_todos(State(state): State<AppState>) -> WebResult<Json<Vec<TodoView>>> {
    let user_id = state.user_id.clone();

    let remaining = state
        .coordinator
        .execute(state.tracker.lists(), DispatchMode::FireAndForget, |tracker| {
            TodoCommand::ClearList {
                user_id,
                tracker: Some(tracker),
            }
        })
        .await?;

    Ok(Json(state.views.list(&remaining)))
}
