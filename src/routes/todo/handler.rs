use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::model::{DeleteTodoResponse, validate_new, validate_patch};
use crate::cache::keys::{LEADERBOARD_KEY, TODOS_TTL, todos_key, user_key};
use crate::error::AppError;
use crate::routes::cached;
use crate::store::{NewTodo, TodoPatch};
use crate::utils::{Claims, cache_header, success_to_api_response};
use crate::AppState;

#[axum::debug_handler]
pub async fn list_todos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let (todos, status) = cached(&state.cache, &todos_key(&claims.sub), TODOS_TTL, || {
        state.store.list_todos(&claims.sub)
    })
    .await?;

    Ok((StatusCode::OK, cache_header(status), success_to_api_response(todos)))
}

#[axum::debug_handler]
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewTodo>,
) -> Result<impl IntoResponse, AppError> {
    validate_new(&req)?;
    let todo = state.store.create_todo(&claims.sub, req).await?;

    state.cache.delete(&todos_key(&claims.sub));
    Ok((StatusCode::CREATED, success_to_api_response(todo)))
}

#[axum::debug_handler]
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(todo_id): Path<Uuid>,
    Json(patch): Json<TodoPatch>,
) -> Result<impl IntoResponse, AppError> {
    validate_patch(&patch)?;
    let change = state
        .store
        .update_todo(&claims.sub, todo_id, patch)
        .await?
        .ok_or(AppError::NotFound("待办"))?;

    state.cache.delete(&todos_key(&claims.sub));
    // 积分已随更新一起写入，资料缓存和排行榜随之失效
    if change.newly_completed() {
        state.cache.delete(&user_key(&claims.sub));
        state.cache.delete(LEADERBOARD_KEY);
    }

    Ok((StatusCode::OK, success_to_api_response(change.todo)))
}

#[axum::debug_handler]
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(todo_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_todo(&claims.sub, todo_id).await? {
        return Err(AppError::NotFound("待办"));
    }

    state.cache.delete(&todos_key(&claims.sub));
    Ok((
        StatusCode::OK,
        success_to_api_response(DeleteTodoResponse { success: true }),
    ))
}
