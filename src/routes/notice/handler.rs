use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::cache::keys::{NOTICES_KEY, NOTICES_TTL};
use crate::error::AppError;
use crate::routes::cached;
use crate::store::NewNotice;
use crate::utils::{Claims, cache_header, success_to_api_response};
use crate::AppState;

/// 列表返回的最新公告数量
pub const NOTICE_LIMIT: i64 = 20;

#[axum::debug_handler]
pub async fn list_notices(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (notices, status) = cached(&state.cache, NOTICES_KEY, NOTICES_TTL, || {
        state.store.list_notices(NOTICE_LIMIT)
    })
    .await?;

    Ok((StatusCode::OK, cache_header(status), success_to_api_response(notices)))
}

#[axum::debug_handler]
pub async fn create_notice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewNotice>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_admin {
        return Err(AppError::Forbidden);
    }
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(AppError::BadRequest("标题和内容不能为空".into()));
    }

    let notice = state.store.create_notice(&claims.sub, req).await?;
    state.cache.delete(NOTICES_KEY);
    Ok((StatusCode::CREATED, success_to_api_response(notice)))
}
