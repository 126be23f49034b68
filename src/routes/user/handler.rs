use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{LEADERBOARD_SIZE, validate_profile_patch};
use crate::cache::keys::{LEADERBOARD_KEY, LEADERBOARD_TTL, PROFILE_TTL, user_key};
use crate::error::AppError;
use crate::routes::cached;
use crate::store::ProfilePatch;
use crate::utils::{Claims, cache_header, success_to_api_response};
use crate::AppState;

#[axum::debug_handler]
pub async fn leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (entries, status) = cached(&state.cache, LEADERBOARD_KEY, LEADERBOARD_TTL, || {
        state.store.leaderboard(LEADERBOARD_SIZE)
    })
    .await?;

    Ok((StatusCode::OK, cache_header(status), success_to_api_response(entries)))
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    // 只缓存存在的资料，未开通的用户每次都回源
    let (profile, status) = cached(&state.cache, &user_key(&claims.sub), PROFILE_TTL, || async {
        state
            .store
            .get_profile(&claims.sub)
            .await?
            .ok_or(AppError::NotFound("用户"))
    })
    .await?;

    Ok((StatusCode::OK, cache_header(status), success_to_api_response(profile)))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<ProfilePatch>,
) -> Result<impl IntoResponse, AppError> {
    validate_profile_patch(&patch)?;
    let profile = state
        .store
        .update_profile(&claims.sub, patch)
        .await?
        .ok_or(AppError::NotFound("用户"))?;

    state.cache.delete(&user_key(&claims.sub));
    state.cache.delete(LEADERBOARD_KEY);
    Ok((StatusCode::OK, success_to_api_response(profile)))
}
