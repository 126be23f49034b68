use axum::{
    extract::{Query, Request, State},
    http::header::UPGRADE,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use serde::Deserialize;

use crate::{AppState, error::AppError, utils::verify_token};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// 浏览器 WebSocket 无法设置请求头，升级请求允许通过 `?token=` 传递令牌
fn upgrade_query_token(req: &Request) -> Option<String> {
    let is_websocket = req
        .headers()
        .get(UPGRADE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    if !is_websocket {
        return None;
    }

    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

/// 校验 Bearer 令牌，并把解析出的 Claims 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer {
        Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_string(),
        Err(_) => upgrade_query_token(&req).ok_or(AppError::Unauthorized)?,
    };

    let claims = verify_token(&token, &state.config.jwt_secret).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
