use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "未授权访问".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                "没有操作权限".to_string(),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                format!("{}不存在", what),
            ),
            AppError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                reason.clone(),
            ),
            AppError::Store(e) => {
                tracing::error!("Store operation failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "内部服务器错误".to_string(),
                )
            }
        };

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}
