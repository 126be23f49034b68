use std::time::Instant;

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

/// 服务端错误最多记录的响应体字节数
const MAX_LOGGED_BODY: usize = 1024;

/// 记录请求结果：服务端错误带响应体，限流拒绝单独记录
pub async fn log_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status == StatusCode::TOO_MANY_REQUESTS {
        info!(%method, %path, elapsed_ms, "Request throttled");
        return response;
    }

    if !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            error!(%method, %path, %status, "Failed to read error response body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let logged = &bytes[..bytes.len().min(MAX_LOGGED_BODY)];
    error!(
        %method,
        %path,
        %status,
        elapsed_ms,
        body_len = bytes.len(),
        "Server error occurred - Body: {}",
        String::from_utf8_lossy(logged)
    );

    // 重置body以便重新构建响应
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
