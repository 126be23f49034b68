use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

use crate::limiter::{RateLimitConfig, RateLimiter};
use crate::utils::Claims;

static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// 从请求中提取限流键
pub type KeyFn = fn(&Request) -> String;

/// 按路由分组的限流档位，决定键前缀和键的组成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTier {
    /// 全部请求，按客户端 IP
    Global,
    /// 所有受保护接口，按用户和 IP
    Api,
    /// 公告接口，按用户和 IP
    Notices,
    /// 聊天连接，只按用户
    Message,
}

impl RateLimitTier {
    pub fn prefix(self) -> &'static str {
        match self {
            RateLimitTier::Global => "global",
            RateLimitTier::Api => "api",
            RateLimitTier::Notices => "notices",
            RateLimitTier::Message => "message",
        }
    }

    pub fn key_fn(self) -> KeyFn {
        match self {
            RateLimitTier::Global => client_ip,
            RateLimitTier::Api | RateLimitTier::Notices => user_and_ip,
            RateLimitTier::Message => user_only,
        }
    }
}

/// 限流策略：限流器 + 键提取函数 + 键前缀
pub struct RateLimitPolicy {
    prefix: &'static str,
    limiter: Arc<RateLimiter>,
    key_fn: KeyFn,
}

impl RateLimitPolicy {
    pub fn new(prefix: &'static str, config: RateLimitConfig, key_fn: KeyFn) -> Self {
        Self::from_limiter(prefix, Arc::new(RateLimiter::new(config)), key_fn)
    }

    pub fn from_limiter(prefix: &'static str, limiter: Arc<RateLimiter>, key_fn: KeyFn) -> Self {
        Self {
            prefix,
            limiter,
            key_fn,
        }
    }

    pub fn for_tier(tier: RateLimitTier, limiter: Arc<RateLimiter>) -> Self {
        Self::from_limiter(tier.prefix(), limiter, tier.key_fn())
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn key_for(&self, req: &Request) -> String {
        format!("{}:{}", self.prefix, (self.key_fn)(req))
    }
}

/// 429 响应体
#[derive(Debug, Serialize)]
struct RateLimitRejection<'a> {
    error: &'a str,
    #[serde(rename = "retryAfter")]
    retry_after: u64,
}

/// 客户端 IP：依次取 X-Real-IP、X-Forwarded-For 第一项、连接地址
pub fn client_ip(req: &Request) -> String {
    // 从连接信息获取原始IP
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref()) // 降级使用连接IP
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// 已认证用户ID，未认证时为 `anonymous`
pub fn user_only(req: &Request) -> String {
    req.extensions()
        .get::<Claims>()
        .map(|claims| claims.sub.clone())
        .unwrap_or_else(|| "anonymous".to_string())
}

/// 已认证用户ID加客户端IP
pub fn user_and_ip(req: &Request) -> String {
    format!("{}:{}", user_only(req), client_ip(req))
}

pub async fn rate_limit(
    State(policy): State<Arc<RateLimitPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let key = policy.key_for(&req);
    let admission = policy.limiter.admit(&key);
    let config = policy.limiter.config();
    let reset_at = Utc::now().timestamp_millis() + config.window().as_millis() as i64;

    if !admission.allowed {
        let retry_after = admission
            .retry_after_secs
            .unwrap_or_else(|| config.retry_after_secs());
        tracing::warn!(key = %key, retry_after, "Rate limit exceeded");

        let body = RateLimitRejection {
            error: config.message(),
            retry_after,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        set_limit_headers(headers, config.max_tokens(), admission.tokens_remaining, reset_at);
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(req).await;
    set_limit_headers(
        response.headers_mut(),
        config.max_tokens(),
        admission.tokens_remaining,
        reset_at,
    );
    response
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_at: i64) {
    headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET.clone(), HeaderValue::from(reset_at));
}
