use std::sync::Arc;

use super::{Admission, RateLimitConfig, RateLimiter};
use crate::clock::{Clock, SystemClock};

/// 实时聊天通道的消息限流
///
/// 算法与 HTTP 限流相同，但按发送者和连接共同计键，
/// 且与 HTTP 请求的令牌互不影响。
pub struct ChannelRateLimiter<C: Clock = SystemClock> {
    inner: Arc<RateLimiter<C>>,
}

impl ChannelRateLimiter<SystemClock> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::from_limiter(Arc::new(RateLimiter::new(config)))
    }
}

impl<C: Clock> ChannelRateLimiter<C> {
    pub fn from_limiter(inner: Arc<RateLimiter<C>>) -> Self {
        Self { inner }
    }

    pub fn admit(&self, sender_id: &str, connection_id: &str) -> Admission {
        self.inner.admit(&channel_key(sender_id, connection_id))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter<C>> {
        &self.inner
    }
}

pub fn channel_key(sender_id: &str, connection_id: &str) -> String {
    format!("channel:{}:{}", sender_id, connection_id)
}
