// 令牌桶限流模块
// 每个键一个令牌桶，容量 max_tokens，按 max_tokens / window 连续补充，
// 空桶经过一个窗口后重新装满；每次放行消耗一个令牌。
// 状态只存在于本进程内，桶在首次请求时创建，空闲超时后由清理任务移除。

mod channel;

pub use channel::ChannelRateLimiter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigError;

/// 空闲超过该时长的桶会被清理
pub const DEFAULT_BUCKET_IDLE: Duration = Duration::from_secs(300);

/// 已校验的令牌桶参数
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    max_tokens: u32,
    window: Duration,
    message: String,
}

impl RateLimitConfig {
    /// 容量或窗口为零时在启动阶段直接报错
    pub fn new(
        max_tokens: u32,
        window: Duration,
        message: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if max_tokens == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_tokens must be positive".into(),
            ));
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidRateLimit(
                "window must be positive".into(),
            ));
        }
        Ok(Self {
            max_tokens,
            window,
            message: message.into(),
        })
    }

    /// 普通 API：每分钟 100 次
    pub fn api() -> Self {
        Self {
            max_tokens: 100,
            window: Duration::from_millis(60_000),
            message: "API rate limit exceeded. Please slow down.".into(),
        }
    }

    /// 全局：每个客户端地址每分钟 200 次
    pub fn global() -> Self {
        Self {
            max_tokens: 200,
            window: Duration::from_millis(60_000),
            message: "Global rate limit exceeded. Please slow down.".into(),
        }
    }

    /// 聊天：每个发送者每条连接 10 秒 10 条
    pub fn chat() -> Self {
        Self {
            max_tokens: 10,
            window: Duration::from_millis(10_000),
            message: "Please wait before sending another message".into(),
        }
    }

    /// 公告：每个用户每分钟 20 次
    pub fn notices() -> Self {
        Self {
            max_tokens: 20,
            window: Duration::from_millis(60_000),
            message: "Notice request limit exceeded. Please try again shortly.".into(),
        }
    }

    /// 聊天连接：每个用户每分钟建立 30 次
    pub fn message_tier() -> Self {
        Self {
            max_tokens: 30,
            window: Duration::from_millis(60_000),
            message: "Message rate limit exceeded. Please slow down.".into(),
        }
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 被拒绝时建议的重试秒数：整个窗口向上取整
    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_millis().div_ceil(1000) as u64
    }
}

/// 单个键的令牌状态
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(max_tokens: f64, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant, max_tokens: f64, window: Duration) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() / window.as_secs_f64() * max_tokens;
        self.tokens = (self.tokens + added).min(max_tokens);
        self.last_refill = now;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

/// 一次准入检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// 本次检查后剩余令牌数（向下取整）
    pub tokens_remaining: u32,
    /// 仅在拒绝时设置
    pub retry_after_secs: Option<u64>,
}

/// 按字符串键限流的令牌桶限流器
///
/// 每个桶都在所属分片的写锁内完成补充、比较、扣减，
/// 多线程运行时下同一个键的读改写仍是原子的。
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
    idle_after: Duration,
    clock: C,
}

impl RateLimiter<SystemClock> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            idle_after: DEFAULT_BUCKET_IDLE,
            clock,
        }
    }

    /// 设置桶的空闲清理阈值
    pub fn idle_after(mut self, idle_after: Duration) -> Self {
        self.idle_after = idle_after;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 补充 `key` 对应的桶，再尝试取走一个令牌
    pub fn admit(&self, key: &str) -> Admission {
        let now = self.clock.now();
        let max_tokens = f64::from(self.config.max_tokens);

        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::full(max_tokens, now));
        bucket.refill(now, max_tokens, self.config.window);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission {
                allowed: true,
                tokens_remaining: bucket.tokens.floor() as u32,
                retry_after_secs: None,
            }
        } else {
            tracing::debug!(key, tokens = bucket.tokens, "admission denied");
            Admission {
                allowed: false,
                tokens_remaining: bucket.tokens.floor() as u32,
                retry_after_secs: Some(self.config.retry_after_secs()),
            }
        }
    }

    /// 获取某个键当前桶状态的快照
    pub fn bucket(&self, key: &str) -> Option<TokenBucket> {
        self.buckets.get(key).map(|bucket| bucket.clone())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 移除上次补充时间早于空闲阈值的桶，返回移除数量
    pub fn sweep_stale(&self) -> usize {
        let now = self.clock.now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= self.idle_after);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            tracing::debug!(removed, "swept idle rate limit buckets");
        }
        removed
    }
}

impl<C: Clock + 'static> RateLimiter<C> {
    /// 每隔 `period` 执行一次清理，限流器被释放后任务自动结束
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.sweep_stale();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn limiter(max: u32, window_ms: u64) -> (RateLimiter<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = RateLimitConfig::new(max, Duration::from_millis(window_ms), "slow down")
            .expect("valid config");
        (RateLimiter::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn rejects_zero_capacity_and_zero_window() {
        assert!(matches!(
            RateLimitConfig::new(0, Duration::from_secs(1), "x"),
            Err(ConfigError::InvalidRateLimit(_))
        ));
        assert!(matches!(
            RateLimitConfig::new(5, Duration::ZERO, "x"),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn retry_after_rounds_window_up() {
        let config = RateLimitConfig::new(1, Duration::from_millis(1500), "x").unwrap();
        assert_eq!(config.retry_after_secs(), 2);
        assert_eq!(RateLimitConfig::api().retry_after_secs(), 60);
        assert_eq!(RateLimitConfig::chat().retry_after_secs(), 10);
    }

    #[test]
    fn first_request_creates_full_bucket() {
        let (limiter, _) = limiter(3, 1000);
        assert!(limiter.bucket("k").is_none());

        let admission = limiter.admit("k");
        assert!(admission.allowed);
        assert_eq!(admission.tokens_remaining, 2);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let (limiter, clock) = limiter(4, 1000);
        limiter.admit("k");
        clock.advance(Duration::from_secs(3600));
        let admission = limiter.admit("k");
        assert_eq!(admission.tokens_remaining, 3);
        let bucket = limiter.bucket("k").unwrap();
        assert!(bucket.tokens() <= 4.0);
    }

    #[test]
    fn partial_refill_below_one_token_still_rejects() {
        let (limiter, clock) = limiter(2, 1000);
        limiter.admit("k");
        limiter.admit("k");
        clock.advance(Duration::from_millis(400));

        let admission = limiter.admit("k");
        assert!(!admission.allowed);
        assert_eq!(admission.tokens_remaining, 0);
        let tokens = limiter.bucket("k").unwrap().tokens();
        assert!((tokens - 0.8).abs() < 1e-9);
    }

    #[test]
    fn sweep_keeps_recent_buckets() {
        let (limiter, clock) = limiter(2, 1000);
        limiter.admit("old");
        clock.advance(Duration::from_secs(200));
        limiter.admit("fresh");
        clock.advance(Duration::from_secs(150));

        assert_eq!(limiter.sweep_stale(), 1);
        assert!(limiter.bucket("old").is_none());
        assert!(limiter.bucket("fresh").is_some());
    }
}
