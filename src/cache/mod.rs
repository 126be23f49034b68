// 缓存模块
// 进程内响应缓存，按条目设置过期时间，写操作后显式失效

pub mod keys;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};

/// 未指定 TTL 时的默认缓存时间
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// 缓存命中状态，用于 `X-Cache` 响应头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// 缓存条目
struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl CacheEntry {
    // 到达过期时间的那一刻仍然有效
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// 缓存诊断信息
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// 进程内响应缓存
///
/// 值按调用处的具体类型存取：`set` 存入任意 `T`，`get::<T>` 取回同一类型；
/// 类型不符视为未命中。过期采用惰性删除，`get` 读到过期条目时顺带移除，
/// 后台清理只用于回收内存。
pub struct ResponseCache<C: Clock = SystemClock> {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
    clock: C,
}

impl ResponseCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for ResponseCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ResponseCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: DEFAULT_TTL,
            clock,
        }
    }

    /// 修改 `set` 使用的默认过期时间
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// 读取未过期的缓存值
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return match entry.data.downcast_ref::<T>() {
                    Some(value) => Some(value.clone()),
                    None => {
                        tracing::warn!(key, "cached value has an unexpected type");
                        None
                    }
                };
            }
        }
        // 读锁已释放；只删除仍然过期的条目，避免误删并发写入的新值
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// 使用默认过期时间写入
    pub fn set<T>(&self, key: impl Into<String>, data: T)
    where
        T: Send + Sync + 'static,
    {
        self.set_with_ttl(key, data, self.default_ttl);
    }

    /// 写入并覆盖已有条目，后写者生效
    pub fn set_with_ttl<T>(&self, key: impl Into<String>, data: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry {
            data: Arc::new(data),
            expires_at: self.clock.now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// 原地修改未过期的条目，过期时间不变
    ///
    /// 条目不存在、已过期或类型不符时不做修改并返回 `false`；
    /// 修改在该键所在分片的写锁内完成。
    pub fn update<T, F>(&self, key: &str, f: F) -> bool
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        let now = self.clock.now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.is_expired(now) {
            return false;
        }
        let Some(current) = entry.data.downcast_ref::<T>() else {
            return false;
        };
        let mut value = current.clone();
        f(&mut value);
        entry.data = Arc::new(value);
        true
    }

    /// 删除单个条目，不存在时无操作
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// 删除所有包含 `pattern` 子串的键（字面匹配，不是通配符或正则）
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        let removed = before.saturating_sub(self.entries.len());
        tracing::debug!(pattern, removed, "invalidated cache entries");
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 移除所有已过期条目，返回移除数量
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}

impl<C: Clock + 'static> ResponseCache<C> {
    /// 周期性清理过期条目，缓存被释放后任务自动结束
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.purge_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn cache() -> (ResponseCache<MockClock>, MockClock) {
        let clock = MockClock::new();
        (ResponseCache::with_clock(clock.clone()), clock)
    }

    #[test]
    fn entry_is_valid_exactly_at_expiry() {
        let (cache, clock) = cache();
        cache.set_with_ttl("k", 7u32, Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get::<u32>("k"), Some(7));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn default_ttl_is_five_minutes() {
        let (cache, clock) = cache();
        cache.set("k", "v".to_string());
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));
        clock.advance(Duration::from_secs(2));
        assert!(cache.get::<String>("k").is_none());
    }

    #[test]
    fn wrong_type_is_a_miss_and_keeps_entry() {
        let (cache, _) = cache();
        cache.set("k", 1u64);
        assert!(cache.get::<String>("k").is_none());
        assert_eq!(cache.get::<u64>("k"), Some(1));
    }

    #[test]
    fn set_overwrites_and_resets_expiry() {
        let (cache, clock) = cache();
        cache.set_with_ttl("k", 1u8, Duration::from_secs(1));
        clock.advance(Duration::from_millis(900));
        cache.set_with_ttl("k", 2u8, Duration::from_secs(1));
        clock.advance(Duration::from_millis(900));
        assert_eq!(cache.get::<u8>("k"), Some(2));
    }

    #[test]
    fn purge_expired_only_removes_stale_entries() {
        let (cache, clock) = cache();
        cache.set_with_ttl("short", 1u8, Duration::from_secs(1));
        cache.set_with_ttl("long", 2u8, Duration::from_secs(10));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().keys, vec!["long".to_string()]);
    }

    #[test]
    fn update_modifies_live_entries_only() {
        let (cache, clock) = cache();
        assert!(!cache.update::<Vec<u8>, _>("list", |v| v.push(1)));

        cache.set_with_ttl("list", vec![1u8], Duration::from_secs(5));
        assert!(cache.update::<Vec<u8>, _>("list", |v| v.push(2)));
        assert_eq!(cache.get::<Vec<u8>>("list"), Some(vec![1, 2]));

        assert!(!cache.update::<String, _>("list", |s| s.clear()));

        clock.advance(Duration::from_secs(6));
        assert!(!cache.update::<Vec<u8>, _>("list", |v| v.push(3)));
    }

    #[test]
    fn cache_status_header_values() {
        assert_eq!(CacheStatus::Hit.as_str(), "HIT");
        assert_eq!(CacheStatus::Miss.as_str(), "MISS");
    }
}
