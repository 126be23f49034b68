pub mod chat;
pub mod notice;
pub mod todo;
pub mod user;

use std::future::Future;
use std::time::Duration;

use crate::cache::{CacheStatus, ResponseCache};
use crate::error::AppError;

/// 先查缓存，未命中时从存储读取并按 `ttl` 写回缓存
pub(crate) async fn cached<T, E, F, Fut>(
    cache: &ResponseCache,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> Result<(T, CacheStatus), AppError>
where
    T: Clone + Send + Sync + 'static,
    E: Into<AppError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(value) = cache.get::<T>(key) {
        tracing::debug!(key, "cache hit");
        return Ok((value, CacheStatus::Hit));
    }

    tracing::debug!(key, "cache miss");
    let value = fetch().await.map_err(Into::<AppError>::into)?;
    cache.set_with_ttl(key, value.clone(), ttl);
    Ok((value, CacheStatus::Miss))
}
