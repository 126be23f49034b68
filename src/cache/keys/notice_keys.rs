use std::time::Duration;

/// 最新公告列表缓存键
pub const NOTICES_KEY: &str = "notices:latest";

/// 公告缓存时间
pub const NOTICES_TTL: Duration = Duration::from_secs(300);
