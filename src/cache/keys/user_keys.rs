use std::time::Duration;

/// 用户缓存键前缀
const USER_PREFIX: &str = "user:";

/// 排行榜缓存键
pub const LEADERBOARD_KEY: &str = "leaderboard:global";

/// 排行榜缓存时间，积分变化频繁但允许短暂延迟
pub const LEADERBOARD_TTL: Duration = Duration::from_secs(60);

/// 用户资料缓存时间
pub const PROFILE_TTL: Duration = Duration::from_secs(300);

/// 生成用户资料缓存键，也用作该用户所有缓存的失效模式
pub fn user_key(user_id: &str) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}
