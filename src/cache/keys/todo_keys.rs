use std::time::Duration;

/// 待办事项缓存键前缀
const TODOS_PREFIX: &str = "todos:";

/// 待办列表缓存时间
pub const TODOS_TTL: Duration = Duration::from_secs(120);

/// 生成用户待办列表缓存键
pub fn todos_key(user_id: &str) -> String {
    format!("{}{}", TODOS_PREFIX, user_id)
}
