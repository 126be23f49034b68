//! 缓存键模块
//! 提供各种缓存键生成函数和对应的过期时间

// 用户缓存键模块
pub mod user_keys;

// 待办事项缓存键模块
pub mod todo_keys;

// 公告缓存键模块
pub mod notice_keys;

// 聊天记录缓存键模块
pub mod chat_keys;

// 重新导出常用的键生成函数
pub use chat_keys::{CHAT_HISTORY_LIMIT, CHAT_HISTORY_TTL, chat_history_key};
pub use notice_keys::{NOTICES_KEY, NOTICES_TTL};
pub use todo_keys::{TODOS_TTL, todos_key};
pub use user_keys::{LEADERBOARD_KEY, LEADERBOARD_TTL, PROFILE_TTL, user_key};
