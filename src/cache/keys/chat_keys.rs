use std::time::Duration;

/// 聊天记录缓存键前缀
const CHAT_HISTORY_PREFIX: &str = "chat:recent:";

/// 进入聊天室时回放的消息条数
pub const CHAT_HISTORY_LIMIT: usize = 50;

/// 聊天记录缓存时间，过期后从存储重新加载
pub const CHAT_HISTORY_TTL: Duration = Duration::from_secs(3600);

/// 生成房间最近消息缓存键
pub fn chat_history_key(room_id: &str) -> String {
    format!("{}{}", CHAT_HISTORY_PREFIX, room_id)
}
