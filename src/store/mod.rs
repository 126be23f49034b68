// 持久化层
// 处理函数只依赖 StudyStore trait，生产环境使用 Postgres，开发和测试使用内存实现

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 完成一个待办奖励的积分
pub const COMPLETION_POINTS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub subject: Option<String>,
    pub difficulty: Option<String>,
    pub questions_target: i32,
    pub questions_completed: i32,
    pub completed: bool,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTodo {
    pub title: String,
    pub subject: Option<String>,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub questions_target: i32,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// 部分更新，`None` 表示保持原值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub difficulty: Option<String>,
    pub questions_target: Option<i32>,
    pub questions_completed: Option<i32>,
    pub completed: Option<bool>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// 更新结果，附带更新前的完成状态
#[derive(Debug, Clone)]
pub struct TodoChange {
    pub todo: Todo,
    pub was_completed: bool,
}

impl TodoChange {
    /// 本次更新是否把待办从未完成变为已完成
    pub fn newly_completed(&self) -> bool {
        self.todo.completed && !self.was_completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub total_points: i64,
    pub total_study_minutes: i64,
    pub streak: i32,
    pub show_profile: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub show_profile: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub total_points: i64,
    pub total_study_minutes: i64,
    pub streak: i32,
}

impl From<&UserProfile> for LeaderboardEntry {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            total_points: user.total_points,
            total_study_minutes: user.total_study_minutes,
            streak: user.streak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotice {
    pub title: String,
    pub content: String,
}

/// 聊天消息，`timestamp` 为毫秒时间戳
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub room_id: String,
    pub timestamp: i64,
}

#[async_trait]
pub trait StudyStore: Send + Sync {
    /// 按创建时间倒序列出用户的待办
    async fn list_todos(&self, user_id: &str) -> StoreResult<Vec<Todo>>;

    async fn create_todo(&self, user_id: &str, todo: NewTodo) -> StoreResult<Todo>;

    /// 待办不存在或不属于该用户时返回 `None`
    ///
    /// 待办从未完成变为已完成时，在同一次写入中给用户加 `COMPLETION_POINTS` 分
    async fn update_todo(
        &self,
        user_id: &str,
        todo_id: Uuid,
        patch: TodoPatch,
    ) -> StoreResult<Option<TodoChange>>;

    /// 返回是否删除了记录
    async fn delete_todo(&self, user_id: &str, todo_id: Uuid) -> StoreResult<bool>;

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;

    async fn update_profile(
        &self,
        user_id: &str,
        patch: ProfilePatch,
    ) -> StoreResult<Option<UserProfile>>;

    /// 公开资料的用户按积分降序
    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>>;

    async fn list_notices(&self, limit: i64) -> StoreResult<Vec<Notice>>;

    async fn create_notice(&self, author_id: &str, notice: NewNotice) -> StoreResult<Notice>;

    async fn save_chat_message(&self, message: &ChatMessage) -> StoreResult<()>;

    /// 房间内最近的 `limit` 条消息，按时间正序
    async fn recent_chat_messages(&self, room_id: &str, limit: i64)
        -> StoreResult<Vec<ChatMessage>>;
}
