use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    COMPLETION_POINTS, ChatMessage, LeaderboardEntry, NewNotice, NewTodo, Notice, ProfilePatch,
    StoreResult, StudyStore, Todo, TodoChange, TodoPatch, UserProfile,
};

#[derive(Default)]
struct MemoryData {
    users: HashMap<String, UserProfile>,
    todos: Vec<Todo>,
    notices: Vec<Notice>,
    chat: Vec<ChatMessage>,
}

/// 内存存储，未配置数据库时使用
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或替换用户资料，用户本身由认证服务创建
    pub async fn upsert_user(&self, user: UserProfile) {
        self.data.write().await.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl StudyStore for MemoryStore {
    async fn list_todos(&self, user_id: &str) -> StoreResult<Vec<Todo>> {
        let data = self.data.read().await;
        let mut todos: Vec<Todo> = data
            .todos
            .iter()
            .filter(|todo| todo.user_id == user_id)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    async fn create_todo(&self, user_id: &str, todo: NewTodo) -> StoreResult<Todo> {
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: todo.title,
            subject: todo.subject,
            difficulty: todo.difficulty,
            questions_target: todo.questions_target,
            questions_completed: 0,
            completed: false,
            scheduled_time: todo.scheduled_time,
            created_at: Utc::now(),
        };
        self.data.write().await.todos.push(todo.clone());
        Ok(todo)
    }

    async fn update_todo(
        &self,
        user_id: &str,
        todo_id: Uuid,
        patch: TodoPatch,
    ) -> StoreResult<Option<TodoChange>> {
        let mut guard = self.data.write().await;
        let data = &mut *guard;
        let Some(todo) = data
            .todos
            .iter_mut()
            .find(|todo| todo.id == todo_id && todo.user_id == user_id)
        else {
            return Ok(None);
        };

        let was_completed = todo.completed;
        if let Some(title) = patch.title {
            todo.title = title;
        }
        if let Some(subject) = patch.subject {
            todo.subject = Some(subject);
        }
        if let Some(difficulty) = patch.difficulty {
            todo.difficulty = Some(difficulty);
        }
        if let Some(target) = patch.questions_target {
            todo.questions_target = target;
        }
        if let Some(done) = patch.questions_completed {
            todo.questions_completed = done;
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        if let Some(scheduled_time) = patch.scheduled_time {
            todo.scheduled_time = Some(scheduled_time);
        }

        let change = TodoChange {
            todo: todo.clone(),
            was_completed,
        };
        // 与待办更新在同一把写锁内完成
        if change.newly_completed() {
            if let Some(user) = data.users.get_mut(user_id) {
                user.total_points += COMPLETION_POINTS;
            }
        }
        Ok(Some(change))
    }

    async fn delete_todo(&self, user_id: &str, todo_id: Uuid) -> StoreResult<bool> {
        let mut data = self.data.write().await;
        let before = data.todos.len();
        data.todos
            .retain(|todo| !(todo.id == todo_id && todo.user_id == user_id));
        Ok(data.todos.len() < before)
    }

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.data.read().await.users.get(user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: ProfilePatch,
    ) -> StoreResult<Option<UserProfile>> {
        let mut data = self.data.write().await;
        let Some(user) = data.users.get_mut(user_id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(username) = patch.username {
            user.username = Some(username);
        }
        if let Some(show_profile) = patch.show_profile {
            user.show_profile = show_profile;
        }
        Ok(Some(user.clone()))
    }

    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        let data = self.data.read().await;
        let mut users: Vec<&UserProfile> =
            data.users.values().filter(|user| user.show_profile).collect();
        users.sort_by(|a, b| b.total_points.cmp(&a.total_points).then_with(|| a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .take(limit.max(0) as usize)
            .map(LeaderboardEntry::from)
            .collect())
    }

    async fn list_notices(&self, limit: i64) -> StoreResult<Vec<Notice>> {
        let data = self.data.read().await;
        let mut notices = data.notices.clone();
        notices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notices.truncate(limit.max(0) as usize);
        Ok(notices)
    }

    async fn create_notice(&self, author_id: &str, notice: NewNotice) -> StoreResult<Notice> {
        let notice = Notice {
            id: Uuid::new_v4(),
            title: notice.title,
            content: notice.content,
            author_id: author_id.to_string(),
            created_at: Utc::now(),
        };
        self.data.write().await.notices.push(notice.clone());
        Ok(notice)
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> StoreResult<()> {
        self.data.write().await.chat.push(message.clone());
        Ok(())
    }

    async fn recent_chat_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<ChatMessage>> {
        let data = self.data.read().await;
        let mut messages: Vec<ChatMessage> = data
            .chat
            .iter()
            .filter(|message| message.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.timestamp);
        let skip = messages.len().saturating_sub(limit.max(0) as usize);
        Ok(messages.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, points: i64, visible: bool) -> UserProfile {
        UserProfile {
            id: id.into(),
            name: id.to_uppercase(),
            username: None,
            avatar: None,
            total_points: points,
            total_study_minutes: 0,
            streak: 0,
            show_profile: visible,
        }
    }

    #[tokio::test]
    async fn leaderboard_skips_hidden_profiles_and_orders_by_points() {
        let store = MemoryStore::new();
        store.upsert_user(user("a", 5, true)).await;
        store.upsert_user(user("b", 50, false)).await;
        store.upsert_user(user("c", 9, true)).await;

        let board = store.leaderboard(10).await.unwrap();
        let ids: Vec<_> = board.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn completion_awards_points_once() {
        let store = MemoryStore::new();
        store.upsert_user(user("u1", 0, true)).await;
        let todo = store
            .create_todo(
                "u1",
                NewTodo {
                    title: "Read chapter 3".into(),
                    subject: Some("biology".into()),
                    difficulty: None,
                    questions_target: 10,
                    scheduled_time: None,
                },
            )
            .await
            .unwrap();

        let patch = TodoPatch {
            completed: Some(true),
            ..TodoPatch::default()
        };
        let change = store
            .update_todo("u1", todo.id, patch.clone())
            .await
            .unwrap()
            .unwrap();
        assert!(change.newly_completed());

        let again = store.update_todo("u1", todo.id, patch).await.unwrap().unwrap();
        assert!(!again.newly_completed());

        let profile = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.total_points, COMPLETION_POINTS);
    }

    #[tokio::test]
    async fn todos_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let todo = store
            .create_todo(
                "owner",
                NewTodo {
                    title: "Flashcards".into(),
                    subject: None,
                    difficulty: None,
                    questions_target: 0,
                    scheduled_time: None,
                },
            )
            .await
            .unwrap();

        assert!(store.list_todos("other").await.unwrap().is_empty());
        assert!(!store.delete_todo("other", todo.id).await.unwrap());
        assert!(store.delete_todo("owner", todo.id).await.unwrap());
    }
}
