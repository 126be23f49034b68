use async_trait::async_trait;
use sqlx::{Executor, PgPool};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{
    COMPLETION_POINTS, ChatMessage, LeaderboardEntry, NewNotice, NewTodo, Notice, ProfilePatch,
    StoreResult, StudyStore, Todo, TodoChange, TodoPatch, UserProfile,
};

const TODO_COLUMNS: &str = "id, user_id, title, subject, difficulty, questions_target, \
     questions_completed, completed, scheduled_time, created_at";

const PROFILE_COLUMNS: &str =
    "id, name, username, avatar, total_points, total_study_minutes, streak, show_profile";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 连接数据库并执行迁移
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'studytrack';").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl StudyStore for PgStore {
    async fn list_todos(&self, user_id: &str) -> StoreResult<Vec<Todo>> {
        let todos = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(todos)
    }

    async fn create_todo(&self, user_id: &str, todo: NewTodo) -> StoreResult<Todo> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            r#"
            INSERT INTO todos (id, user_id, title, subject, difficulty, questions_target, scheduled_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TODO_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(todo.title)
        .bind(todo.subject)
        .bind(todo.difficulty)
        .bind(todo.questions_target)
        .bind(todo.scheduled_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(todo)
    }

    async fn update_todo(
        &self,
        user_id: &str,
        todo_id: Uuid,
        patch: TodoPatch,
    ) -> StoreResult<Option<TodoChange>> {
        let mut tx = self.pool.begin().await?;

        // 锁住该行，保证读取到的完成状态与本次更新对应
        let was_completed: Option<bool> = sqlx::query_scalar(
            "SELECT completed FROM todos WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(todo_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(was_completed) = was_completed else {
            return Ok(None);
        };

        let todo = sqlx::query_as::<_, Todo>(&format!(
            r#"
            UPDATE todos SET
                title = COALESCE($3, title),
                subject = COALESCE($4, subject),
                difficulty = COALESCE($5, difficulty),
                questions_target = COALESCE($6, questions_target),
                questions_completed = COALESCE($7, questions_completed),
                completed = COALESCE($8, completed),
                scheduled_time = COALESCE($9, scheduled_time)
            WHERE id = $1 AND user_id = $2
            RETURNING {TODO_COLUMNS}
            "#
        ))
        .bind(todo_id)
        .bind(user_id)
        .bind(patch.title)
        .bind(patch.subject)
        .bind(patch.difficulty)
        .bind(patch.questions_target)
        .bind(patch.questions_completed)
        .bind(patch.completed)
        .bind(patch.scheduled_time)
        .fetch_one(&mut *tx)
        .await?;

        let change = TodoChange {
            todo,
            was_completed,
        };
        if change.newly_completed() {
            sqlx::query("UPDATE users SET total_points = total_points + $2 WHERE id = $1")
                .bind(user_id)
                .bind(COMPLETION_POINTS)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(change))
    }

    async fn delete_todo(&self, user_id: &str, todo_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(todo_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_profile(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        patch: ProfilePatch,
    ) -> StoreResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                username = COALESCE($3, username),
                show_profile = COALESCE($4, show_profile)
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.username)
        .bind(patch.show_profile)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn leaderboard(&self, limit: i64) -> StoreResult<Vec<LeaderboardEntry>> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT id, name, username, avatar, total_points, total_study_minutes, streak
            FROM users
            WHERE show_profile
            ORDER BY total_points DESC, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn list_notices(&self, limit: i64) -> StoreResult<Vec<Notice>> {
        let notices = sqlx::query_as::<_, Notice>(
            r#"
            SELECT id, title, content, author_id, created_at
            FROM notices
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(notices)
    }

    async fn create_notice(&self, author_id: &str, notice: NewNotice) -> StoreResult<Notice> {
        let notice = sqlx::query_as::<_, Notice>(
            r#"
            INSERT INTO notices (id, title, content, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, content, author_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notice.title)
        .bind(notice.content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(notice)
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, user_id, message, room_id, sent_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.message)
        .bind(&message.room_id)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_chat_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, user_id, message, room_id, sent_at_ms AS timestamp
            FROM chat_messages
            WHERE room_id = $1
            ORDER BY sent_at_ms DESC
            LIMIT $2
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }
}
