// src/store/postgres.rs
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{AdminStore, ChatStore, MoodStore, ProfileStore, StoreError, StoreResult, UserStore};
use crate::models::admin::{
    AdminConversation, AdminStats, AdminUserSummary, MoodCount, RECENT_USERS_LIMIT,
};
use crate::models::auth::{NewUser, User, UserResponse};
use crate::models::chat::{Conversation, Message, MessageRole};
use crate::models::mood::MoodEntry;
use crate::models::profile::{ProfileDetail, ProfileUpdate};

type Timestamp = chrono::DateTime<chrono::Utc>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: Timestamp,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ConversationRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    role: String,
    content: String,
    created_at: Timestamp,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct MoodRow {
    id: Uuid,
    user_id: Uuid,
    mood: i32,
    note: String,
    created_at: Timestamp,
}

impl From<MoodRow> for MoodEntry {
    fn from(row: MoodRow) -> Self {
        MoodEntry {
            id: row.id,
            user_id: row.user_id,
            mood: row.mood,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    user_id: Uuid,
    age: Option<i32>,
    preferences: Option<serde_json::Value>,
    goals: Option<serde_json::Value>,
    updated_at: Timestamp,
}

impl From<ProfileRow> for ProfileDetail {
    fn from(row: ProfileRow) -> Self {
        ProfileDetail {
            id: row.id,
            user_id: row.user_id,
            age: row.age,
            preferences: row.preferences,
            goals: row.goals,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AdminUserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: Timestamp,
    conversation_count: i64,
}

#[derive(FromRow)]
struct AdminConversationRow {
    id: Uuid,
    title: String,
    user_id: Uuid,
    user_name: String,
    user_email: String,
    created_at: Timestamp,
    updated_at: Timestamp,
    message_count: i64,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("user {}", new_user.email))
            } else {
                StoreError::Database(e)
            }
        })?;

        sqlx::query("INSERT INTO profile_details (id, user_id) VALUES ($1, $2)")
            .bind(Uuid::new_v4())
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        // Conversations, messages, moods and the profile go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn user_exists(&self, user_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_conversation(&self, user_id: Uuid, title: &str) -> StoreResult<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (id, user_id, title) VALUES ($1, $2, $3) RETURNING {}",
            CONVERSATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Conversation::from))
    }

    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {} FROM conversations WHERE user_id = $1 ORDER BY updated_at DESC",
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (id, conversation_id, role, content)
             VALUES ($1, $2, $3, $4)
             RETURNING id, conversation_id, role, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound
            }
            _ => StoreError::Database(e),
        })?;

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(row.created_at)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages
             WHERE conversation_id = $1
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MoodStore for PgStore {
    async fn create_mood_entry(
        &self,
        user_id: Uuid,
        mood: i32,
        note: &str,
    ) -> StoreResult<MoodEntry> {
        let row = sqlx::query_as::<_, MoodRow>(
            "INSERT INTO mood_entries (id, user_id, mood, note)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, mood, note, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(mood)
        .bind(note)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_mood_entries(&self, user_id: Uuid) -> StoreResult<Vec<MoodEntry>> {
        let rows = sqlx::query_as::<_, MoodRow>(
            "SELECT id, user_id, mood, note, created_at
             FROM mood_entries
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MoodEntry::from).collect())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileDetail>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, user_id, age, preferences, goals, updated_at
             FROM profile_details
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ProfileDetail::from))
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> StoreResult<ProfileDetail> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profile_details (id, user_id, age, preferences, goals)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id) DO UPDATE SET
                 age = COALESCE(EXCLUDED.age, profile_details.age),
                 preferences = COALESCE(EXCLUDED.preferences, profile_details.preferences),
                 goals = COALESCE(EXCLUDED.goals, profile_details.goals),
                 updated_at = NOW()
             RETURNING id, user_id, age, preferences, goals, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(update.age)
        .bind(update.preferences)
        .bind(update.goals)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn list_users_with_counts(&self) -> StoreResult<Vec<AdminUserSummary>> {
        let rows = sqlx::query_as::<_, AdminUserRow>(
            "SELECT u.id, u.name, u.email, u.role, u.created_at,
                    COUNT(c.id) AS conversation_count
             FROM users u
             LEFT JOIN conversations c ON c.user_id = u.id
             GROUP BY u.id
             ORDER BY u.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AdminUserSummary {
                    id: row.id,
                    name: row.name,
                    email: row.email,
                    role: row.role.parse().map_err(StoreError::Corrupt)?,
                    created_at: row.created_at,
                    conversation_count: row.conversation_count,
                })
            })
            .collect()
    }

    async fn list_all_conversations(
        &self,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<AdminConversation>> {
        let rows = sqlx::query_as::<_, AdminConversationRow>(
            "SELECT c.id, c.title, c.user_id, u.name AS user_name, u.email AS user_email,
                    c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
             FROM conversations c
             JOIN users u ON u.id = c.user_id
             WHERE ($1::uuid IS NULL OR c.user_id = $1)
             ORDER BY c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AdminConversation {
                id: row.id,
                title: row.title,
                user_id: row.user_id,
                user_name: row.user_name,
                user_email: row.user_email,
                created_at: row.created_at,
                updated_at: row.updated_at,
                message_count: row.message_count,
                messages: None,
            })
            .collect())
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let counts: (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM conversations),
                    (SELECT COUNT(*) FROM messages),
                    (SELECT COUNT(*) FROM mood_entries)",
        )
        .fetch_one(&self.pool)
        .await?;
        let (user_count, conversation_count, message_count, mood_entry_count) = counts;

        let recent_users = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC LIMIT $1",
            USER_COLUMNS
        ))
        .bind(RECENT_USERS_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| User::try_from(row).map(UserResponse::from))
        .collect::<StoreResult<Vec<_>>>()?;

        let mood_distribution: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT mood, COUNT(*) FROM mood_entries GROUP BY mood ORDER BY mood",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminStats {
            user_count,
            conversation_count,
            message_count,
            mood_entry_count,
            recent_users,
            mood_distribution: mood_distribution
                .into_iter()
                .map(|(mood, count)| MoodCount { mood, count })
                .collect(),
        })
    }
}
