//! Persistence seams for users, conversations, moods and profiles.
//!
//! Every backend implements the five narrow traits below; [`Store`] is the
//! bundle the HTTP layer holds. The chat relay only needs [`ChatStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::admin::{AdminConversation, AdminStats, AdminUserSummary};
use crate::models::auth::{NewUser, User};
use crate::models::chat::{Conversation, Message, MessageRole};
use crate::models::mood::MoodEntry;
use crate::models::profile::{ProfileDetail, ProfileUpdate};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user together with an empty profile record.
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()>;
    /// Removes the user and everything they own. Returns false when absent.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> StoreResult<bool>;
    async fn create_conversation(&self, user_id: Uuid, title: &str) -> StoreResult<Conversation>;
    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>>;
    /// Most recently updated first.
    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;
    /// Appends a message and bumps the conversation's `updated_at`.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message>;
    /// Oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>>;
    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait MoodStore: Send + Sync {
    async fn create_mood_entry(&self, user_id: Uuid, mood: i32, note: &str)
        -> StoreResult<MoodEntry>;
    /// Newest first.
    async fn list_mood_entries(&self, user_id: Uuid) -> StoreResult<Vec<MoodEntry>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileDetail>>;
    async fn upsert_profile(&self, user_id: Uuid, update: ProfileUpdate)
        -> StoreResult<ProfileDetail>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn list_users_with_counts(&self) -> StoreResult<Vec<AdminUserSummary>>;
    /// All conversations (optionally one user's), most recently updated first,
    /// without messages attached.
    async fn list_all_conversations(&self, user_id: Option<Uuid>)
        -> StoreResult<Vec<AdminConversation>>;
    async fn stats(&self) -> StoreResult<AdminStats>;
}

pub trait Store: UserStore + ChatStore + MoodStore + ProfileStore + AdminStore {}

impl<T> Store for T where T: UserStore + ChatStore + MoodStore + ProfileStore + AdminStore {}

/// Looks up a conversation only if `user_id` owns it. Foreign and missing
/// conversations are indistinguishable to the caller.
pub async fn find_owned_conversation<S>(
    store: &S,
    conversation_id: Uuid,
    user_id: Uuid,
) -> StoreResult<Option<Conversation>>
where
    S: ChatStore + ?Sized,
{
    Ok(store
        .find_conversation(conversation_id)
        .await?
        .filter(|conversation| conversation.user_id == user_id))
}

/// Title for a conversation opened by `first_message`.
pub fn conversation_title(first_message: &str) -> String {
    let prefix: String = first_message.chars().take(30).collect();
    format!("{}...", prefix)
}
