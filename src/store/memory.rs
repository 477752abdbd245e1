//! In-memory store used by tests and by `STORE_BACKEND=memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AdminStore, ChatStore, MoodStore, ProfileStore, StoreError, StoreResult, UserStore};
use crate::models::admin::{
    AdminConversation, AdminStats, AdminUserSummary, MoodCount, RECENT_USERS_LIMIT,
};
use crate::models::auth::{NewUser, User, UserResponse};
use crate::models::chat::{Conversation, Message, MessageRole};
use crate::models::mood::MoodEntry;
use crate::models::profile::{ProfileDetail, ProfileUpdate};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, ProfileDetail>,
    conversations: HashMap<Uuid, Conversation>,
    // Insertion order is message order.
    messages: Vec<Message>,
    moods: Vec<MoodEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing clock so that orderings by timestamp are stable.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn message_count(&self, conversation_id: Uuid) -> i64 {
        self.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .count() as i64
    }
}

/// Single lock over every table so that cascading deletes stay atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Duplicate(format!("user {}", new_user.email)));
        }

        let now = tables.tick();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            created_at: now,
        };
        tables.profiles.insert(
            user.id,
            ProfileDetail {
                id: Uuid::new_v4(),
                user_id: user.id,
                age: None,
                preferences: None,
                goals: None,
                updated_at: now,
            },
        );
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user_name(&self, id: Uuid, name: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.name = name.to_string();
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }

        tables.profiles.remove(&id);
        tables.moods.retain(|m| m.user_id != id);
        let owned: Vec<Uuid> = tables
            .conversations
            .values()
            .filter(|c| c.user_id == id)
            .map(|c| c.id)
            .collect();
        for conversation_id in &owned {
            tables.conversations.remove(conversation_id);
        }
        tables
            .messages
            .retain(|m| !owned.contains(&m.conversation_id));
        Ok(true)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn user_exists(&self, user_id: Uuid) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.contains_key(&user_id))
    }

    async fn create_conversation(&self, user_id: Uuid, title: &str) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }

        let now = tables.tick();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables.conversations.get(&id).cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&conversation_id) {
            return Err(StoreError::NotFound);
        }

        let now = tables.tick();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        tables.messages.push(message.clone());
        if let Some(conversation) = tables.conversations.get_mut(&conversation_id) {
            conversation.updated_at = now;
        }
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.conversations.remove(&id).is_none() {
            return Ok(false);
        }
        tables.messages.retain(|m| m.conversation_id != id);
        Ok(true)
    }
}

#[async_trait]
impl MoodStore for MemoryStore {
    async fn create_mood_entry(
        &self,
        user_id: Uuid,
        mood: i32,
        note: &str,
    ) -> StoreResult<MoodEntry> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }

        let entry = MoodEntry {
            id: Uuid::new_v4(),
            user_id,
            mood,
            note: note.to_string(),
            created_at: tables.tick(),
        };
        tables.moods.push(entry.clone());
        Ok(entry)
    }

    async fn list_mood_entries(&self, user_id: Uuid) -> StoreResult<Vec<MoodEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .moods
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileDetail>> {
        let tables = self.tables.read().await;
        Ok(tables.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> StoreResult<ProfileDetail> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }

        let now = tables.tick();
        let profile = tables
            .profiles
            .entry(user_id)
            .or_insert_with(|| ProfileDetail {
                id: Uuid::new_v4(),
                user_id,
                age: None,
                preferences: None,
                goals: None,
                updated_at: now,
            });
        profile.apply(&update, now);
        Ok(profile.clone())
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn list_users_with_counts(&self) -> StoreResult<Vec<AdminUserSummary>> {
        let tables = self.tables.read().await;
        let mut users: Vec<AdminUserSummary> = tables
            .users
            .values()
            .map(|u| AdminUserSummary {
                id: u.id,
                name: u.name.clone(),
                email: u.email.clone(),
                role: u.role,
                created_at: u.created_at,
                conversation_count: tables
                    .conversations
                    .values()
                    .filter(|c| c.user_id == u.id)
                    .count() as i64,
            })
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn list_all_conversations(
        &self,
        user_id: Option<Uuid>,
    ) -> StoreResult<Vec<AdminConversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<AdminConversation> = tables
            .conversations
            .values()
            .filter(|c| user_id.map_or(true, |id| c.user_id == id))
            .filter_map(|c| {
                let owner = tables.users.get(&c.user_id)?;
                Some(AdminConversation {
                    id: c.id,
                    title: c.title.clone(),
                    user_id: c.user_id,
                    user_name: owner.name.clone(),
                    user_email: owner.email.clone(),
                    created_at: c.created_at,
                    updated_at: c.updated_at,
                    message_count: tables.message_count(c.id),
                    messages: None,
                })
            })
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn stats(&self) -> StoreResult<AdminStats> {
        let tables = self.tables.read().await;

        let mut recent: Vec<&User> = tables.users.values().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent_users = recent
            .into_iter()
            .take(RECENT_USERS_LIMIT)
            .cloned()
            .map(UserResponse::from)
            .collect();

        let mut distribution: HashMap<i32, i64> = HashMap::new();
        for entry in &tables.moods {
            *distribution.entry(entry.mood).or_insert(0) += 1;
        }
        let mut mood_distribution: Vec<MoodCount> = distribution
            .into_iter()
            .map(|(mood, count)| MoodCount { mood, count })
            .collect();
        mood_distribution.sort_by_key(|m| m.mood);

        Ok(AdminStats {
            user_count: tables.users.len() as i64,
            conversation_count: tables.conversations.len() as i64,
            message_count: tables.messages.len() as i64,
            mood_entry_count: tables.moods.len() as i64,
            recent_users,
            mood_distribution,
        })
    }
}
