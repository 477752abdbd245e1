use super::auth::{Role, UserResponse};
use super::chat::MessageView;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub conversation_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConversation {
    pub id: Uuid,
    pub title: String,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub message_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageView>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MoodCount {
    pub mood: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub user_count: i64,
    pub conversation_count: i64,
    pub message_count: i64,
    pub mood_entry_count: i64,
    pub recent_users: Vec<UserResponse>,
    pub mood_distribution: Vec<MoodCount>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConversationsQuery {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub include_messages: bool,
}

pub const RECENT_USERS_LIMIT: usize = 5;
