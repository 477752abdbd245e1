use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const MIN_MOOD: i32 = 1;
pub const MAX_MOOD: i32 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mood: i32,
    pub note: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `mood` stays untyped so that strings and fractions are rejected with a 400
/// instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct CreateMoodRequest {
    pub mood: Option<Value>,
    pub note: Option<String>,
}

pub fn validate_mood(value: Option<&Value>) -> Result<i32, String> {
    let mood = value
        .and_then(Value::as_i64)
        .ok_or_else(|| "Mood must be between 1 and 5".to_string())?;

    if mood < MIN_MOOD as i64 || mood > MAX_MOOD as i64 {
        return Err("Mood must be between 1 and 5".to_string());
    }

    Ok(mood as i32)
}
