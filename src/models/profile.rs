use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub age: Option<i32>,
    pub preferences: Option<Value>,
    pub goals: Option<Value>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub preferences: Option<Value>,
    pub goals: Option<Value>,
}

/// Partial profile update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub age: Option<i32>,
    pub preferences: Option<Value>,
    pub goals: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
    pub profile: Option<ProfileDetail>,
}

impl From<&UpdateProfileRequest> for ProfileUpdate {
    fn from(request: &UpdateProfileRequest) -> Self {
        ProfileUpdate {
            age: request.age,
            preferences: request.preferences.clone().filter(|v| !v.is_null()),
            goals: request.goals.clone().filter(|v| !v.is_null()),
        }
    }
}

impl ProfileDetail {
    pub fn apply(&mut self, update: &ProfileUpdate, now: chrono::DateTime<chrono::Utc>) {
        if let Some(age) = update.age {
            self.age = Some(age);
        }
        if let Some(preferences) = &update.preferences {
            self.preferences = Some(preferences.clone());
        }
        if let Some(goals) = &update.goals {
            self.goals = Some(goals.clone());
        }
        self.updated_at = now;
    }
}
