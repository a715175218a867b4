use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Message {
    pub id: u64,
    pub sender_id: u64,
    pub recipient_id: u64,
    #[schema(example = "Time off approved")]
    pub subject: Option<String>,
    pub body: String,
    pub is_read: bool,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_participant(&self, user_id: u64) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }
}

/// A message that has not been written yet, e.g. a workflow notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: u64,
    pub recipient_id: u64,
    pub subject: Option<String>,
    pub body: String,
}

pub const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, subject, body, is_read, created_at";
