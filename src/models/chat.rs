// src/models/chat.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::patch::Patch;

/// Chat status values. Stored as plain text in Postgres.
pub const STATUS_READ: &str = "read";
pub const STATUS_UNREAD: &str = "unread";

/// Message sender values: "me" is the business, "them" the customer.
pub const SENDER_ME: &str = "me";
pub const SENDER_THEM: &str = "them";

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: i32,
    pub user_id: i32,
    pub customer_name: String,
    pub platform: String,
    pub status: String,
    pub last_message: Option<String>,
    pub last_message_date: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i32,
    pub chat_id: i32,
    pub text: String,
    pub sender: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Chat plus its ordered message list, as returned by the chat endpoints.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: i32,
    pub customer_name: String,
    pub platform: String,
    pub status: String,
    pub last_message: Option<String>,
    pub last_message_date: chrono::DateTime<chrono::Utc>,
    pub messages: Vec<Message>,
}

impl ChatResponse {
    pub fn from_chat(chat: Chat, messages: Vec<Message>) -> Self {
        ChatResponse {
            id: chat.id,
            customer_name: chat.customer_name,
            platform: chat.platform,
            status: chat.status,
            last_message: chat.last_message,
            last_message_date: chat.last_message_date,
            messages,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCreate {
    pub customer_name: String,
    pub platform: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    STATUS_UNREAD.to_string()
}

/// Enumerated update payload for a chat. Absent fields stay untouched.
#[derive(Debug, Default, Deserialize)]
pub struct ChatPatch {
    #[serde(default)]
    pub customer_name: Patch<String>,
    #[serde(default)]
    pub platform: Patch<String>,
    #[serde(default)]
    pub status: Patch<String>,
    #[serde(default)]
    pub last_message: Patch<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MessageCreate {
    pub text: String,
    pub sender: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedMessage {
    pub text: String,
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_sender() -> String {
    SENDER_THEM.to_string()
}

/// Request body for creating a chat pre-seeded with messages, e.g. when
/// importing a conversation by hand.
#[derive(Debug, Deserialize)]
pub struct CreateChatWithMessagesRequest {
    pub customer_name: String,
    pub platform: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub messages: Vec<SeedMessage>,
}
