// src/models/instagram.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored OAuth credential linking a user to one Instagram business account.
/// Upserted on a successful OAuth callback, soft-deactivated on disconnect,
/// never hard-deleted.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct InstagramConnection {
    pub id: i32,
    pub user_id: i32,
    pub instagram_account_id: String,
    pub instagram_username: String,
    pub instagram_account_name: String,
    pub access_token: String,
    pub token_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_active: bool,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl InstagramConnection {
    pub fn token_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.token_expires_at.map_or(false, |expiry| now > expiry)
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectUrlResponse {
    pub oauth_url: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub message: String,
    pub instagram_username: String,
    pub instagram_name: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatusResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub token_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub conversations_synced: usize,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_token_expired() {
        let now = Utc::now();
        let mut conn = InstagramConnection {
            id: 1,
            user_id: 1,
            instagram_account_id: "17841400000000000".to_string(),
            instagram_username: "shop".to_string(),
            instagram_account_name: "The Shop".to_string(),
            access_token: "token".to_string(),
            token_expires_at: Some(now + Duration::days(30)),
            is_active: true,
            connected_at: now,
            last_sync_at: None,
            updated_at: now,
        };
        assert!(!conn.token_expired(now));

        conn.token_expires_at = Some(now - Duration::hours(1));
        assert!(conn.token_expired(now));

        // No recorded expiry is treated as not expired.
        conn.token_expires_at = None;
        assert!(!conn.token_expired(now));
    }
}
