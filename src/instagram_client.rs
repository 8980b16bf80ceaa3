// Instagram Messaging client built on the Facebook Graph API.
// Handles the OAuth token exchange chain and conversation/message fetching.
// Docs: https://developers.facebook.com/docs/messenger-platform/instagram

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::sync::RemoteMessage;

const GRAPH_API_VERSION: &str = "v18.0";

#[derive(Error, Debug)]
pub enum InstagramApiError {
    #[error("Instagram API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Instagram API error: {0}")]
    Api(String),

    #[error("No Instagram Business Account found. Please connect a Business account.")]
    NoBusinessAccount,
}

#[derive(Debug, Clone)]
pub struct InstagramClient {
    client: Client,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    api_base: String,
}

// ============================================================================
// Graph API response structures
// ============================================================================
// Response shapes are not controlled by us, so every field tolerates absence.

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct PageListResponse {
    #[serde(default)]
    data: Vec<Page>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BusinessAccountResponse {
    instagram_business_account: Option<AccountRef>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountDetailsResponse {
    username: Option<String>,
    name: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct ConversationListResponse {
    #[serde(default)]
    data: Vec<ConversationEntry>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct ConversationEntry {
    id: Option<String>,
    participants: Option<ParticipantList>,
}

#[derive(Debug, Deserialize)]
struct ParticipantList {
    #[serde(default)]
    data: Vec<ParticipantEntry>,
}

#[derive(Debug, Deserialize)]
struct ParticipantEntry {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    data: Vec<MessageEntry>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct MessageEntry {
    from: Option<MessageFrom>,
    message: Option<String>,
    created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageFrom {
    id: Option<String>,
}

// ============================================================================
// Public domain types
// ============================================================================

/// A short- or long-lived access token with its lifetime in seconds.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Option<i64>,
}

/// One conversation participant, as reported by the platform.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

/// A remote conversation: its id plus the participant list.
#[derive(Debug, Clone)]
pub struct RemoteConversation {
    pub id: String,
    pub participants: Vec<Participant>,
}

impl RemoteConversation {
    /// The participant that is not us, i.e. the customer.
    pub fn customer(&self, self_account_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != self_account_id)
    }
}

#[derive(Debug, Clone)]
pub struct AccountDetails {
    pub username: String,
    pub name: String,
}

// ============================================================================
// Client implementation
// ============================================================================

impl InstagramClient {
    pub fn new(app_id: String, app_secret: String, redirect_uri: String) -> Self {
        Self {
            client: Client::new(),
            app_id,
            app_secret,
            redirect_uri,
            api_base: format!("https://graph.facebook.com/{}", GRAPH_API_VERSION),
        }
    }

    /// The authorization dialog URL the user is redirected to. `state` is
    /// echoed back on the callback to identify the connecting user.
    pub fn oauth_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.app_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            (
                "scope",
                "instagram_basic,instagram_manage_messages,pages_read_engagement",
            ),
            ("response_type", "code"),
            ("state", state),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "https://www.facebook.com/{}/dialog/oauth?{}",
            GRAPH_API_VERSION, query
        )
    }

    /// Exchanges the authorization code for a short-lived access token.
    pub async fn exchange_code(&self, code: &str) -> Result<AccessToken, InstagramApiError> {
        let response: TokenResponse = self
            .client
            .get(format!("{}/oauth/access_token", self.api_base))
            .query(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(format!(
                "Token exchange failed: {}",
                error.message.unwrap_or_default()
            )));
        }
        match response.access_token {
            Some(token) => Ok(AccessToken {
                token,
                expires_in: response.expires_in.or(Some(3600)),
            }),
            None => Err(InstagramApiError::Api(
                "Token exchange returned no access token".to_string(),
            )),
        }
    }

    /// Exchanges a short-lived token for a long-lived one (~60 days). On
    /// failure the caller keeps the short-lived token.
    pub async fn extend_token(
        &self,
        short_lived: &str,
    ) -> Result<AccessToken, InstagramApiError> {
        let response: TokenResponse = self
            .client
            .get(format!("{}/oauth/access_token", self.api_base))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("fb_exchange_token", short_lived),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(format!(
                "Long-lived token exchange failed: {}",
                error.message.unwrap_or_default()
            )));
        }
        match response.access_token {
            Some(token) => Ok(AccessToken {
                token,
                // 60 days, the documented long-lived token lifetime.
                expires_in: response.expires_in.or(Some(5_184_000)),
            }),
            None => Err(InstagramApiError::Api(
                "Long-lived token exchange returned no access token".to_string(),
            )),
        }
    }

    /// Returns the first managed Facebook Page and its page access token.
    pub async fn first_page(
        &self,
        access_token: &str,
    ) -> Result<(String, String), InstagramApiError> {
        let response: PageListResponse = self
            .client
            .get(format!("{}/me/accounts", self.api_base))
            .query(&[("access_token", access_token)])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(
                error.message.unwrap_or_default(),
            ));
        }
        let page = response
            .data
            .into_iter()
            .next()
            .ok_or(InstagramApiError::NoBusinessAccount)?;
        let page_token = page
            .access_token
            .unwrap_or_else(|| access_token.to_string());
        Ok((page.id, page_token))
    }

    /// The Instagram business-account id connected to a Facebook Page.
    pub async fn business_account(
        &self,
        page_id: &str,
        access_token: &str,
    ) -> Result<String, InstagramApiError> {
        let response: BusinessAccountResponse = self
            .client
            .get(format!("{}/{}", self.api_base, page_id))
            .query(&[
                ("fields", "instagram_business_account"),
                ("access_token", access_token),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(
                error.message.unwrap_or_default(),
            ));
        }
        response
            .instagram_business_account
            .map(|account| account.id)
            .ok_or(InstagramApiError::NoBusinessAccount)
    }

    /// Username and display name of an Instagram account.
    pub async fn account_details(
        &self,
        account_id: &str,
        access_token: &str,
    ) -> Result<AccountDetails, InstagramApiError> {
        let response: AccountDetailsResponse = self
            .client
            .get(format!("{}/{}", self.api_base, account_id))
            .query(&[("fields", "username,name"), ("access_token", access_token)])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(
                error.message.unwrap_or_default(),
            ));
        }
        Ok(AccountDetails {
            username: response.username.unwrap_or_default(),
            name: response.name.unwrap_or_default(),
        })
    }

    /// Lists the account's conversations with their participants.
    pub async fn list_conversations(
        &self,
        account_id: &str,
        access_token: &str,
    ) -> Result<Vec<RemoteConversation>, InstagramApiError> {
        let response: ConversationListResponse = self
            .client
            .get(format!("{}/{}/conversations", self.api_base, account_id))
            .query(&[
                ("fields", "participants,updated_time"),
                ("access_token", access_token),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(format!(
                "Failed to fetch conversations: {}",
                error.message.unwrap_or_default()
            )));
        }

        let conversations = response
            .data
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id?;
                let participants = entry
                    .participants
                    .map(|list| {
                        list.data
                            .into_iter()
                            .filter_map(|p| {
                                Some(Participant {
                                    id: p.id?,
                                    name: p.name.unwrap_or_default(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(RemoteConversation { id, participants })
            })
            .collect();

        Ok(conversations)
    }

    /// Fetches a conversation's messages, newest-first as delivered by the
    /// platform. Records with missing fields degrade to empty strings and
    /// are filtered out downstream by the reconciler.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        access_token: &str,
    ) -> Result<Vec<RemoteMessage>, InstagramApiError> {
        let response: MessageListResponse = self
            .client
            .get(format!("{}/{}/messages", self.api_base, conversation_id))
            .query(&[
                ("fields", "from,message,created_time"),
                ("access_token", access_token),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(InstagramApiError::Api(format!(
                "Failed to fetch messages: {}",
                error.message.unwrap_or_default()
            )));
        }

        let messages = response
            .data
            .into_iter()
            .map(|entry| RemoteMessage {
                sender_account_id: entry.from.and_then(|f| f.id).unwrap_or_default(),
                text: entry.message.unwrap_or_default(),
                created_at_raw: entry.created_time.unwrap_or_default(),
            })
            .collect();

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> InstagramClient {
        InstagramClient::new(
            "123456".to_string(),
            "secret".to_string(),
            "http://localhost:8000/api/instagram/callback".to_string(),
        )
    }

    #[test]
    fn test_oauth_url_contains_state_and_scopes() {
        let url = test_client().oauth_url("shopowner@example.com");
        assert!(url.starts_with("https://www.facebook.com/v18.0/dialog/oauth?"));
        assert!(url.contains("client_id=123456"));
        assert!(url.contains("state=shopowner%40example.com"));
        assert!(url.contains("instagram_manage_messages"));
    }

    #[test]
    fn test_message_list_tolerates_partial_records() {
        let json = r#"{
            "data": [
                {"from": {"id": "42"}, "message": "Hi", "created_time": "2024-02-01T10:00:00+0000"},
                {"message": "no sender"},
                {"from": {"id": "42"}}
            ]
        }"#;
        let parsed: MessageListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.len(), 3);
        assert!(parsed.data[1].from.is_none());
        assert!(parsed.data[2].message.is_none());
    }

    #[test]
    fn test_graph_error_payload_deserializes() {
        let json = r#"{"error": {"message": "Invalid OAuth access token", "code": 190}}"#;
        let parsed: ConversationListResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.data.is_empty());
        assert_eq!(
            parsed.error.unwrap().message.as_deref(),
            Some("Invalid OAuth access token")
        );
    }

    #[test]
    fn test_customer_participant_excludes_self() {
        let conversation = RemoteConversation {
            id: "t_1".to_string(),
            participants: vec![
                Participant {
                    id: "self".to_string(),
                    name: "The Shop".to_string(),
                },
                Participant {
                    id: "cust".to_string(),
                    name: "Alice Johnson".to_string(),
                },
            ],
        };
        assert_eq!(conversation.customer("self").unwrap().name, "Alice Johnson");
        assert_eq!(conversation.customer("cust").unwrap().id, "self");
    }
}
