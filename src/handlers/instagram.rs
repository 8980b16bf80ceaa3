use crate::error::ApiError;
use crate::instagram_client::{InstagramApiError, InstagramClient};
use crate::middleware::auth::{auth_middleware, user_id_from_claims};
use crate::models::auth::{Claims, User};
use crate::models::chat::{Chat, Message};
use crate::models::instagram::*;
use crate::models::patch::Patch;
use crate::sync::reconcile;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::Json,
    routing::{delete, get, post, Router},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

const CONNECTION_COLUMNS: &str = "id, user_id, instagram_account_id, instagram_username, \
     instagram_account_name, access_token, token_expires_at, is_active, connected_at, \
     last_sync_at, updated_at";

pub fn instagram_routes() -> Router {
    // The callback is hit by the platform redirect, not by our frontend, so
    // it cannot carry a bearer token; the user is identified via `state`.
    let public_routes = Router::new().route("/api/instagram/callback", get(oauth_callback));

    let protected_routes = Router::new()
        .route("/api/instagram/connect", get(connect))
        .route("/api/instagram/status", get(status))
        .route("/api/instagram/sync", post(sync_messages))
        .route("/api/instagram/disconnect", delete(disconnect))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

fn require_client(state: &AppState) -> Result<&InstagramClient, ApiError> {
    state.instagram_client.as_ref().ok_or_else(|| {
        ApiError::Internal(
            "Instagram App ID not configured. Please set INSTAGRAM_APP_ID.".to_string(),
        )
    })
}

async fn fetch_connection(
    pool: &sqlx::PgPool,
    user_id: i32,
) -> Result<Option<InstagramConnection>, ApiError> {
    let connection = sqlx::query_as::<_, InstagramConnection>(&format!(
        "SELECT {} FROM instagram_connections WHERE user_id = $1",
        CONNECTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(connection)
}

async fn connect(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConnectUrlResponse>, ApiError> {
    let client = require_client(&state)?;

    Ok(Json(ConnectUrlResponse {
        oauth_url: client.oauth_url(&claims.username),
        message: "Redirect user to this URL to connect Instagram account".to_string(),
    }))
}

async fn oauth_callback(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!("OAuth error: {}", error)));
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Authorization code not provided".to_string()))?;
    let username = query
        .state
        .ok_or_else(|| ApiError::BadRequest("State parameter missing".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
    )
    .bind(&username)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let client = require_client(&state)?;

    // Token exchange chain: code -> short-lived -> long-lived. When the
    // long-lived exchange fails we keep the short-lived token and its expiry.
    let short_lived = client.exchange_code(&code).await.map_err(map_upstream)?;
    let token = match client.extend_token(&short_lived.token).await {
        Ok(long_lived) => long_lived,
        Err(e) => {
            tracing::warn!("Long-lived token exchange failed, using short-lived token: {}", e);
            short_lived
        }
    };

    let (page_id, page_token) = client.first_page(&token.token).await.map_err(map_upstream)?;
    let account_id = client
        .business_account(&page_id, &page_token)
        .await
        .map_err(map_upstream)?;
    let details = client
        .account_details(&account_id, &page_token)
        .await
        .map_err(map_upstream)?;

    let token_expires_at = token.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));

    sqlx::query(
        "INSERT INTO instagram_connections
             (user_id, instagram_account_id, instagram_username, instagram_account_name,
              access_token, token_expires_at, is_active, connected_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW())
         ON CONFLICT (user_id) DO UPDATE
         SET instagram_account_id = EXCLUDED.instagram_account_id,
             instagram_username = EXCLUDED.instagram_username,
             instagram_account_name = EXCLUDED.instagram_account_name,
             access_token = EXCLUDED.access_token,
             token_expires_at = EXCLUDED.token_expires_at,
             is_active = TRUE,
             updated_at = NOW()",
    )
    .bind(user.id)
    .bind(&account_id)
    .bind(&details.username)
    .bind(&details.name)
    .bind(&page_token)
    .bind(token_expires_at)
    .execute(&state.db_pool)
    .await?;

    tracing::info!(
        user_id = user.id,
        instagram_username = %details.username,
        "Instagram account connected"
    );

    Ok(Json(CallbackResponse {
        success: true,
        message: "Instagram account connected successfully".to_string(),
        instagram_username: details.username,
        instagram_name: details.name,
    }))
}

async fn status(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConnectionStatusResponse>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let Some(connection) = fetch_connection(&state.db_pool, user_id).await? else {
        return Ok(Json(ConnectionStatusResponse {
            connected: false,
            instagram_username: None,
            instagram_name: None,
            connected_at: None,
            last_sync_at: None,
            token_expired: false,
            message: Some("No Instagram account connected".to_string()),
        }));
    };

    let expired = connection.token_expired(Utc::now());
    Ok(Json(ConnectionStatusResponse {
        connected: connection.is_active && !expired,
        instagram_username: Some(connection.instagram_username),
        instagram_name: Some(connection.instagram_account_name),
        connected_at: Some(connection.connected_at),
        last_sync_at: connection.last_sync_at,
        token_expired: expired,
        message: None,
    }))
}

/// Pulls the account's conversations from the platform and merges each one
/// into the matching local chat. Already-synced conversations survive a
/// mid-run failure; the error reports how many were processed.
async fn sync_messages(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SyncResponse>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let client = require_client(&state)?;

    let connection = fetch_connection(&state.db_pool, user_id)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| {
            ApiError::BadRequest("No active Instagram connection found".to_string())
        })?;

    if connection.token_expired(Utc::now()) {
        return Err(ApiError::Unauthorized(
            "Instagram access token has expired. Please reconnect.".to_string(),
        ));
    }

    let conversations = client
        .list_conversations(&connection.instagram_account_id, &connection.access_token)
        .await
        .map_err(|e| ApiError::upstream(e.to_string(), 0))?;

    let mut synced_count = 0usize;

    for conversation in &conversations {
        let remote_messages = match client
            .list_messages(&conversation.id, &connection.access_token)
            .await
        {
            Ok(messages) => messages,
            // Transport failures likely affect the remaining conversations
            // too; stop and report partial progress.
            Err(InstagramApiError::Http(e)) => {
                return Err(ApiError::upstream(
                    format!("Failed to sync Instagram messages: {}", e),
                    synced_count,
                ));
            }
            // A per-conversation API error only poisons that conversation.
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    "Skipping conversation: {}", e
                );
                continue;
            }
        };
        if remote_messages.is_empty() {
            continue;
        }

        let customer_name = conversation
            .customer(&connection.instagram_account_id)
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("Instagram User")
            .to_string();

        sync_conversation(
            &state.db_pool,
            user_id,
            &customer_name,
            &remote_messages,
            &connection.instagram_account_id,
        )
        .await?;

        synced_count += 1;
    }

    sqlx::query("UPDATE instagram_connections SET last_sync_at = NOW() WHERE user_id = $1")
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    tracing::info!(user_id, synced_count, "Instagram sync completed");

    Ok(Json(SyncResponse {
        success: true,
        message: format!("Synced {} conversations from Instagram", synced_count),
        conversations_synced: synced_count,
    }))
}

/// Finds or creates the chat for one remote conversation, reconciles the
/// remote messages against it, and persists the insertions plus the summary
/// update in a single transaction.
async fn sync_conversation(
    pool: &sqlx::PgPool,
    user_id: i32,
    customer_name: &str,
    remote_messages: &[crate::sync::RemoteMessage],
    self_account_id: &str,
) -> Result<(), ApiError> {
    let chat = sqlx::query_as::<_, Chat>(
        "SELECT id, user_id, customer_name, platform, status, last_message, last_message_date
         FROM chats WHERE user_id = $1 AND platform = 'Instagram' AND customer_name = $2",
    )
    .bind(user_id)
    .bind(customer_name)
    .fetch_optional(pool)
    .await?;

    let chat = match chat {
        Some(chat) => chat,
        None => {
            sqlx::query_as::<_, Chat>(
                "INSERT INTO chats (user_id, customer_name, platform, status, last_message_date)
                 VALUES ($1, $2, 'Instagram', 'unread', NOW())
                 RETURNING id, user_id, customer_name, platform, status, last_message,
                           last_message_date",
            )
            .bind(user_id)
            .bind(customer_name)
            .fetch_one(pool)
            .await?
        }
    };

    let existing = sqlx::query_as::<_, Message>(
        "SELECT id, chat_id, text, sender, created_at
         FROM messages WHERE chat_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(chat.id)
    .fetch_all(pool)
    .await?;

    let result = reconcile(&existing, remote_messages, self_account_id, Utc::now());
    if result.messages_to_insert.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for message in &result.messages_to_insert {
        sqlx::query(
            "INSERT INTO messages (chat_id, text, sender, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(chat.id)
        .bind(&message.text)
        .bind(&message.sender)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;
    }

    // last_message_date must never move backwards: skip the text/date part
    // of the summary when the batch only added older messages.
    if let (Patch::Set(text), Patch::Set(date)) = (&result.last_message, &result.last_message_date)
    {
        if *date >= chat.last_message_date {
            sqlx::query("UPDATE chats SET last_message = $1, last_message_date = $2 WHERE id = $3")
                .bind(text)
                .bind(date)
                .bind(chat.id)
                .execute(&mut *tx)
                .await?;
        }
    }
    if let Patch::Set(status) = &result.status {
        sqlx::query("UPDATE chats SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(chat.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn disconnect(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let result = sqlx::query(
        "UPDATE instagram_connections SET is_active = FALSE, updated_at = NOW()
         WHERE user_id = $1",
    )
    .bind(user_id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "No Instagram connection found".to_string(),
        ));
    }

    Ok(Json(DisconnectResponse {
        success: true,
        message: "Instagram account disconnected successfully".to_string(),
    }))
}

fn map_upstream(e: InstagramApiError) -> ApiError {
    ApiError::upstream(e.to_string(), 0)
}
