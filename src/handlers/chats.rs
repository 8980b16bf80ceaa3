use crate::error::ApiError;
use crate::middleware::auth::{auth_middleware, user_id_from_claims};
use crate::models::auth::Claims;
use crate::models::chat::*;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, post, Router},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/chats", get(get_chats).post(create_chat))
        .route("/api/chats/create-with-messages", post(create_chat_with_messages))
        .route(
            "/api/chats/:chat_id",
            get(get_chat).put(update_chat).delete(delete_chat),
        )
        .route("/api/chats/:chat_id/messages", post(create_message))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// Loads a chat and verifies ownership. Absent and not-owned are the same
/// not-found condition; ownership is never leaked to other users.
pub async fn fetch_owned_chat(
    pool: &sqlx::PgPool,
    chat_id: i32,
    user_id: i32,
) -> Result<Chat, ApiError> {
    sqlx::query_as::<_, Chat>(
        "SELECT id, user_id, customer_name, platform, status, last_message, last_message_date
         FROM chats WHERE id = $1 AND user_id = $2",
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        ApiError::NotFound("Chat not found or you don't have permission to view it".to_string())
    })
}

async fn chat_messages(pool: &sqlx::PgPool, chat_id: i32) -> Result<Vec<Message>, ApiError> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT id, chat_id, text, sender, created_at
         FROM messages WHERE chat_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

async fn get_chats(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatResponse>>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let chats = sqlx::query_as::<_, Chat>(
        "SELECT id, user_id, customer_name, platform, status, last_message, last_message_date
         FROM chats WHERE user_id = $1 ORDER BY last_message_date DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    let chat_ids: Vec<i32> = chats.iter().map(|c| c.id).collect();
    let all_messages = sqlx::query_as::<_, Message>(
        "SELECT id, chat_id, text, sender, created_at
         FROM messages WHERE chat_id = ANY($1) ORDER BY created_at ASC, id ASC",
    )
    .bind(&chat_ids)
    .fetch_all(&state.db_pool)
    .await?;

    let mut grouped: std::collections::HashMap<i32, Vec<Message>> =
        std::collections::HashMap::new();
    for message in all_messages {
        grouped.entry(message.chat_id).or_default().push(message);
    }

    let responses = chats
        .into_iter()
        .map(|chat| {
            let messages = grouped.remove(&chat.id).unwrap_or_default();
            ChatResponse::from_chat(chat, messages)
        })
        .collect();

    Ok(Json(responses))
}

async fn get_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<i32>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let chat = fetch_owned_chat(&state.db_pool, chat_id, user_id).await?;
    let messages = chat_messages(&state.db_pool, chat.id).await?;
    Ok(Json(ChatResponse::from_chat(chat, messages)))
}

async fn create_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChatCreate>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    validate_status(&payload.status)?;

    let chat = sqlx::query_as::<_, Chat>(
        "INSERT INTO chats (user_id, customer_name, platform, status, last_message_date)
         VALUES ($1, $2, $3, $4, NOW())
         RETURNING id, user_id, customer_name, platform, status, last_message, last_message_date",
    )
    .bind(user_id)
    .bind(&payload.customer_name)
    .bind(&payload.platform)
    .bind(&payload.status)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ChatResponse::from_chat(chat, Vec::new())),
    ))
}

async fn update_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<i32>,
    Json(patch): Json<ChatPatch>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let mut chat = fetch_owned_chat(&state.db_pool, chat_id, user_id).await?;

    if let crate::models::patch::Patch::Set(status) = &patch.status {
        validate_status(status)?;
    }

    // Setting the last message also bumps the summary date.
    let bump_date = patch.last_message.is_set();

    patch.customer_name.apply_to(&mut chat.customer_name);
    patch.platform.apply_to(&mut chat.platform);
    patch.status.apply_to(&mut chat.status);
    patch.last_message.apply_to(&mut chat.last_message);
    if bump_date {
        chat.last_message_date = Utc::now();
    }

    let chat = sqlx::query_as::<_, Chat>(
        "UPDATE chats
         SET customer_name = $1, platform = $2, status = $3,
             last_message = $4, last_message_date = $5
         WHERE id = $6 AND user_id = $7
         RETURNING id, user_id, customer_name, platform, status, last_message, last_message_date",
    )
    .bind(&chat.customer_name)
    .bind(&chat.platform)
    .bind(&chat.status)
    .bind(&chat.last_message)
    .bind(chat.last_message_date)
    .bind(chat.id)
    .bind(user_id)
    .fetch_one(&state.db_pool)
    .await?;

    let messages = chat_messages(&state.db_pool, chat.id).await?;
    Ok(Json(ChatResponse::from_chat(chat, messages)))
}

async fn delete_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    // Messages go with the chat via ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM chats WHERE id = $1 AND user_id = $2")
        .bind(chat_id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "Chat not found or you don't have permission to delete it".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn create_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<i32>,
    Json(payload): Json<MessageCreate>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    if payload.text.is_empty() {
        return Err(ApiError::BadRequest("Message text is required".to_string()));
    }
    validate_sender(&payload.sender)?;

    let chat = fetch_owned_chat(&state.db_pool, chat_id, user_id).await?;

    let mut tx = state.db_pool.begin().await?;

    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (chat_id, text, sender, created_at)
         VALUES ($1, $2, $3, NOW())
         RETURNING id, chat_id, text, sender, created_at",
    )
    .bind(chat.id)
    .bind(&payload.text)
    .bind(&payload.sender)
    .fetch_one(&mut *tx)
    .await?;

    // A business reply marks the chat read; a customer message marks it
    // unread. last_message_date moves to now, which keeps it non-decreasing.
    let new_status = if payload.sender == SENDER_ME {
        STATUS_READ
    } else {
        STATUS_UNREAD
    };

    sqlx::query(
        "UPDATE chats SET last_message = $1, last_message_date = NOW(), status = $2
         WHERE id = $3",
    )
    .bind(&payload.text)
    .bind(new_status)
    .bind(chat.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn create_chat_with_messages(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateChatWithMessagesRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    validate_status(&payload.status)?;
    for seed in &payload.messages {
        validate_sender(&seed.sender)?;
    }

    let mut tx = state.db_pool.begin().await?;

    let chat = sqlx::query_as::<_, Chat>(
        "INSERT INTO chats (user_id, customer_name, platform, status, last_message_date)
         VALUES ($1, $2, $3, $4, NOW())
         RETURNING id, user_id, customer_name, platform, status, last_message, last_message_date",
    )
    .bind(user_id)
    .bind(&payload.customer_name)
    .bind(&payload.platform)
    .bind(&payload.status)
    .fetch_one(&mut *tx)
    .await?;

    // Seed messages are back-dated a minute apart so they read oldest-first.
    let now = Utc::now();
    let total = payload.messages.len() as i64;
    let mut messages = Vec::with_capacity(payload.messages.len());
    for (i, seed) in payload.messages.iter().enumerate() {
        let created_at = now - Duration::minutes(total - i as i64);
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (chat_id, text, sender, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, chat_id, text, sender, created_at",
        )
        .bind(chat.id)
        .bind(&seed.text)
        .bind(&seed.sender)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;
        messages.push(message);
    }

    let chat = if let Some(last) = payload.messages.last() {
        sqlx::query_as::<_, Chat>(
            "UPDATE chats SET last_message = $1 WHERE id = $2
             RETURNING id, user_id, customer_name, platform, status, last_message, last_message_date",
        )
        .bind(&last.text)
        .bind(chat.id)
        .fetch_one(&mut *tx)
        .await?
    } else {
        chat
    };

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(ChatResponse::from_chat(chat, messages)),
    ))
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    if status == STATUS_READ || status == STATUS_UNREAD {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid status '{}': expected 'read' or 'unread'",
            status
        )))
    }
}

fn validate_sender(sender: &str) -> Result<(), ApiError> {
    if sender == SENDER_ME || sender == SENDER_THEM {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid sender '{}': expected 'me' or 'them'",
            sender
        )))
    }
}
