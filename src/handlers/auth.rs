use crate::error::ApiError;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::*;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, post, Router},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

pub fn auth_routes() -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(me))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters long".to_string(),
        ));
    }

    let existing = sqlx::query("SELECT id FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&state.db_pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "User with this username already exists".to_string(),
        ));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        tracing::error!("Error hashing password: {}", e);
        ApiError::Internal("Failed to hash password".to_string())
    })?;

    let mut user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash, created_at)
         VALUES ($1, $2, NOW())
         RETURNING id, username, password_hash, created_at",
    )
    .bind(&payload.username)
    .bind(&password_hash)
    .fetch_one(&state.db_pool)
    .await?;
    user.password_hash = String::new(); // Don't include password hash in response

    let token = generate_jwt_token(&user)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
    )
    .bind(&payload.username)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    match verify(&payload.password, &user.password_hash) {
        Ok(true) => {} // Password is correct
        Ok(false) => {
            return Err(ApiError::Unauthorized(
                "Invalid username or password".to_string(),
            ));
        }
        Err(e) => {
            tracing::error!("Error verifying password: {}", e);
            return Err(ApiError::Internal(
                "Failed to verify password".to_string(),
            ));
        }
    }

    let token = generate_jwt_token(&user)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn me(Extension(claims): Extension<Claims>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "user_id": claims.sub,
        "username": claims.username,
    }))
}

fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "default_secret".to_string())
}

pub fn generate_jwt_token(user: &User) -> Result<String, ApiError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        exp: expiration as usize,
        iat: Utc::now().timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_ref()),
    )
    .map_err(|e| {
        tracing::error!("Error generating JWT token: {}", e);
        ApiError::Internal("Failed to generate authentication token".to_string())
    })
}

pub fn verify_jwt_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "shopowner@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_jwt_round_trip() {
        let token = generate_jwt_token(&sample_user()).unwrap();
        let claims = verify_jwt_token(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "shopowner@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let token = generate_jwt_token(&sample_user()).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_jwt_token(&tampered).is_err());
        assert!(verify_jwt_token("not-a-token").is_err());
    }
}
