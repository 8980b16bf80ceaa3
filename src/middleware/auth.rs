use crate::error::ApiError;
use crate::handlers::auth::verify_jwt_token;
use crate::models::auth::Claims;
use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Bearer-token middleware. Verifies the JWT and injects the claims into the
/// request extensions so handlers can resolve the current user.
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized(
            "Invalid Authorization header format. Expected 'Bearer <token>'".to_string(),
        )
    })?;

    let claims = verify_jwt_token(token).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Parses the user id out of verified claims. The subject is written by us
/// at token issue time, so a non-numeric value means a forged or corrupt
/// token rather than a user error.
pub fn user_id_from_claims(claims: &Claims) -> Result<i32, ApiError> {
    claims
        .sub
        .parse::<i32>()
        .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))
}
