//! Bearer-token authentication for the admin surface.
//!
//! Tokens are stateless signed JWTs carrying the user id; the user row is
//! resolved on every request so deactivating an account revokes access
//! immediately regardless of token expiry.

use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{LoginRequest, User};
use crate::validation::validate_login;
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Token lifetime in seconds (24 hours).
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id the token was issued for.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(user_id: Uuid, secret: &str) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Failed to sign token: {}", e)))
}

/// Decode and verify a token. Expired and malformed tokens are reported as
/// distinct 403s so the client can tell a stale session from a forged one.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Forbidden("Token expired".to_string())
        }
        _ => AppError::Forbidden("Invalid token".to_string()),
    })
}

/// Extractor for authenticated admin requests.
///
/// Rejections match the documented auth taxonomy: missing token -> 401,
/// bad/expired token -> 403, unknown or deactivated user -> 401.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Access token required".to_string()))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;

        // Verify user still exists and is active
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::Unauthorized(
                "User account is inactive".to_string(),
            ));
        }

        Ok(AuthUser(user))
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_login(&payload)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.to_lowercase())
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user else {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    if !user.is_active {
        return Err(AppError::Unauthorized(
            "User account is inactive".to_string(),
        ));
    }

    let verified = bcrypt::verify(&payload.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {}", e)))?;
    if !verified {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = issue_token(user.id, &state.config.jwt_secret)?;
    tracing::info!("Admin login: {}", user.email);

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role,
        },
    })))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; logout is an acknowledgement so clients have a
/// uniform call to clear their session against.
pub async fn logout(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    tracing::info!("Admin logout: {}", user.email);
    Json(json!({ "success": true, "message": "Logged out" }))
}

/// GET /api/auth/verify
pub async fn verify(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "role": user.role,
        },
    }))
}

/// Create the bootstrap admin account when ADMIN_EMAIL/ADMIN_PASSWORD are
/// configured and no user with that email exists yet.
pub async fn ensure_bootstrap_admin(pool: &PgPool, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_ref(),
        config.bootstrap_admin_password.as_ref(),
    ) else {
        return Ok(());
    };

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email.to_lowercase())
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Failed to hash password: {}", e)))?;

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, 'admin')",
    )
    .bind(Uuid::new_v4())
    .bind("Admin")
    .bind(email.to_lowercase())
    .bind(hash)
    .execute(pool)
    .await?;

    tracing::info!("✓ Bootstrap admin account created: {}", email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, SECRET).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_maps_to_forbidden() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 7200,
            // Past the default decode leeway
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        match decode_token(&token, SECRET).unwrap_err() {
            AppError::Forbidden(msg) => assert_eq!(msg, "Token expired"),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn tampered_token_is_invalid() {
        let token = issue_token(Uuid::new_v4(), SECRET).unwrap();
        match decode_token(&token, "other-secret").unwrap_err() {
            AppError::Forbidden(msg) => assert_eq!(msg, "Invalid token"),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }
}
