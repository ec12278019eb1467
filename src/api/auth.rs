use axum::{
    Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::{Expiry, Session};

use super::{ApiError, AppState, MessageResponse};
use crate::services::PublicUser;

/// Session cookie key carrying the logged-in user id.
pub const SESSION_USER_KEY: &str = "user_id";

/// Cookie sessions die 24 hours after login, regardless of activity.
const SESSION_TTL_HOURS: i64 = 24;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: PublicUser,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: PublicUser,
}

/// Identity attached to the request by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i32,
}

// ============================================================================
// Middleware
// ============================================================================

/// Access guard for protected routes.
///
/// Requires `Authorization: Bearer <token>`; the token must carry a valid
/// signature, be unexpired, and name a session that is still live in the
/// store. Cookie sessions never satisfy this guard.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(ApiError::unauthorized("Authentication required"));
    };

    let identity = state.auth().authorize(&token).await?;

    tracing::Span::current().record("user_id", identity.user_id);
    request.extensions_mut().insert(AuthUser {
        id: identity.user_id,
    });

    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer` header
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?;
    Some(token.trim().to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/signup
/// Create an unverified account and email a verification code
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth()
        .signup(&payload.username, &payload.email, &payload.password)
        .await?;

    Ok(Json(MessageResponse::new(
        "Please check your email for the verification code",
    )))
}

/// POST /auth/verify
/// Consume a verification code and mark the account verified
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth()
        .verify_email(&payload.email, &payload.code)
        .await?;

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// POST /auth/resend-code
pub async fn resend_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResendCodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth().resend_code(&payload.email).await?;

    Ok(Json(MessageResponse::new("New verification code sent")))
}

/// POST /auth/login
/// Authenticate, rotate the store-backed session, and return the bearer
/// credential. Also establishes the cookie session for browser surfaces.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let result = state
        .auth()
        .login(&payload.email, &payload.password)
        .await?;

    // Cookie-backed session, independently revocable from the bearer token.
    if let Err(e) = session.insert(SESSION_USER_KEY, result.user.id).await {
        return Err(ApiError::internal(format!("Failed to create session: {e}")));
    }

    // Absolute max age from login, matching the bearer credential's fixed
    // window rather than a sliding inactivity timeout.
    session.set_expiry(Some(Expiry::AtDateTime(
        time::OffsetDateTime::now_utc() + time::Duration::hours(SESSION_TTL_HOURS),
    )));

    Ok(Json(LoginResponse {
        success: true,
        token: result.token,
        user: result.user,
    }))
}

/// POST /auth/logout
/// Revoke the store-backed session named by the bearer credential and drop
/// the cookie session. Succeeds even with a broken or missing token.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.auth().logout(&token).await?;
    }

    let _ = session.flush().await;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /auth/user
/// Current user info (requires authentication)
pub async fn current_user(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store()
        .find_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", auth_user.id))?;

    Ok(Json(UserResponse {
        success: true,
        user: PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}
