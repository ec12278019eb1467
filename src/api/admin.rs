use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::{AdminUserDto, ApiError, AppState, MessageResponse};

#[derive(Deserialize)]
pub struct SearchQuery {
    pub term: String,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<AdminUserDto>,
}

#[derive(Serialize)]
pub struct AdminActionResponse {
    pub success: bool,
    pub message: String,
    pub user: AdminUserDto,
}

/// The admin panel rides on the same bearer guard; the admin flag is
/// re-read from the store on every call rather than trusted from a claim.
async fn require_admin(state: &AppState, auth_user: AuthUser) -> Result<(), ApiError> {
    let user = state
        .store()
        .find_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    if !user.is_admin {
        return Err(ApiError::Forbidden(
            "Access denied: Admin privileges required".to_string(),
        ));
    }

    Ok(())
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<UserListResponse>, ApiError> {
    require_admin(&state, auth_user).await?;

    let users = state.store().list_users().await?;

    Ok(Json(UserListResponse {
        success: true,
        users: users.into_iter().map(Into::into).collect(),
    }))
}

/// GET /admin/users/search?term=
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    require_admin(&state, auth_user).await?;

    let users = state.store().search_users(&query.term).await?;

    Ok(Json(UserListResponse {
        success: true,
        users: users.into_iter().map(Into::into).collect(),
    }))
}

/// DELETE /admin/users/{id}
/// Removes the user together with their session tokens and transactions.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&state, auth_user).await?;

    let target = state
        .store()
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    if target.is_admin {
        return Err(ApiError::Forbidden("Cannot delete admin users".to_string()));
    }

    let deleted = state.store().delete_user(id).await?;
    if !deleted {
        return Err(ApiError::not_found("User", id));
    }

    tracing::info!("Admin {} deleted user {}", auth_user.id, id);

    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// POST /admin/users/{id}/promote
pub async fn promote_user(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(&state, auth_user).await?;

    let user = state
        .store()
        .set_user_admin(id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    tracing::info!("Admin {} promoted user {}", auth_user.id, id);

    Ok(Json(AdminActionResponse {
        success: true,
        message: "User promoted to admin successfully".to_string(),
        user: user.into(),
    }))
}

/// POST /admin/users/{id}/revoke
/// Self-revocation is refused.
pub async fn revoke_admin(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<AdminActionResponse>, ApiError> {
    require_admin(&state, auth_user).await?;

    if id == auth_user.id {
        return Err(ApiError::Forbidden(
            "Cannot revoke your own admin privileges".to_string(),
        ));
    }

    let user = state
        .store()
        .set_user_admin(id, false)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    tracing::info!("Admin {} revoked admin privileges of user {}", auth_user.id, id);

    Ok(Json(AdminActionResponse {
        success: true,
        message: "Admin privileges revoked successfully".to_string(),
        user: user.into(),
    }))
}
