use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, cookie::SameSite};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::Config;
use crate::state::SharedState;

pub mod admin;
pub mod auth;
mod error;
pub mod transactions;
mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,
    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn crate::services::AuthService> {
        &self.shared.auth_service
    }
}

pub async fn create_app_state(shared: Arc<SharedState>) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared).await)
}

pub async fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let (db_url, cors_origins, secure_cookies) = {
        let config = state.config();
        (
            config.general.database_path.clone(),
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
        )
    };

    // Cookie sessions live in the same database, owned by the store crate.
    let session_pool = sqlx::SqlitePool::connect(&db_url).await?;
    let session_store = SqliteStore::new(session_pool);
    session_store.migrate().await?;

    // Each session gets an absolute expiry at login; no sliding window here.
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(SameSite::Lax);

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/resend-code", post(auth::resend_code))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .layer(session_layer)
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    Ok(Router::new()
        .nest("/api", api_router)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http()))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/user", get(auth::current_user))
        .route(
            "/transactions",
            post(transactions::add_transaction).get(transactions::list_transactions),
        )
        .route(
            "/transactions/{id}",
            put(transactions::update_transaction).delete(transactions::delete_transaction),
        )
        .route("/transactions/categories", get(transactions::categories))
        .route("/transactions/summary", get(transactions::summary))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/search", get(admin::search_users))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route("/admin/users/{id}/promote", post(admin::promote_user))
        .route("/admin/users/{id}/revoke", post(admin::revoke_admin))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth))
}

/// GET /health
async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state.store().ping().await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))))
}
