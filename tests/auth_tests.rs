use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use fintrack::api::AppState;
use fintrack::config::Config;

/// Seeded by the initial migration (must match m20240101_initial.rs)
const ADMIN_EMAIL: &str = "admin@fintrack.local";
const ADMIN_PASSWORD: &str = "changeme-admin";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    // Cheap hashing parameters keep the suite fast
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;

    let state = fintrack::api::create_app_state_from_config(config)
        .await
        .expect("Failed to create app state");
    let app = fintrack::api::router(state.clone())
        .await
        .expect("Failed to build router");

    (app, state)
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_with_token(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get_with_token(app: &Router, uri: &str, token: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Read the pending verification code straight out of the store, standing in
/// for the email the user would receive.
async fn stored_code(state: &AppState, email: &str) -> String {
    state
        .store()
        .find_user_by_email(email)
        .await
        .unwrap()
        .expect("user should exist")
        .verification_code
        .expect("a verification code should be pending")
}

async fn signup(app: &Router, email: &str) {
    // Usernames are unique, so derive one per account
    let username = email.split('@').next().unwrap();
    let response = post_json(
        app,
        "/api/auth/signup",
        serde_json::json!({
            "username": username,
            "email": email,
            "password": "hunter2hunter2",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn login(app: &Router, email: &str, password: &str) -> axum::response::Response {
    post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

/// Full signup + verify + login flow, returning the bearer token.
async fn signup_verify_login(app: &Router, state: &AppState, email: &str) -> String {
    signup(app, email).await;

    let code = stored_code(state, email).await;
    let response = post_json(
        app,
        "/api/auth/verify",
        serde_json::json!({ "email": email, "code": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(app, email, "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_signup_validation() {
    let (app, _state) = spawn_app().await;

    // Missing fields
    let response = post_json(
        &app,
        "/api/auth/signup",
        serde_json::json!({ "username": "", "email": "", "password": "" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed email
    let response = post_json(
        &app,
        "/api/auth/signup",
        serde_json::json!({
            "username": "a", "email": "not-an-email", "password": "hunter2hunter2"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Short password
    let response = post_json(
        &app,
        "/api/auth/signup",
        serde_json::json!({
            "username": "a", "email": "a@example.com", "password": "short"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "Password must be at least 8 characters long"
    );
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (app, _state) = spawn_app().await;

    signup(&app, "dupe@example.com").await;

    let response = post_json(
        &app,
        "/api/auth/signup",
        serde_json::json!({
            "username": "other",
            "email": "dupe@example.com",
            "password": "hunter2hunter2",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn test_unverified_login_refused_without_token() {
    let (app, _state) = spawn_app().await;

    signup(&app, "fresh@example.com").await;

    let response = login(&app, "fresh@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Please verify your email first");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_verify_then_login_issues_token() {
    let (app, state) = spawn_app().await;

    let token = signup_verify_login(&app, &state, "verified@example.com").await;
    assert!(!token.is_empty());

    let response = get_with_token(&app, "/api/auth/user", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "verified@example.com");
    assert_eq!(body["user"]["username"], "verified");
}

#[tokio::test]
async fn test_wrong_code_rejected_and_code_survives() {
    let (app, state) = spawn_app().await;

    signup(&app, "codes@example.com").await;

    let response = post_json(
        &app,
        "/api/auth/verify",
        serde_json::json!({ "email": "codes@example.com", "code": "000000" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A failed attempt must not consume the real code
    let code = stored_code(&state, "codes@example.com").await;
    let response = post_json(
        &app,
        "/api/auth/verify",
        serde_json::json!({ "email": "codes@example.com", "code": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The consumed code no longer works
    let response = post_json(
        &app,
        "/api/auth/verify",
        serde_json::json!({ "email": "codes@example.com", "code": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_invalidates_previous_code() {
    let (app, state) = spawn_app().await;

    signup(&app, "resend@example.com").await;
    let first_code = stored_code(&state, "resend@example.com").await;

    let response = post_json(
        &app,
        "/api/auth/resend-code",
        serde_json::json!({ "email": "resend@example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let second_code = stored_code(&state, "resend@example.com").await;

    if first_code != second_code {
        let response = post_json(
            &app,
            "/api/auth/verify",
            serde_json::json!({ "email": "resend@example.com", "code": first_code }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = post_json(
        &app,
        "/api/auth/verify",
        serde_json::json!({ "email": "resend@example.com", "code": second_code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_resend_gives_generic_error_for_unknown_or_verified() {
    let (app, state) = spawn_app().await;

    // Unknown email
    let response = post_json(
        &app,
        "/api/auth/resend-code",
        serde_json::json!({ "email": "nobody@example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let unknown_body = body_json(response).await;

    // Already-verified account gets the exact same answer
    signup_verify_login(&app, &state, "done@example.com").await;
    let response = post_json(
        &app,
        "/api/auth/resend-code",
        serde_json::json!({ "email": "done@example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let verified_body = body_json(response).await;

    assert_eq!(unknown_body["error"], verified_body["error"]);
}

#[tokio::test]
async fn test_unverified_login_reissues_working_code() {
    let (app, state) = spawn_app().await;

    signup(&app, "retry@example.com").await;

    let response = login(&app, "retry@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The refused login left a fresh usable code behind
    let code = stored_code(&state, "retry@example.com").await;
    let response = post_json(
        &app,
        "/api/auth/verify",
        serde_json::json!({ "email": "retry@example.com", "code": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "retry@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_credentials_are_indistinguishable() {
    let (app, state) = spawn_app().await;

    signup_verify_login(&app, &state, "real@example.com").await;

    let response = login(&app, "real@example.com", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(response).await;

    let response = login(&app, "ghost@example.com", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = body_json(response).await;

    assert_eq!(wrong_password["error"], "Invalid credentials");
    assert_eq!(wrong_password["error"], unknown_email["error"]);
}

#[tokio::test]
async fn test_second_login_invalidates_previous_token() {
    let (app, state) = spawn_app().await;

    let first_token = signup_verify_login(&app, &state, "devices@example.com").await;

    let response = get_with_token(&app, "/api/auth/user", &first_token).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Login from a "second device"
    let response = login(&app, "devices@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let second_token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // The first token still has a valid signature but its session is gone
    let response = get_with_token(&app, "/api/auth/user", &first_token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Session expired. Please login again.");

    let response = get_with_token(&app, "/api/auth/user", &second_token).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Exactly one live session remains
    let user = state
        .store()
        .find_user_by_email("devices@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.store().count_sessions(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let (app, state) = spawn_app().await;

    let token = signup_verify_login(&app, &state, "bye@example.com").await;

    let response = post_with_token(&app, "/api/auth/logout", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with_token(&app, "/api/auth/user", &token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logout is idempotent
    let response = post_with_token(&app, "/api/auth/logout", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    // And tolerant of garbage tokens
    let response = post_with_token(&app, "/api/auth/logout", "not-a-token").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_bearer() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/user")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with_token(&app, "/api/auth/user", "garbage").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoint_is_public() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_admin_routes_forbidden_for_regular_users() {
    let (app, state) = spawn_app().await;

    let token = signup_verify_login(&app, &state, "pleb@example.com").await;

    let response = get_with_token(&app, "/api/admin/users", &token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_can_list_search_and_delete_users() {
    let (app, state) = spawn_app().await;

    let user_token = signup_verify_login(&app, &state, "victim@example.com").await;

    // Give the user a transaction so the cascade is observable
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/transactions")
                .header("Authorization", format!("Bearer {user_token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "amount": 10.0, "type": "expense" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let admin_token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = get_with_token(&app, "/api/admin/users", &admin_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let users = body["users"].as_array().unwrap();
    assert!(users.iter().any(|u| u["email"] == "victim@example.com"));

    let response =
        get_with_token(&app, "/api/admin/users/search?term=victim", &admin_token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 1);

    let victim = state
        .store()
        .find_user_by_email("victim@example.com")
        .await
        .unwrap()
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/users/{}", victim.id))
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Deletion cascades: sessions and transactions are gone, token is dead
    assert_eq!(state.store().count_sessions(victim.id).await.unwrap(), 0);
    assert_eq!(
        state.store().count_transactions(victim.id).await.unwrap(),
        0
    );
    let response = get_with_token(&app, "/api/auth/user", &user_token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_can_promote_and_revoke() {
    let (app, state) = spawn_app().await;

    let user_token = signup_verify_login(&app, &state, "deputy@example.com").await;
    let deputy = state
        .store()
        .find_user_by_email("deputy@example.com")
        .await
        .unwrap()
        .unwrap();

    let response = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let admin_token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Regular users cannot touch the admin flag
    let response = post_with_token(
        &app,
        &format!("/api/admin/users/{}/promote", deputy.id),
        &user_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_with_token(
        &app,
        &format!("/api/admin/users/{}/promote", deputy.id),
        &admin_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["is_admin"], true);

    // The promotion takes effect on the existing session, no re-login needed
    let response = get_with_token(&app, "/api/admin/users", &user_token).await;
    assert_eq!(response.status(), StatusCode::OK);

    // An admin cannot revoke their own privileges
    let response = post_with_token(
        &app,
        &format!("/api/admin/users/{}/revoke", deputy.id),
        &user_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Cannot revoke your own admin privileges");

    // But another admin can
    let response = post_with_token(
        &app,
        &format!("/api/admin/users/{}/revoke", deputy.id),
        &admin_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["is_admin"], false);

    let response = get_with_token(&app, "/api/admin/users", &user_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown user id is a plain 404
    let response = post_with_token(&app, "/api/admin/users/99999/promote", &admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_cookie_carries_absolute_expiry() {
    let (app, state) = spawn_app().await;

    signup_verify_login(&app, &state, "cookie@example.com").await;

    let response = login(&app, "cookie@example.com", "hunter2hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);

    // A fixed max age shows up as an Expires attribute; a session cookie
    // (or a sliding window re-stamped per request) would not carry one here.
    let set_cookie = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .expect("login should set the session cookie")
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(set_cookie.contains("expires="));
    assert!(set_cookie.contains("samesite=lax"));
}

#[tokio::test]
async fn test_admin_accounts_cannot_be_deleted() {
    let (app, state) = spawn_app().await;

    let response = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let admin_token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let admin = state
        .store()
        .find_user_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/admin/users/{}", admin.id))
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown user id is a plain 404
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/users/99999")
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
