//! `SeaORM` implementation of the `AuthService` trait.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use crate::config::SecurityConfig;
use crate::db::Store;
use crate::db::repositories::verification::{code_expiry, generate_verification_code};
use crate::services::auth_service::{
    AuthError, AuthIdentity, AuthService, LoginResult, PublicUser,
};
use crate::services::bearer::BearerTokenService;
use crate::services::mailer::Mailer;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

const MIN_PASSWORD_LEN: usize = 8;

pub struct SeaOrmAuthService {
    store: Store,
    bearer: BearerTokenService,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        bearer: BearerTokenService,
        mailer: Arc<dyn Mailer>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            bearer,
            mailer,
            security,
        }
    }

    /// Issue a fresh code and attempt delivery. Delivery failure is logged
    /// and swallowed; the user can always request a resend.
    async fn issue_and_send(&self, user_id: i32, email: &str) -> Result<(), AuthError> {
        let code = self.store.issue_verification_code(user_id).await?;

        if let Err(e) = self.mailer.send_verification_code(email, &code).await {
            warn!("Failed to send verification code to {email}: {e}");
        }

        Ok(())
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), AuthError> {
        // Input checks happen before any storage access.
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation("All fields are required".to_string()));
        }

        if !EMAIL_RE.is_match(email) {
            return Err(AuthError::Validation("Invalid email address".to_string()));
        }

        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(
                "Password must be at least 8 characters long".to_string(),
            ));
        }

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let code = generate_verification_code();
        let expires = code_expiry().to_rfc3339();

        let user = self
            .store
            .create_user(username, email, password, &code, &expires, &self.security)
            .await?;

        info!("Created unverified account for user {}", user.id);

        if let Err(e) = self.mailer.send_verification_code(email, &code).await {
            warn!("Failed to send verification code to {email}: {e}");
        }

        Ok(())
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let consumed = self.store.consume_verification_code(email, code).await?;

        if consumed {
            info!("Email verified for {email}");
            Ok(())
        } else {
            Err(AuthError::InvalidOrExpiredCode)
        }
    }

    async fn resend_code(&self, email: &str) -> Result<(), AuthError> {
        let user = self.store.find_user_by_email(email).await?;

        // Generic failure: never confirm whether the email is registered.
        match user {
            Some(user) if !user.is_verified => self.issue_and_send(user.id, email).await,
            _ => Err(AuthError::NotFoundOrAlreadyVerified),
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        // Unknown email and wrong password take the same path and produce
        // the same generic error.
        let is_valid = self.store.verify_user_password(email, password).await?;
        if !is_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_verified {
            // Known password, unverified account: re-issue and refuse.
            self.issue_and_send(user.id, email).await?;
            return Err(AuthError::VerificationRequired);
        }

        // Rotation both logs in this session and invalidates any other.
        let session_token = self.store.rotate_session(user.id).await?;

        let token = self
            .bearer
            .issue(user.id, &session_token)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        info!("User {} logged in", user.id);

        Ok(LoginResult {
            token,
            user: PublicUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        })
    }

    async fn logout(&self, bearer_token: &str) -> Result<(), AuthError> {
        // Tolerate expired or malformed tokens: logout must never strand a
        // client in a broken session.
        let Some(claims) = self.bearer.decode_lenient(bearer_token) else {
            return Ok(());
        };

        let Ok(user_id) = claims.sub.parse::<i32>() else {
            return Ok(());
        };

        self.store
            .revoke_session(user_id, &claims.session_token)
            .await?;

        Ok(())
    }

    async fn authorize(&self, bearer_token: &str) -> Result<AuthIdentity, AuthError> {
        let claims = self
            .bearer
            .verify(bearer_token)
            .map_err(|_| AuthError::Unauthorized)?;

        let user_id = claims
            .sub
            .parse::<i32>()
            .map_err(|_| AuthError::Unauthorized)?;

        // Signature and expiry alone are not enough: a rotated or logged-out
        // session must fail even while the signature still verifies.
        let live = self
            .store
            .validate_session(user_id, &claims.session_token)
            .await?;

        if !live {
            return Err(AuthError::SessionExpired);
        }

        Ok(AuthIdentity {
            user_id,
            session_token: claims.session_token,
        })
    }
}
