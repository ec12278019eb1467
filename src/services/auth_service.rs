//! Domain service for authentication and the session lifecycle.
//!
//! Orchestrates signup, email verification, login with session rotation,
//! logout, and the per-request access check.

use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Errors specific to authentication operations.
///
/// `InvalidCredentials` and `NotFoundOrAlreadyVerified` are deliberately
/// generic so responses never confirm whether an email is registered.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Correct password, unverified account. A fresh code has been issued.
    #[error("Please verify your email first")]
    VerificationRequired,

    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    #[error("Email not found or already verified")]
    NotFoundOrAlreadyVerified,

    #[error("Authentication required")]
    Unauthorized,

    /// Signed token verified but the store-backed session is gone.
    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Database connection failed")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbErr> for AuthError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => Self::Unavailable,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(db_err) = cause.downcast_ref::<DbErr>() {
                if matches!(db_err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_)) {
                    return Self::Unavailable;
                }
            }
        }
        Self::Internal(err.to_string())
    }
}

/// User fields safe to hand back to clients.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i32,
    pub username: String,
    pub email: String,
}

/// Successful login: a signed bearer credential plus the user it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: PublicUser,
}

/// Identity attached to a request after the access check passes.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub user_id: i32,
    pub session_token: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an unverified account and dispatches a verification code.
    /// A failed email send is logged but does not fail the signup.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for malformed input before any
    /// storage access, [`AuthError::DuplicateEmail`] for a known email.
    async fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), AuthError>;

    /// Consumes a matching unexpired code and marks the account verified.
    async fn verify_email(&self, email: &str, code: &str) -> Result<(), AuthError>;

    /// Re-issues a code for an existing, unverified account.
    async fn resend_code(&self, email: &str) -> Result<(), AuthError>;

    /// Checks credentials, rotates the store-backed session (invalidating
    /// any previous one), and mints the bearer credential.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] for unknown email or wrong
    /// password; [`AuthError::VerificationRequired`] when the password is
    /// correct but the account is unverified (a fresh code is issued first).
    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Revokes the store-backed session named by the bearer credential.
    /// Malformed or expired tokens are a no-op success so a client can
    /// always escape a broken session.
    async fn logout(&self, bearer_token: &str) -> Result<(), AuthError>;

    /// Access check for protected requests: signature + expiry first, then
    /// store-backed liveness. Both must hold.
    async fn authorize(&self, bearer_token: &str) -> Result<AuthIdentity, AuthError>;
}
