//! Verification challenge persistence: 6-digit codes with absolute expiry,
//! stored on the user row.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use super::user::User;
use crate::entities::users;

/// Codes expire 15 minutes after issuance.
pub const CODE_TTL_MINUTES: i64 = 15;

pub struct VerificationRepository {
    conn: DatabaseConnection,
}

impl VerificationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issue a fresh code for a user, overwriting any prior unconsumed code.
    /// Returns the code for delivery.
    pub async fn issue(&self, user_id: i32) -> Result<String> {
        let code = generate_verification_code();
        let expires = code_expiry().to_rfc3339();

        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for code issuance")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.verification_code = Set(Some(code.clone()));
        active.verification_code_expires = Set(Some(expires));
        active.update(&self.conn).await?;

        Ok(code)
    }

    /// Check a code without consuming it. Succeeds only for an unverified
    /// user whose stored code matches and is unexpired at check time.
    pub async fn check(&self, email: &str, code: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::IsVerified.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query user for code check")?;

        let Some(user) = user else {
            return Ok(None);
        };

        if code_matches(&user, code) {
            Ok(Some(User::from(user)))
        } else {
            Ok(None)
        }
    }

    /// Re-check and consume the code, flipping the user to verified, all in
    /// one transaction so concurrent retries cannot double-consume.
    /// Returns false when the code no longer satisfies the check.
    pub async fn consume(&self, email: &str, code: &str) -> Result<bool> {
        let email = email.to_string();
        let code = code.to_string();

        let consumed = self
            .conn
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    let user = users::Entity::find()
                        .filter(users::Column::Email.eq(&email))
                        .filter(users::Column::IsVerified.eq(false))
                        .one(txn)
                        .await?;

                    let Some(user) = user else {
                        return Ok(false);
                    };

                    if !code_matches(&user, &code) {
                        return Ok(false);
                    }

                    let mut active: users::ActiveModel = user.into();
                    active.is_verified = Set(true);
                    active.verification_code = Set(None);
                    active.verification_code_expires = Set(None);
                    active.update(txn).await?;

                    Ok(true)
                })
            })
            .await
            .context("Failed to consume verification code")?;

        Ok(consumed)
    }
}

fn code_matches(user: &users::Model, candidate: &str) -> bool {
    let (Some(code), Some(expires)) = (
        user.verification_code.as_deref(),
        user.verification_code_expires.as_deref(),
    ) else {
        return false;
    };

    if code != candidate {
        return false;
    }

    // Expiry is evaluated against current server time, no grace period.
    DateTime::parse_from_rfc3339(expires).is_ok_and(|exp| exp > Utc::now())
}

/// Uniform random 6-digit code, leading zeros preserved.
#[must_use]
pub fn generate_verification_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000))
}

#[must_use]
pub fn code_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(CODE_TTL_MINUTES)
}
