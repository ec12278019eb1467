use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::{session_tokens, transactions, users};

/// User data returned from the repository (keeps the password hash out of
/// everything above the credential check).
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub is_admin: bool,
    pub verification_code: Option<String>,
    pub verification_code_expires: Option<String>,
    pub created_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_verified: model.is_verified,
            is_admin: model.is_admin,
            verification_code: model.verification_code,
            verification_code_expires: model.verification_code_expires,
            created_at: model.created_at,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create an unverified user with an initial verification challenge.
    /// The caller has already checked for a duplicate email; a lost race on
    /// the unique index still surfaces as an error here.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        verification_code: &str,
        code_expires: &str,
        security: &SecurityConfig,
    ) -> Result<User> {
        let password = password.to_string();
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let model = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            is_verified: Set(false),
            is_admin: Set(false),
            verification_code: Set(Some(verification_code.to_string())),
            verification_code_expires: Set(Some(code_expires.to_string())),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Verify a candidate password against the stored hash.
    /// Runs on `spawn_blocking` because Argon2 verification is CPU-bound.
    /// Unknown emails report `false`, indistinguishable from a bad password.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(is_valid)
    }

    /// Mark a user verified and clear the challenge columns in one update.
    /// Idempotent: verifying an already-verified user is a no-op.
    pub async fn set_verified(&self, id: i32) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for verification")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        if user.is_verified {
            return Ok(());
        }

        let mut active: users::ActiveModel = user.into();
        active.is_verified = Set(true);
        active.verification_code = Set(None);
        active.verification_code_expires = Set(None);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Delete a user with all owned rows (session tokens and transactions)
    /// in a single transaction. Returns false when no such user exists.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let deleted = self
            .conn
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    session_tokens::Entity::delete_many()
                        .filter(session_tokens::Column::UserId.eq(id))
                        .exec(txn)
                        .await?;

                    transactions::Entity::delete_many()
                        .filter(transactions::Column::UserId.eq(id))
                        .exec(txn)
                        .await?;

                    let result = users::Entity::delete_by_id(id).exec(txn).await?;
                    Ok(result.rows_affected > 0)
                })
            })
            .await
            .context("Failed to delete user")?;

        Ok(deleted)
    }

    /// Set or clear the admin flag, returning the updated user. Returns None
    /// when no such user exists.
    pub async fn set_admin(&self, id: i32, is_admin: bool) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for admin change")?;

        let Some(user) = user else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.is_admin = Set(is_admin);
        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update admin flag")?;

        Ok(Some(User::from(updated)))
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .order_by_desc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn search(&self, term: &str) -> Result<Vec<User>> {
        let pattern = format!("%{term}%");

        let rows = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.like(&pattern))
                    .add(users::Column::Email.like(&pattern)),
            )
            .order_by_desc(users::Column::CreatedAt)
            .all(&self.conn)
            .await
            .context("Failed to search users")?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}

/// Hash a password using Argon2id with the configured cost parameters.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
