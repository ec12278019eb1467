//! Session token persistence. This repository is the only writer of
//! `session_tokens` rows.

use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};

use crate::entities::session_tokens;

/// Single logical device slot; logging in anywhere displaces the previous
/// session.
pub const DEVICE_SLOT: &str = "current";

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Delete every existing token for the user and insert a fresh one, as a
    /// single transaction. This is the only path that creates a session
    /// token, so rotation doubles as login and as remote invalidation.
    pub async fn rotate(&self, user_id: i32) -> Result<String> {
        let token = generate_session_token();
        let stored = token.clone();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .transaction::<_, (), sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    session_tokens::Entity::delete_many()
                        .filter(session_tokens::Column::UserId.eq(user_id))
                        .exec(txn)
                        .await?;

                    session_tokens::ActiveModel {
                        user_id: Set(user_id),
                        token: Set(stored),
                        device_id: Set(DEVICE_SLOT.to_string()),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    Ok(())
                })
            })
            .await
            .context("Failed to rotate session token")?;

        Ok(token)
    }

    /// A session is live iff a row matches both user and token exactly.
    pub async fn validate(&self, user_id: i32, token: &str) -> Result<bool> {
        let count = session_tokens::Entity::find()
            .filter(session_tokens::Column::UserId.eq(user_id))
            .filter(session_tokens::Column::Token.eq(token))
            .count(&self.conn)
            .await
            .context("Failed to validate session token")?;

        Ok(count > 0)
    }

    /// Delete the matching row. Deleting a row that is already gone is not
    /// an error, which keeps logout idempotent.
    pub async fn revoke(&self, user_id: i32, token: &str) -> Result<()> {
        session_tokens::Entity::delete_many()
            .filter(session_tokens::Column::UserId.eq(user_id))
            .filter(session_tokens::Column::Token.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to revoke session token")?;

        Ok(())
    }

    /// Number of live tokens for a user.
    pub async fn count_for_user(&self, user_id: i32) -> Result<u64> {
        session_tokens::Entity::find()
            .filter(session_tokens::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count session tokens")
    }
}

/// Generate an opaque session token (64-character hex string, 256 bits).
#[must_use]
pub fn generate_session_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
