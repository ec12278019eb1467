use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Hash the seeded admin password using Argon2id
fn hash_seed_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let password = b"changeme-admin";
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password, &salt)
        .expect("Failed to hash seed password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(SessionTokens)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Transactions)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // One live session per (user, device); the single device sentinel
        // collapses this to one per user.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_session_tokens_user_device")
                    .table(SessionTokens)
                    .col(crate::entities::session_tokens::Column::UserId)
                    .col(crate::entities::session_tokens::Column::DeviceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_user_date")
                    .table(Transactions)
                    .col(crate::entities::transactions::Column::UserId)
                    .col(crate::entities::transactions::Column::Date)
                    .to_owned(),
            )
            .await?;

        // Seed the admin account, pre-verified so it can log in immediately.
        let now = chrono::Utc::now().to_rfc3339();
        let password_hash = hash_seed_password();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                crate::entities::users::Column::Username,
                crate::entities::users::Column::Email,
                crate::entities::users::Column::PasswordHash,
                crate::entities::users::Column::IsVerified,
                crate::entities::users::Column::IsAdmin,
                crate::entities::users::Column::CreatedAt,
            ])
            .values_panic([
                "admin".into(),
                "admin@fintrack.local".into(),
                password_hash.into(),
                true.into(),
                true.into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SessionTokens).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
