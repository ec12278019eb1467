use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::session::DEVICE_SLOT;
pub use repositories::transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionSummary,
};
pub use repositories::user::User;

/// Store connectivity is retried at boot with a fixed delay before startup
/// is declared failed.
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = connect_with_retry(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn verification_repo(&self) -> repositories::verification::VerificationRepository {
        repositories::verification::VerificationRepository::new(self.conn.clone())
    }

    fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    fn transaction_repo(&self) -> repositories::transaction::TransactionRepository {
        repositories::transaction::TransactionRepository::new(self.conn.clone())
    }

    // Credential store

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        code: &str,
        code_expires: &str,
        security: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(username, email, password, code, code_expires, security)
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().find_by_email(email).await
    }

    pub async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().find_by_id(id).await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn set_user_verified(&self, id: i32) -> Result<()> {
        self.user_repo().set_verified(id).await
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    pub async fn set_user_admin(&self, id: i32, is_admin: bool) -> Result<Option<User>> {
        self.user_repo().set_admin(id, is_admin).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list_all().await
    }

    pub async fn search_users(&self, term: &str) -> Result<Vec<User>> {
        self.user_repo().search(term).await
    }

    // Verification code issuer

    pub async fn issue_verification_code(&self, user_id: i32) -> Result<String> {
        self.verification_repo().issue(user_id).await
    }

    pub async fn check_verification_code(&self, email: &str, code: &str) -> Result<Option<User>> {
        self.verification_repo().check(email, code).await
    }

    pub async fn consume_verification_code(&self, email: &str, code: &str) -> Result<bool> {
        self.verification_repo().consume(email, code).await
    }

    // Session token manager

    pub async fn rotate_session(&self, user_id: i32) -> Result<String> {
        self.session_repo().rotate(user_id).await
    }

    pub async fn validate_session(&self, user_id: i32, token: &str) -> Result<bool> {
        self.session_repo().validate(user_id, token).await
    }

    pub async fn revoke_session(&self, user_id: i32, token: &str) -> Result<()> {
        self.session_repo().revoke(user_id, token).await
    }

    pub async fn count_sessions(&self, user_id: i32) -> Result<u64> {
        self.session_repo().count_for_user(user_id).await
    }

    // Transactions

    pub async fn add_transaction(&self, user_id: i32, new: NewTransaction) -> Result<Transaction> {
        self.transaction_repo().add(user_id, new).await
    }

    pub async fn list_transactions(
        &self,
        user_id: i32,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        self.transaction_repo().list(user_id, filter).await
    }

    pub async fn update_transaction(
        &self,
        id: i32,
        user_id: i32,
        new: NewTransaction,
    ) -> Result<Option<Transaction>> {
        self.transaction_repo().update(id, user_id, new).await
    }

    pub async fn delete_transaction(&self, id: i32, user_id: i32) -> Result<bool> {
        self.transaction_repo().delete(id, user_id).await
    }

    pub async fn transaction_summary(&self, user_id: i32) -> Result<TransactionSummary> {
        self.transaction_repo().summary(user_id).await
    }

    pub async fn count_transactions(&self, user_id: i32) -> Result<u64> {
        self.transaction_repo().count_for_user(user_id).await
    }
}

/// Bounded-retry connect: `CONNECT_ATTEMPTS` tries with a fixed delay, then
/// the last error is fatal.
async fn connect_with_retry(opt: ConnectOptions) -> Result<DatabaseConnection> {
    let mut attempts_left = CONNECT_ATTEMPTS;

    loop {
        attempts_left -= 1;
        match Database::connect(opt.clone()).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempts_left > 0 => {
                warn!(
                    "Failed to connect to database ({e}). Retries left: {}",
                    attempts_left
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to connect to database after {CONNECT_ATTEMPTS} attempts: {e}"
                ));
            }
        }
    }
}
