use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, BearerTokenService, HttpMailer, Mailer, NoopMailer, SeaOrmAuthService,
};

/// Long-lived application services shared by every request handler.
pub struct SharedState {
    pub config: Config,
    pub store: Store,
    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Store::new(&config.general.database_path).await?;

        let mailer: Arc<dyn Mailer> = if config.email.enabled {
            info!("Email delivery enabled via {}", config.email.api_url);
            Arc::new(HttpMailer::new(&config.email)?)
        } else {
            info!("Email delivery disabled; verification codes go to the debug log");
            Arc::new(NoopMailer)
        };

        let bearer =
            BearerTokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);

        let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            bearer,
            mailer,
            config.security.clone(),
        ));

        Ok(Self {
            config,
            store,
            auth_service,
        })
    }
}
