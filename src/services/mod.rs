pub mod auth_service;
pub use auth_service::{AuthError, AuthIdentity, AuthService, LoginResult, PublicUser};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod bearer;
pub use bearer::BearerTokenService;

pub mod mailer;
pub use mailer::{HttpMailer, Mailer, NoopMailer};
