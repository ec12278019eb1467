//! Email delivery capability: "send code to address, returns
//! success/failure". Callers decide whether a failure is fatal (it never is
//! for signup/login flows).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::EmailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    html_content: String,
}

/// Delivers codes through a transactional-mail HTTP API (Brevo-compatible
/// payload shape).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("FinTrack/1.0")
            .build()
            .context("Failed to build mail HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        let body = SendEmailBody {
            sender: EmailAddress {
                email: self.from_email.clone(),
                name: Some(self.from_name.clone()),
            },
            to: vec![EmailAddress {
                email: to.to_string(),
                name: None,
            }],
            subject: "Your FinTrack Verification Code".to_string(),
            html_content: format!(
                "<h1>Welcome to FinTrack!</h1>\
                 <p>Your verification code is:</p>\
                 <h2 style=\"font-size: 32px; letter-spacing: 5px; text-align: center;\">{code}</h2>\
                 <p>This code will expire in 15 minutes.</p>"
            ),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to reach mail API")?;

        response
            .error_for_status()
            .context("Mail API rejected the send")?;

        Ok(())
    }
}

/// Used in development and tests; the code only goes to the debug log.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        debug!("Email delivery disabled; verification code for {to}: {code}");
        Ok(())
    }
}
