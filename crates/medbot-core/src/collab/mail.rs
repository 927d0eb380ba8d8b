use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::MailConfig;

use super::Mailer;

/// Sends leaflets over SMTP with STARTTLS.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Self {
        let from = if config.from.is_empty() {
            config.username.clone()
        } else {
            config.from.clone()
        };
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            username: config.username.clone(),
            password: config.password.clone(),
            from,
        }
    }

    fn send_blocking(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<String> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{Message, SmtpTransport, Transport};

        let email = Message::builder()
            .from(self.from.parse()?)
            .to(recipient.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());

        let transport = SmtpTransport::starttls_relay(&self.host)?
            .port(self.port)
            .credentials(creds)
            .build();

        let response = transport.send(&email)?;
        Ok(response.code().to_string())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        // lettre's SMTP transport is blocking
        let mailer = self.clone();
        let (recipient, subject, body) = (recipient.to_string(), subject.to_string(), body.to_string());
        let result = tokio::task::spawn_blocking(move || {
            let sent = mailer.send_blocking(&recipient, &subject, &body);
            (recipient, sent)
        })
        .await;

        match result {
            Ok((recipient, Ok(code))) => {
                info!("Mail sent to {} ({})", recipient, code);
                true
            }
            Ok((recipient, Err(e))) => {
                error!("Mail to {} failed: {}", recipient, e);
                false
            }
            Err(e) => {
                error!("Mail task panicked: {}", e);
                false
            }
        }
    }
}

/// Used when no SMTP server is configured. Every send is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, recipient: &str, _subject: &str, _body: &str) -> bool {
        warn!("Mail to {} dropped: SMTP is not configured", recipient);
        false
    }
}
