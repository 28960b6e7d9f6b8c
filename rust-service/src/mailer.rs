//! Outbound email transport.
//!
//! The dispatch workflow sends through the [`Mailer`] trait; the concrete
//! implementation is an SMTP relay via lettre. Port 465 uses implicit TLS,
//! anything else STARTTLS. Every message carries a multipart alternative
//! body (plain text plus HTML) and, when an unsubscribe URL is present, a
//! `List-Unsubscribe` header.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::{self, ContentType, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::Config;

/// One outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Embedded into a `List-Unsubscribe` header when present
    pub unsubscribe_url: Option<String>,
}

/// Send-one-message abstraction over the relay.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
}

#[derive(Debug, Clone)]
struct ListUnsubscribe(String);

impl header::Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// SMTP mailer for the configured relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let from: Mailbox = format!("\"learnif.\" <{}>", config.smtp_user)
            .parse()
            .context("Invalid from address")?;

        let credentials =
            Credentials::new(config.smtp_user.clone(), config.smtp_password.clone());
        let timeout = Duration::from_millis(config.smtp_timeout_ms);

        // 465 is SMTPS (implicit TLS); submission ports negotiate STARTTLS
        let transport = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .context("Failed to create SMTPS transport")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .context("Failed to create STARTTLS transport")?
        }
        .port(config.smtp_port)
        .credentials(credentials)
        .timeout(Some(timeout))
        .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let to: Mailbox = email
            .to
            .parse()
            .with_context(|| format!("Invalid recipient address {:?}", email.to))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject);

        if let Some(url) = &email.unsubscribe_url {
            builder = builder.header(ListUnsubscribe(format!("<{}>", url)));
        }

        let message = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;

        info!(to = %email.to, subject = %email.subject, "email_sent");
        Ok(())
    }
}
