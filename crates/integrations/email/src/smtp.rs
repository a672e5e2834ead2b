use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::EmailError;
use crate::transport::{MailTransport, OutboundEmail, SendReceipt};

/// SMTP delivery via `lettre`.
pub struct SmtpMailTransport {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

impl SmtpMailTransport {
    /// Build a transport from the relay configuration.
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| EmailError::Configuration(format!("invalid relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<(Message, String), EmailError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| EmailError::Configuration(format!("invalid from address: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::Transmission(format!("invalid recipient address: {e}")))?;

        // SMTP does not hand back a provider id, so stamp our own
        // Message-ID header and use it as the routing key.
        let message_id = format!("<{}@leadflow>", Uuid::new_v4());

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.clone()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| EmailError::Transmission(format!("message build failed: {e}")))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, EmailError> {
        debug!(to = %email.to, subject = %email.subject, "building SMTP message");
        let (message, message_id) = self.build_message(email)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, to = %email.to, "SMTP send failed");
            if e.is_transient() {
                EmailError::Connection(format!("transient SMTP failure: {e}"))
            } else {
                EmailError::Transmission(format!("SMTP rejected message: {e}"))
            }
        })?;

        info!(to = %email.to, message_id = %message_id, "email sent via SMTP");
        Ok(SendReceipt { message_id })
    }

    fn transport_name(&self) -> &'static str {
        "smtp"
    }
}
