//! Alert delivery over SMTP with STARTTLS.

use std::fmt;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationSink, SinkError};
use crate::alert::AlertEvent;
use crate::config::{ConfigError, EmailConfig};

const SUBJECT: &str = "🚨 Exception Alert";

/// Mails every alert to a fixed recipient group.
///
/// The connection is upgraded with STARTTLS and authenticated before each
/// message is sent.
pub struct EmailSink {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    relay: String,
    port: u16,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for EmailSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("EmailSink")
            .field("from", &self.from.to_string())
            .field("recipients", &self.recipients.len())
            .field("relay", &self.relay)
            .field("port", &self.port)
            .finish()
    }
}

impl EmailSink {
    pub fn new(config: &EmailConfig) -> Result<Self, ConfigError> {
        let from = config
            .username
            .parse::<Mailbox>()
            .map_err(|e| ConfigError::Invalid {
                name: "EMAIL_USER",
                reason: e.to_string(),
            })?;

        let recipients = config
            .recipients
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Invalid {
                name: "RECEIVER_GROUP",
                reason: e.to_string(),
            })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| ConfigError::Invalid {
                name: "SMTP_SERVER",
                reason: e.to_string(),
            })?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(EmailSink {
            from,
            recipients,
            relay: config.server.clone(),
            port: config.port,
            transport,
        })
    }

    fn message(&self, event: &AlertEvent) -> Result<Message, SinkError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(body(event))
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let message = self.message(event)?;
        self.transport.send(message).await.map_err(classify)?;

        tracing::debug!(
            relay = %self.relay,
            recipients = self.recipients.len(),
            "alert email accepted by relay"
        );
        Ok(())
    }
}

fn body(event: &AlertEvent) -> String {
    format!(
        "An exception was detected in logs:\n\n{}\n\nKeywords: {}\nSource: {}\nDetected at: {}\n",
        event.line(),
        event.keywords().join(", "),
        event.source().display(),
        event.detected_at().to_rfc3339(),
    )
}

/// Maps an SMTP failure onto the sink error kinds. 53x replies are
/// authentication failures; failures without any server reply never got a
/// working connection.
fn classify(err: lettre::transport::smtp::Error) -> SinkError {
    let message = err.to_string();

    match err.status() {
        Some(code) if code.to_string().starts_with("53") => SinkError::Auth(message),
        Some(_) => SinkError::Transport(message),
        None if err.is_client() || err.is_response() => SinkError::Transport(message),
        None => SinkError::Connect(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: "alerts@example.com".into(),
            password: "hunter2".into(),
            recipients: vec!["ops@example.com".into(), "dev@example.com".into()],
        }
    }

    fn event() -> AlertEvent {
        AlertEvent::new("ERROR: disk full", vec!["Error".into()], "/var/log/app.log")
    }

    #[tokio::test]
    async fn test_message_addresses_every_recipient() {
        let sink = EmailSink::new(&config()).unwrap();
        let message = sink.message(&event()).unwrap();

        let to: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(to, vec!["ops@example.com", "dev@example.com"]);

        assert_eq!(message.headers().get_raw("Subject"), Some("🚨 Exception Alert"));
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("ERROR: disk full"));
    }

    #[tokio::test]
    async fn test_bad_recipient_rejected() {
        let mut config = config();
        config.recipients.push("not an address".into());

        let err = EmailSink::new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RECEIVER_GROUP", .. }));
    }

    #[test]
    fn test_body() {
        let body = body(&event());
        assert!(body.starts_with("An exception was detected in logs:\n\nERROR: disk full\n"));
        assert!(body.contains("Keywords: Error"));
        assert!(body.contains("Source: /var/log/app.log"));
    }

    #[tokio::test]
    async fn test_debug_hides_password() {
        let sink = EmailSink::new(&config()).unwrap();
        assert!(!format!("{sink:?}").contains("hunter2"));
    }
}
