use crate::error::{Error, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Delivers one composed report.
pub trait Notifier {
    fn send(&self, title: &str, body: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Plain SMTP.
    None,
    /// Plain connection upgraded with STARTTLS.
    Tls,
    /// Implicit TLS from the first byte.
    Ssl,
}

impl FromStr for Encryption {
    type Err = std::convert::Infallible;

    /// Anything other than TLS or SSL (in any case) means no encryption.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "SSL" => Encryption::Ssl,
            "TLS" => Encryption::Tls,
            _ => Encryption::None,
        })
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    pub receiver: String,
    pub encryption: Encryption,
    pub timeout: Duration,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("receiver", &self.receiver)
            .field("encryption", &self.encryption)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Subject/From/To headers and a plain-text body. The sender is the login.
    pub fn build_message(&self, title: &str, body: &str) -> Result<Message> {
        let from = parse_mailbox(&self.config.login)?;
        let to = parse_mailbox(&self.config.receiver)?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(title)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::MailDelivery(format!("failed to build message: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let cfg = &self.config;
        let builder = match cfg.encryption {
            Encryption::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.server)
                .map_err(|e| Error::MailDelivery(format!("{}: {e}", cfg.server)))?,
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.server)
                .map_err(|e| Error::MailDelivery(format!("{}: {e}", cfg.server)))?,
            Encryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.server),
        };
        Ok(builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.login.clone(), cfg.password.clone()))
            .timeout(Some(cfg.timeout))
            .build())
    }
}

impl Notifier for Mailer {
    fn send(&self, title: &str, body: &str) -> impl Future<Output = Result<()>> + Send {
        let prepared = self
            .build_message(title, body)
            .and_then(|message| Ok((message, self.transport()?)));
        let server = format!("{}:{}", self.config.server, self.config.port);
        let receiver = self.config.receiver.clone();
        async move {
            let (message, transport) = prepared?;
            transport
                .send(message)
                .await
                .map_err(|e| Error::MailDelivery(format!("{server}: {e}")))?;
            info!(%server, %receiver, "report mailed");
            Ok(())
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| Error::MailDelivery(format!("invalid address {address:?}: {e}")))
}
