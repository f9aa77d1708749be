// # SMTP Email Channel
//
// This crate provides the email [`ChannelConnector`] for the ground station
// system, built on lettre's low-level async SMTP connection.
//
// ## Protocol Mapping
//
// | Core step      | SMTP                                                 |
// |----------------|------------------------------------------------------|
// | `connect`      | TCP (implicit TLS on 465), EHLO, STARTTLS if offered |
// | `authenticate` | AUTH PLAIN / LOGIN                                   |
// | `send`         | MAIL FROM, RCPT TO, DATA                             |
// | `disconnect`   | QUIT                                                 |
// | `abort`        | drop the socket                                      |
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Channel Connector)
//
// **Allowed Capabilities**:
// - ✅ One SMTP connection per delivery
// - ✅ Translate lettre errors into the core error taxonomy
//
// **Forbidden Capabilities**:
// - ❌ Retry, connection pooling or background tasks
// - ❌ Logging the password
//
// ## Security Requirements
//
// - Credentials arrive already opened and are never logged
// - Certificates are verified against the webpki roots

use async_trait::async_trait;
use groundstation_core::traits::{
    ChannelConnector, ChannelKind, ChannelSession, Credentials, Endpoint, MailMessage,
    OutboundMessage, TransportSecurity,
};
use groundstation_core::{Error, PluginRegistry, Result};
use lettre::message::header::{HeaderName, HeaderValue};
use lettre::message::{Mailbox, Mailboxes};
use lettre::transport::smtp::authentication::{Credentials as SmtpCredentials, DEFAULT_MECHANISMS};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::SUBMISSIONS_PORT;
use lettre::Message;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for each SMTP exchange (30 seconds)
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

const CHANNEL: &str = "email";

/// Email channel connector
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    timeout: Duration,
}

impl SmtpConnector {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_SMTP_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SmtpConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the connection is TLS from the first byte
fn implicit_tls(security: TransportSecurity, port: u16) -> bool {
    match security {
        TransportSecurity::Tls => true,
        TransportSecurity::Auto => port == SUBMISSIONS_PORT,
        TransportSecurity::Plain => false,
    }
}

fn tls_parameters(endpoint: &Endpoint) -> Result<TlsParameters> {
    TlsParameters::new(endpoint.host.clone()).map_err(|e| {
        Error::connection(endpoint.host.clone(), endpoint.port, "Tls", e.to_string())
    })
}

/// Map a lettre error raised outside authentication
fn classify(err: &lettre::transport::smtp::Error, endpoint: &Endpoint) -> Error {
    let host = endpoint.host.clone();
    let port = endpoint.port;

    if err.is_timeout() {
        return Error::connection(host, port, "TimedOut", err.to_string());
    }

    // Socket-level failures carry an io::Error somewhere in the chain
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Error::connection(host, port, format!("{:?}", io.kind()), io.to_string());
        }
        source = cause.source();
    }

    if err.is_tls() {
        return Error::connection(host, port, "Tls", err.to_string());
    }

    Error::transport(CHANNEL, err.to_string())
}

/// Build the RFC 5322 message for a mail
pub fn build_message(mail: &MailMessage) -> Result<Message> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|e| Error::invalid_input(format!("Invalid from address {}: {}", mail.from, e)))?;
    let recipients: Mailboxes = mail
        .to
        .parse()
        .map_err(|e| Error::invalid_input(format!("Invalid recipient list {}: {}", mail.to, e)))?;

    let mut builder = Message::builder()
        .from(from)
        .subject(mail.subject.clone())
        .raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str("X-Mailer"),
            mail.mailer.clone(),
        ));

    for recipient in recipients {
        builder = builder.to(recipient);
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| Error::invalid_input(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl ChannelConnector for SmtpConnector {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChannelSession>> {
        let hello = ClientId::default();
        let implicit = implicit_tls(endpoint.security, endpoint.port);
        let tls = if implicit {
            Some(tls_parameters(endpoint)?)
        } else {
            None
        };

        let mut connection = AsyncSmtpConnection::connect_tokio1(
            (endpoint.host.as_str(), endpoint.port),
            Some(self.timeout),
            &hello,
            tls,
            None,
        )
        .await
        .map_err(|e| classify(&e, endpoint))?;

        if endpoint.security == TransportSecurity::Auto && !implicit && connection.can_starttls() {
            tracing::debug!("Upgrading SMTP connection with STARTTLS");
            connection
                .starttls(tls_parameters(endpoint)?, &hello)
                .await
                .map_err(|e| classify(&e, endpoint))?;
        }

        tracing::debug!(
            "Connected to SMTP server {}:{} (encrypted: {})",
            endpoint.host,
            endpoint.port,
            connection.is_encrypted()
        );

        Ok(Box::new(SmtpSession {
            connection: Some(connection),
            endpoint: endpoint.clone(),
        }))
    }
}

/// One SMTP connection
pub struct SmtpSession {
    connection: Option<AsyncSmtpConnection>,
    endpoint: Endpoint,
}

impl SmtpSession {
    fn connection(&mut self) -> Result<&mut AsyncSmtpConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| Error::transport(CHANNEL, "SMTP session already closed"))
    }
}

#[async_trait]
impl ChannelSession for SmtpSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let endpoint = self.endpoint.clone();
        let smtp_credentials =
            SmtpCredentials::new(credentials.username.clone(), credentials.password.clone());

        self.connection()?
            .auth(DEFAULT_MECHANISMS, &smtp_credentials)
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_permanent() || e.is_transient() {
                    Error::auth(credentials.username.clone(), endpoint.host.clone(), endpoint.port)
                } else {
                    classify(&e, &endpoint)
                }
            })
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        let OutboundMessage::Mail(mail) = message else {
            return Err(Error::transport(CHANNEL, "SMTP session can only send mail"));
        };

        let email = build_message(mail)?;
        let endpoint = self.endpoint.clone();

        self.connection()?
            .send(email.envelope(), &email.formatted())
            .await
            .map(|_| ())
            .map_err(|e| classify(&e, &endpoint))
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        connection
            .quit()
            .await
            .map(|_| ())
            .map_err(|e| classify(&e, &self.endpoint))
    }

    fn abort(&mut self) {
        // Dropping the connection closes the socket
        if self.connection.take().is_some() {
            tracing::debug!("Dropped SMTP connection to {}", self.endpoint.host);
        }
    }
}

/// Register the email channel with a plugin registry
pub fn register(registry: &PluginRegistry) {
    registry.register_channel(Arc::new(SmtpConnector::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> MailMessage {
        MailMessage {
            from: "scope@example.org".to_string(),
            to: "observer@example.org, night-crew@example.org".to_string(),
            subject: "Failure running Slew!".to_string(),
            body: "Status: \"Slew\" did not complete successfully after 3 attempts!".to_string(),
            mailer: "NINA".to_string(),
        }
    }

    #[test]
    fn message_carries_headers_and_all_recipients() {
        let message = build_message(&mail()).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();

        assert!(formatted.contains("X-Mailer: NINA"));
        assert!(formatted.contains("Subject: Failure running Slew!"));
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn invalid_from_address_is_rejected() {
        let mut mail = mail();
        mail.from = "not an address".to_string();
        assert!(matches!(build_message(&mail), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn implicit_tls_only_on_submissions_port_when_negotiating() {
        assert!(implicit_tls(TransportSecurity::Auto, 465));
        assert!(!implicit_tls(TransportSecurity::Auto, 587));
        assert!(implicit_tls(TransportSecurity::Tls, 587));
        assert!(!implicit_tls(TransportSecurity::Plain, 465));
    }

    #[test]
    fn registers_email_channel() {
        let registry = PluginRegistry::new();
        register(&registry);
        assert_eq!(registry.list_channels(), vec![ChannelKind::Email]);
    }

    #[tokio::test]
    async fn closed_session_rejects_send() {
        let mut session = SmtpSession {
            connection: None,
            endpoint: Endpoint::new("mail.example.org", 587),
        };

        let result = session.send(&OutboundMessage::Mail(mail())).await;
        tokio_test::assert_err!(result);
        tokio_test::assert_ok!(session.disconnect().await);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        // Port 1 on loopback is closed on any sane host
        let connector = SmtpConnector::with_timeout(Duration::from_secs(2));
        let endpoint = Endpoint::new("127.0.0.1", 1).with_security(TransportSecurity::Plain);

        match connector.connect(&endpoint).await {
            Err(Error::Connection { host, port, .. }) => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 1);
            }
            Err(other) => panic!("expected connection error, got {other:?}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
