// # Notification Channel Traits
//
// Defines the one polymorphic transport capability shared by every
// notification channel.
//
// ## Implementations
//
// - Email (SMTP): `groundstation-smtp` crate
// - Broker (MQTT 3.1.1): `groundstation-mqtt` crate
//
// ## Protocol
//
// Every delivery follows the same skeleton, driven by
// [`crate::dispatch::deliver`]:
//
// ```text
// connect ──▶ authenticate (optional) ──▶ send ──▶ disconnect
//    │               │                      │          │
//    └───────────────┴────── error ─────────┴──────────┴──▶ abort + re-raise
// ```

use crate::error::Result;
use async_trait::async_trait;

/// Notification channel family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// SMTP email
    Email,
    /// MQTT message broker
    Mqtt,
}

impl ChannelKind {
    /// Channel name used in logs and registry keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Mqtt => "mqtt",
        }
    }

    /// Substring that marks an instruction as belonging to this channel
    ///
    /// A failed instruction whose name contains it (any case) never fires
    /// this channel's trigger, so a failing notifier cannot report itself.
    pub fn self_identifier(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport security for a channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Cleartext connection
    Plain,
    /// TLS from the first byte
    Tls,
    /// Negotiated: implicit TLS on well-known TLS ports, upgrade when offered
    #[default]
    Auto,
}

/// Username/password pair, already opened from the configuration store
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Where and how to connect for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Client identifier presented during connect (broker channels)
    pub client_id: Option<String>,
    pub security: TransportSecurity,
    /// Credentials, if the channel should authenticate
    pub credentials: Option<Credentials>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: None,
            security: TransportSecurity::default(),
            credentials: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// MQTT quality of service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Sender mailbox
    pub from: String,
    /// Comma-separated recipient mailboxes
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Value of the single `X-Mailer` header
    pub mailer: String,
}

/// Broker publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
    pub retain: bool,
}

/// A message ready for a channel session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Mail(MailMessage),
    Publish(PublishMessage),
}

impl OutboundMessage {
    /// Channel able to carry this message
    pub fn channel(&self) -> ChannelKind {
        match self {
            OutboundMessage::Mail(_) => ChannelKind::Email,
            OutboundMessage::Publish(_) => ChannelKind::Mqtt,
        }
    }
}

/// Opens sessions on one channel
///
/// # Trust Level: Untrusted
///
/// Connectors wrap a third-party transport library.
///
/// ## Allowed Capabilities
/// - ✅ Open one network connection per [`ChannelConnector::connect`] call
/// - ✅ Translate library errors into `Error::Connection`,
///   `Error::Authentication` or `Error::Transport`
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (no retry policy exists anywhere)
/// - ❌ Spawn tasks that outlive the session
/// - ❌ Log credentials
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Channel this connector speaks
    fn kind(&self) -> ChannelKind;

    /// Open a connection to `endpoint`
    ///
    /// Security negotiation happens here. Broker channels that carry
    /// credentials in their connect handshake read them from
    /// `endpoint.credentials`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChannelSession>>;
}

/// One open connection, scoped to a single delivery
#[async_trait]
pub trait ChannelSession: Send {
    /// Authenticate an open connection
    ///
    /// The default does nothing, for channels that authenticated during
    /// connect.
    async fn authenticate(&mut self, _credentials: &Credentials) -> Result<()> {
        Ok(())
    }

    /// Deliver one message
    async fn send(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Graceful close
    async fn disconnect(&mut self) -> Result<()>;

    /// Release the connection immediately, without protocol goodbye
    ///
    /// Called on every failure path. Must not block.
    fn abort(&mut self);
}
