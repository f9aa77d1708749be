// # MQTT Broker Channel
//
// This crate provides the MQTT [`ChannelConnector`] for the ground station
// system. Each delivery owns a short-lived rumqttc client and drives its
// event loop inline until the broker acknowledges each step.
//
// ## Protocol Mapping
//
// | Core step    | MQTT 3.1.1                                         |
// |--------------|----------------------------------------------------|
// | `connect`    | CONNECT (clean session, credentials) until CONNACK |
// | `send`       | PUBLISH until the QoS handshake completes          |
// | `disconnect` | DISCONNECT                                         |
// | `abort`      | drop the event loop and its socket                 |
//
// Credentials travel inside CONNECT, so there is no separate
// authentication step.
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Channel Connector)
//
// **Allowed Capabilities**:
// - ✅ One broker connection per delivery
// - ✅ Translate rumqttc errors into the core error taxonomy
//
// **Forbidden Capabilities**:
// - ❌ Reconnecting (the event loop is never polled after an error)
// - ❌ Subscribing to topics
// - ❌ Logging credentials

use async_trait::async_trait;
use groundstation_core::traits::{
    ChannelConnector, ChannelKind, ChannelSession, Endpoint, OutboundMessage, Qos,
    TransportSecurity,
};
use groundstation_core::{Error, PluginRegistry, Result};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, Transport,
};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for each broker round trip (30 seconds)
const DEFAULT_MQTT_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard MQTT-over-TLS port, used when security is negotiated
pub const MQTT_TLS_PORT: u16 = 8883;

const DEFAULT_CLIENT_ID: &str = "groundstation";

const CHANNEL: &str = "mqtt";

/// Request channel capacity of the per-delivery client
const CLIENT_CAPACITY: usize = 10;

/// MQTT channel connector
#[derive(Debug, Clone)]
pub struct MqttConnector {
    timeout: Duration,
}

impl MqttConnector {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_MQTT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn uses_tls(security: TransportSecurity, port: u16) -> bool {
    match security {
        TransportSecurity::Tls => true,
        TransportSecurity::Auto => port == MQTT_TLS_PORT,
        TransportSecurity::Plain => false,
    }
}

fn to_rumqttc_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Build client options for an endpoint
pub fn mqtt_options(endpoint: &Endpoint) -> MqttOptions {
    let client_id = endpoint
        .client_id
        .clone()
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

    let mut options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
    options.set_clean_session(true);

    if let Some(credentials) = &endpoint.credentials {
        options.set_credentials(credentials.username.clone(), credentials.password.clone());
    }

    if uses_tls(endpoint.security, endpoint.port) {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

/// Map an event loop error into the core taxonomy
fn classify(err: &ConnectionError, endpoint: &Endpoint) -> Error {
    let host = endpoint.host.clone();
    let port = endpoint.port;

    match err {
        ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized,
        ) => {
            let username = endpoint
                .credentials
                .as_ref()
                .map(|c| c.username.clone())
                .unwrap_or_default();
            Error::auth(username, host, port)
        }
        ConnectionError::ConnectionRefused(code) => {
            Error::connection(host, port, format!("{:?}", code), err.to_string())
        }
        ConnectionError::Io(io) => {
            Error::connection(host, port, format!("{:?}", io.kind()), io.to_string())
        }
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            Error::connection(host, port, "TimedOut", err.to_string())
        }
        ConnectionError::Tls(tls) => Error::connection(host, port, "Tls", tls.to_string()),
        other => Error::transport(CHANNEL, other.to_string()),
    }
}

/// Event that completes a publish at the given QoS
fn publish_completed(qos: Qos, event: &Event) -> bool {
    match qos {
        Qos::AtMostOnce => matches!(event, Event::Outgoing(Outgoing::Publish(_))),
        Qos::AtLeastOnce => matches!(event, Event::Incoming(Packet::PubAck(_))),
        Qos::ExactlyOnce => matches!(event, Event::Incoming(Packet::PubComp(_))),
    }
}

#[async_trait]
impl ChannelConnector for MqttConnector {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Mqtt
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChannelSession>> {
        let (client, eventloop) = AsyncClient::new(mqtt_options(endpoint), CLIENT_CAPACITY);

        let mut session = MqttSession {
            client,
            eventloop: Some(eventloop),
            endpoint: endpoint.clone(),
            timeout: self.timeout,
        };

        session
            .poll_until(|event| matches!(event, Event::Incoming(Packet::ConnAck(_))))
            .await?;

        tracing::debug!("Connected to MQTT broker {}:{}", endpoint.host, endpoint.port);
        Ok(Box::new(session))
    }
}

/// One broker connection
pub struct MqttSession {
    client: AsyncClient,
    eventloop: Option<EventLoop>,
    endpoint: Endpoint,
    timeout: Duration,
}

impl MqttSession {
    /// Drive the event loop until `done` matches an event
    async fn poll_until(&mut self, done: impl Fn(&Event) -> bool + Send) -> Result<()> {
        let Self {
            eventloop,
            endpoint,
            timeout,
            ..
        } = self;

        let eventloop = eventloop
            .as_mut()
            .ok_or_else(|| Error::transport(CHANNEL, "MQTT session already closed"))?;

        loop {
            let event = tokio::time::timeout(*timeout, eventloop.poll())
                .await
                .map_err(|_| {
                    Error::connection(
                        endpoint.host.clone(),
                        endpoint.port,
                        "TimedOut",
                        "No response from MQTT broker",
                    )
                })?
                .map_err(|e| classify(&e, endpoint))?;

            tracing::trace!("MQTT event: {:?}", event);

            if done(&event) {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl ChannelSession for MqttSession {
    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        let OutboundMessage::Publish(publish) = message else {
            return Err(Error::transport(CHANNEL, "MQTT session can only publish"));
        };

        self.client
            .publish(
                publish.topic.clone(),
                to_rumqttc_qos(publish.qos),
                publish.retain,
                publish.payload.clone().into_bytes(),
            )
            .await
            .map_err(|e| Error::transport(CHANNEL, e.to_string()))?;

        let qos = publish.qos;
        self.poll_until(move |event| publish_completed(qos, event))
            .await?;

        tracing::debug!("Published to MQTT topic {}", publish.topic);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.eventloop.is_none() {
            return Ok(());
        }

        self.client
            .disconnect()
            .await
            .map_err(|e| Error::transport(CHANNEL, e.to_string()))?;

        let result = self
            .poll_until(|event| matches!(event, Event::Outgoing(Outgoing::Disconnect)))
            .await;
        self.eventloop = None;
        result
    }

    fn abort(&mut self) {
        if self.eventloop.take().is_some() {
            tracing::debug!("Dropped MQTT connection to {}", self.endpoint.host);
        }
    }
}

/// Register the MQTT channel with a plugin registry
pub fn register(registry: &PluginRegistry) {
    registry.register_channel(Arc::new(MqttConnector::new()));
}
