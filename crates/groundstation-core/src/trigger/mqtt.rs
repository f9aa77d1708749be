// # Failures to MQTT
//
// Publishes a JSON failure report to an MQTT broker topic when a sequence
// instruction fails. The report is published exactly-once and retained so
// late subscribers still see the most recent failure.

use super::FailureWatch;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::instruction::InstructionOutcome;
use crate::payload::FailureReport;
use crate::settings::{ConfigurationStore, LiveSettings, MqttSettings, SecretCodec};
use crate::traits::{
    ChannelConnector, ChannelKind, Credentials, Endpoint, ItemMetadata, OutboundMessage,
    PublishMessage, Qos, SequenceTrigger, TransportSecurity, Validatable,
    GROUND_STATION_CATEGORY,
};
use crate::validation;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// Broker endpoint for the given settings
///
/// Credentials are attached only when the username is non-blank; both
/// halves are opened here, immediately before use.
pub(crate) fn broker_endpoint(settings: &MqttSettings, codec: &dyn SecretCodec) -> Result<Endpoint> {
    let security = if settings.use_tls {
        TransportSecurity::Tls
    } else {
        TransportSecurity::Plain
    };

    let endpoint = Endpoint::new(settings.host.clone(), settings.port)
        .with_client_id(settings.client_id.clone())
        .with_security(security);

    let username = settings.username.open(codec)?;
    if username.trim().is_empty() {
        return Ok(endpoint);
    }

    let password = settings.password.open(codec)?;
    Ok(endpoint.with_credentials(Credentials::new(username, password)))
}

/// Retained exactly-once publish
pub(crate) fn retained_publish(topic: &str, payload: String) -> OutboundMessage {
    OutboundMessage::Publish(PublishMessage {
        topic: topic.to_string(),
        payload,
        qos: Qos::ExactlyOnce,
        retain: true,
    })
}

/// Trigger that publishes a failure report to a broker
pub struct FailuresToMqtt {
    metadata: ItemMetadata,
    topic: String,
    settings: LiveSettings<MqttSettings>,
    connector: Arc<dyn ChannelConnector>,
    watch: FailureWatch,
    issues: Vec<String>,
}

impl FailuresToMqtt {
    /// Registry kind identifier
    pub const KIND: &'static str = "failures_to_mqtt";

    pub fn new(store: &Arc<ConfigurationStore>, connector: Arc<dyn ChannelConnector>) -> Self {
        let settings = LiveSettings::<MqttSettings>::attach(store);
        let topic = settings.snapshot().default_topic;

        Self {
            metadata: ItemMetadata::new(
                "Failures to MQTT",
                "Sends a JSON object to an MQTT broker and topic when a sequence instruction fails",
                GROUND_STATION_CATEGORY,
                "Mqtt_SVG",
            ),
            topic,
            settings,
            connector,
            watch: FailureWatch::new(ChannelKind::Mqtt),
            issues: Vec::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    /// Current broker settings as seen by this instance
    pub fn settings(&self) -> MqttSettings {
        self.settings.snapshot()
    }
}

impl Validatable for FailuresToMqtt {
    fn validate(&mut self) -> bool {
        self.issues = validation::broker_issues(&self.topic, &self.settings.snapshot());
        self.issues.is_empty()
    }

    fn issues(&self) -> &[String] {
        &self.issues
    }
}

#[async_trait]
impl SequenceTrigger for FailuresToMqtt {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    fn should_trigger(
        &mut self,
        previous: Option<&InstructionOutcome>,
        next: Option<&InstructionOutcome>,
    ) -> bool {
        self.watch.evaluate(previous, next)
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        let failed = self
            .watch
            .previous()
            .ok_or_else(|| Error::invalid_input("No failed instruction to report"))?;

        let report = FailureReport::from_outcome(failed).to_json()?;
        trace!("{}", report);

        let settings = self.settings.snapshot();
        let endpoint = broker_endpoint(&settings, self.settings.store().codec())?;
        let message = retained_publish(&self.topic, report);

        info!("Publishing failure of \"{}\" to {}", failed.name, self.topic);
        dispatch::deliver(self.connector.as_ref(), &endpoint, &message, cancel).await
    }

    fn clone_boxed(&self) -> Box<dyn SequenceTrigger> {
        Box::new(self.clone())
    }
}

impl Clone for FailuresToMqtt {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            topic: self.topic.clone(),
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            watch: FailureWatch::new(ChannelKind::Mqtt),
            issues: Vec::new(),
        }
    }
}

impl std::fmt::Display for FailuresToMqtt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Category: {}, Item: FailuresToMqtt", self.metadata.category)
    }
}

impl std::fmt::Debug for FailuresToMqtt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailuresToMqtt")
            .field("metadata", &self.metadata)
            .field("topic", &self.topic)
            .field("settings", &self.settings)
            .field("issues", &self.issues)
            .finish()
    }
}
