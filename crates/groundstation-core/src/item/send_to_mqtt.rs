// # Send to MQTT
//
// One-shot publish of a caller-supplied payload. Same connection and
// delivery rules as the failure trigger, without any trigger evaluation.

use crate::dispatch;
use crate::error::Result;
use crate::settings::{ConfigurationStore, LiveSettings, MqttSettings};
use crate::traits::{
    ChannelConnector, ItemMetadata, SequenceItem, Validatable, GROUND_STATION_CATEGORY,
};
use crate::trigger::mqtt::{broker_endpoint, retained_publish};
use crate::validation;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Freeform broker publish instruction
pub struct SendToMqtt {
    metadata: ItemMetadata,
    topic: String,
    payload: String,
    settings: LiveSettings<MqttSettings>,
    connector: Arc<dyn ChannelConnector>,
    issues: Vec<String>,
}

impl SendToMqtt {
    /// Registry kind identifier
    pub const KIND: &'static str = "send_to_mqtt";

    pub fn new(store: &Arc<ConfigurationStore>, connector: Arc<dyn ChannelConnector>) -> Self {
        let settings = LiveSettings::<MqttSettings>::attach(store);
        let topic = settings.snapshot().default_topic;

        Self {
            metadata: ItemMetadata::new(
                "Send to MQTT",
                "Sends a free form message to a MQTT broker",
                GROUND_STATION_CATEGORY,
                "Mqtt_SVG",
            ),
            topic,
            payload: String::new(),
            settings,
            connector,
            issues: Vec::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }

    /// Builder form of [`Self::set_payload`]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

impl Validatable for SendToMqtt {
    fn validate(&mut self) -> bool {
        self.issues = validation::broker_issues(&self.topic, &self.settings.snapshot());
        self.issues.is_empty()
    }

    fn issues(&self) -> &[String] {
        &self.issues
    }
}

#[async_trait]
impl SequenceItem for SendToMqtt {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        let settings = self.settings.snapshot();
        let endpoint = broker_endpoint(&settings, self.settings.store().codec())?;
        let message = retained_publish(&self.topic, self.payload.clone());

        debug!("Pushing message to {}", self.topic);
        dispatch::deliver(self.connector.as_ref(), &endpoint, &message, cancel).await
    }

    fn clone_boxed(&self) -> Box<dyn SequenceItem> {
        Box::new(self.clone())
    }
}

impl Clone for SendToMqtt {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            issues: Vec::new(),
        }
    }
}

impl std::fmt::Display for SendToMqtt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Category: {}, Item: SendToMqtt", self.metadata.category)
    }
}
