//! Configuration types for the ground station system
//!
//! [`GroundStationConfig`] is the serializable seed for a
//! [`ConfigurationStore`](crate::settings::ConfigurationStore). Once a store
//! exists, the store is the source of truth and these structs are no longer
//! consulted.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main ground station configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundStationConfig {
    /// SMTP channel settings
    #[serde(default)]
    pub email: EmailConfig,

    /// MQTT broker channel settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// PWI3 telescope controller endpoint
    #[serde(default)]
    pub pwi3: Pwi3Config,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl GroundStationConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a JSON document
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }
}

/// SMTP channel configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender address placed in the `From` header
    #[serde(default)]
    pub from_address: String,

    /// Comma-separated recipients used when a trigger is created
    #[serde(default)]
    pub default_recipients: String,

    /// SMTP server host name
    #[serde(default)]
    pub host: String,

    /// SMTP server port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// SMTP username (empty disables authentication)
    #[serde(default)]
    pub username: String,

    /// SMTP password (empty disables authentication)
    #[serde(default)]
    pub password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: String::new(),
            default_recipients: String::new(),
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("from_address", &self.from_address)
            .field("default_recipients", &self.default_recipients)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// MQTT broker channel configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or IP
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Wrap the connection in TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Broker username (empty disables credentials)
    #[serde(default)]
    pub username: String,

    /// Broker password
    #[serde(default)]
    pub password: String,

    /// MQTT client identifier
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,

    /// Topic used when a trigger or publish instruction is created
    #[serde(default)]
    pub default_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mqtt_port(),
            use_tls: false,
            username: String::new(),
            password: String::new(),
            client_id: default_mqtt_client_id(),
            default_topic: String::new(),
        }
    }
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .field("client_id", &self.client_id)
            .field("default_topic", &self.default_topic)
            .finish()
    }
}

/// PWI3 telescope controller endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pwi3Config {
    /// Controller IP address or host name
    #[serde(default = "default_pwi3_address")]
    pub address: String,

    /// Controller HTTP port
    #[serde(default = "default_pwi3_port")]
    pub port: u16,

    /// Client identifier sent with every request
    #[serde(default)]
    pub client_id: String,
}

impl Default for Pwi3Config {
    fn default() -> Self {
        Self {
            address: default_pwi3_address(),
            port: default_pwi3_port(),
            client_id: String::new(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "groundstation".to_string()
}

fn default_pwi3_address() -> String {
    "127.0.0.1".to_string()
}

fn default_pwi3_port() -> u16 {
    8080
}

fn default_event_channel_capacity() -> usize {
    100
}
