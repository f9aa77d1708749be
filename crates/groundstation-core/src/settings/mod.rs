//! Configuration store with live change notification
//!
//! The [`ConfigurationStore`] owns every channel setting (SMTP, MQTT, PWI3).
//! Trigger and instruction instances never read it directly on the hot path:
//! they hold a [`LiveSettings`] snapshot which the store refreshes through a
//! keyed subscription whenever a setting changes.
//!
//! ## Subscriptions
//!
//! - [`ConfigurationStore::subscribe`] registers a callback for a set of keys
//!   and returns a [`Subscription`] guard. Dropping the guard unsubscribes.
//! - [`ConfigurationStore::watch`] returns a stream of every change, for
//!   hosts that want to re-run validation when configuration changes.
//!
//! Callbacks are invoked after the store lock is released, on the thread
//! that performed the [`ConfigurationStore::set`].

pub mod live;
pub mod secret;

pub use live::{EmailSettings, LiveSettings, MqttSettings, Pwi3Settings, SettingsSnapshot};
pub use secret::{PlainTextCodec, SealedSecret, SecretCodec};

use crate::config::GroundStationConfig;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Capacity of the change broadcast used by [`ConfigurationStore::watch`]
const CHANGE_BROADCAST_CAPACITY: usize = 64;

/// Name of a single setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    SmtpFromAddress,
    SmtpDefaultRecipients,
    SmtpHostName,
    SmtpHostPort,
    SmtpUsername,
    SmtpPassword,
    MqttBrokerHost,
    MqttBrokerPort,
    MqttBrokerUseTls,
    MqttUsername,
    MqttPassword,
    MqttClientId,
    MqttDefaultTopic,
    Pwi3IpAddress,
    Pwi3Port,
    Pwi3ClientId,
}

/// Value type a setting accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Port,
    Flag,
    Secret,
}

impl SettingKey {
    /// Every known setting
    pub const ALL: &'static [SettingKey] = &[
        SettingKey::SmtpFromAddress,
        SettingKey::SmtpDefaultRecipients,
        SettingKey::SmtpHostName,
        SettingKey::SmtpHostPort,
        SettingKey::SmtpUsername,
        SettingKey::SmtpPassword,
        SettingKey::MqttBrokerHost,
        SettingKey::MqttBrokerPort,
        SettingKey::MqttBrokerUseTls,
        SettingKey::MqttUsername,
        SettingKey::MqttPassword,
        SettingKey::MqttClientId,
        SettingKey::MqttDefaultTopic,
        SettingKey::Pwi3IpAddress,
        SettingKey::Pwi3Port,
        SettingKey::Pwi3ClientId,
    ];

    /// Stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::SmtpFromAddress => "smtp_from_address",
            SettingKey::SmtpDefaultRecipients => "smtp_default_recipients",
            SettingKey::SmtpHostName => "smtp_host_name",
            SettingKey::SmtpHostPort => "smtp_host_port",
            SettingKey::SmtpUsername => "smtp_username",
            SettingKey::SmtpPassword => "smtp_password",
            SettingKey::MqttBrokerHost => "mqtt_broker_host",
            SettingKey::MqttBrokerPort => "mqtt_broker_port",
            SettingKey::MqttBrokerUseTls => "mqtt_broker_use_tls",
            SettingKey::MqttUsername => "mqtt_username",
            SettingKey::MqttPassword => "mqtt_password",
            SettingKey::MqttClientId => "mqtt_client_id",
            SettingKey::MqttDefaultTopic => "mqtt_default_topic",
            SettingKey::Pwi3IpAddress => "pwi3_ip_address",
            SettingKey::Pwi3Port => "pwi3_port",
            SettingKey::Pwi3ClientId => "pwi3_client_id",
        }
    }

    /// Value type this setting accepts
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingKey::SmtpHostPort | SettingKey::MqttBrokerPort | SettingKey::Pwi3Port => {
                SettingKind::Port
            }
            SettingKey::MqttBrokerUseTls => SettingKind::Flag,
            SettingKey::SmtpPassword | SettingKey::MqttUsername | SettingKey::MqttPassword => {
                SettingKind::Secret
            }
            _ => SettingKind::Text,
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::config(format!("Unknown setting: {}", s)))
    }
}

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Port(u16),
    Flag(bool),
    Secret(SealedSecret),
}

impl SettingValue {
    /// Value type of this value
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Text(_) => SettingKind::Text,
            SettingValue::Port(_) => SettingKind::Port,
            SettingValue::Flag(_) => SettingKind::Flag,
            SettingValue::Secret(_) => SettingKind::Secret,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<u16> {
        match self {
            SettingValue::Port(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SettingValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&SealedSecret> {
        match self {
            SettingValue::Secret(s) => Some(s),
            _ => None,
        }
    }
}

/// A change applied to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    /// Setting that changed
    pub key: SettingKey,
    /// New value
    pub value: SettingValue,
}

type Observer = Arc<dyn Fn(SettingKey, &SettingValue) + Send + Sync>;

struct ObserverEntry {
    keys: Vec<SettingKey>,
    callback: Observer,
}

/// Live configuration store
///
/// Holds the current value of every [`SettingKey`]. Values are type-checked
/// on write; writing the value already stored is a no-op and does not
/// notify.
pub struct ConfigurationStore {
    values: RwLock<HashMap<SettingKey, SettingValue>>,
    /// Keyed by subscription id, so callbacks run in subscription order
    observers: RwLock<BTreeMap<u64, ObserverEntry>>,
    next_observer_id: AtomicU64,
    changes: broadcast::Sender<SettingChange>,
    codec: Arc<dyn SecretCodec>,
}

impl ConfigurationStore {
    /// Create a store holding default values
    pub fn new() -> Self {
        Self::from_config(&GroundStationConfig::default())
    }

    /// Create a store seeded from a configuration, storing secrets as-is
    pub fn from_config(config: &GroundStationConfig) -> Self {
        let values = seed_values(config, |plain| SealedSecret::from_sealed(plain));
        Self::with_values(values, Arc::new(PlainTextCodec))
    }

    /// Create a store seeded from a configuration, sealing secrets with `codec`
    pub fn with_codec(
        config: &GroundStationConfig,
        codec: Arc<dyn SecretCodec>,
    ) -> Result<Self> {
        let mut sealing_error = None;
        let values = seed_values(config, |plain| {
            SealedSecret::seal(codec.as_ref(), plain).unwrap_or_else(|e| {
                sealing_error.get_or_insert(e);
                SealedSecret::default()
            })
        });

        if let Some(e) = sealing_error {
            return Err(e);
        }

        Ok(Self::with_values(values, codec))
    }

    fn with_values(values: HashMap<SettingKey, SettingValue>, codec: Arc<dyn SecretCodec>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BROADCAST_CAPACITY);
        Self {
            values: RwLock::new(values),
            observers: RwLock::new(BTreeMap::new()),
            next_observer_id: AtomicU64::new(1),
            changes,
            codec,
        }
    }

    /// Codec used to open sealed secrets
    pub fn codec(&self) -> &dyn SecretCodec {
        self.codec.as_ref()
    }

    /// Current value of a setting
    pub fn get(&self, key: SettingKey) -> SettingValue {
        self.values
            .read()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| empty_value(key.kind()))
    }

    /// Current text value (empty for non-text settings)
    pub fn text(&self, key: SettingKey) -> String {
        self.get(key).as_text().unwrap_or_default().to_string()
    }

    /// Current port value (0 for non-port settings)
    pub fn port(&self, key: SettingKey) -> u16 {
        self.get(key).as_port().unwrap_or_default()
    }

    /// Current flag value (false for non-flag settings)
    pub fn flag(&self, key: SettingKey) -> bool {
        self.get(key).as_flag().unwrap_or_default()
    }

    /// Current sealed secret (empty for non-secret settings)
    pub fn secret(&self, key: SettingKey) -> SealedSecret {
        self.get(key).as_secret().cloned().unwrap_or_default()
    }

    /// Write a setting and notify observers of that key
    ///
    /// Returns `Ok(true)` if the stored value changed.
    pub fn set(&self, key: SettingKey, value: SettingValue) -> Result<bool> {
        if value.kind() != key.kind() {
            return Err(Error::config(format!(
                "Setting {} expects a {:?} value, got {:?}",
                key,
                key.kind(),
                value.kind()
            )));
        }

        {
            let mut values = self.values.write();
            if values.get(&key) == Some(&value) {
                return Ok(false);
            }
            values.insert(key, value.clone());
        }

        tracing::debug!("Setting {} changed", key);

        let callbacks: Vec<Observer> = self
            .observers
            .read()
            .values()
            .filter(|entry| entry.keys.contains(&key))
            .map(|entry| entry.callback.clone())
            .collect();

        for callback in callbacks {
            callback(key, &value);
        }

        // No receivers is fine
        let _ = self.changes.send(SettingChange { key, value });

        Ok(true)
    }

    /// Seal a plaintext secret with the store codec and write it
    pub fn set_secret(&self, key: SettingKey, plaintext: &str) -> Result<bool> {
        let sealed = SealedSecret::seal(self.codec(), plaintext)?;
        self.set(key, SettingValue::Secret(sealed))
    }

    /// Register a callback for changes to any of `keys`
    ///
    /// The returned guard keeps the subscription alive; dropping it
    /// unsubscribes.
    pub fn subscribe<F>(self: &Arc<Self>, keys: &[SettingKey], callback: F) -> Subscription
    where
        F: Fn(SettingKey, &SettingValue) + Send + Sync + 'static,
    {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().insert(
            id,
            ObserverEntry {
                keys: keys.to_vec(),
                callback: Arc::new(callback),
            },
        );

        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.observers.write().remove(&id);
    }

    /// Number of live subscriptions
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Stream of every change applied after this call
    ///
    /// A consumer that falls behind by more than the broadcast capacity
    /// silently skips the missed changes.
    pub fn watch(&self) -> Pin<Box<dyn Stream<Item = SettingChange> + Send + 'static>> {
        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(|msg| msg.ok());
        Box::pin(stream)
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("settings", &self.values.read().len())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Guard for a keyed subscription; unsubscribes on drop
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<ConfigurationStore>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

fn empty_value(kind: SettingKind) -> SettingValue {
    match kind {
        SettingKind::Text => SettingValue::Text(String::new()),
        SettingKind::Port => SettingValue::Port(0),
        SettingKind::Flag => SettingValue::Flag(false),
        SettingKind::Secret => SettingValue::Secret(SealedSecret::default()),
    }
}

fn seed_values(
    config: &GroundStationConfig,
    mut seal: impl FnMut(&str) -> SealedSecret,
) -> HashMap<SettingKey, SettingValue> {
    use SettingValue::{Flag, Port, Secret, Text};

    let email = &config.email;
    let mqtt = &config.mqtt;
    let pwi3 = &config.pwi3;

    HashMap::from([
        (SettingKey::SmtpFromAddress, Text(email.from_address.clone())),
        (SettingKey::SmtpDefaultRecipients, Text(email.default_recipients.clone())),
        (SettingKey::SmtpHostName, Text(email.host.clone())),
        (SettingKey::SmtpHostPort, Port(email.port)),
        (SettingKey::SmtpUsername, Text(email.username.clone())),
        (SettingKey::SmtpPassword, Secret(seal(&email.password))),
        (SettingKey::MqttBrokerHost, Text(mqtt.host.clone())),
        (SettingKey::MqttBrokerPort, Port(mqtt.port)),
        (SettingKey::MqttBrokerUseTls, Flag(mqtt.use_tls)),
        (SettingKey::MqttUsername, Secret(seal(&mqtt.username))),
        (SettingKey::MqttPassword, Secret(seal(&mqtt.password))),
        (SettingKey::MqttClientId, Text(mqtt.client_id.clone())),
        (SettingKey::MqttDefaultTopic, Text(mqtt.default_topic.clone())),
        (SettingKey::Pwi3IpAddress, Text(pwi3.address.clone())),
        (SettingKey::Pwi3Port, Port(pwi3.port)),
        (SettingKey::Pwi3ClientId, Text(pwi3.client_id.clone())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn keys_round_trip_through_strings() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), *key);
        }
        assert!("smtp_nope".parse::<SettingKey>().is_err());
    }

    #[test]
    fn seeded_from_config() {
        let mut config = GroundStationConfig::default();
        config.mqtt.host = "broker.local".to_string();
        config.email.password = "pw".to_string();

        let store = ConfigurationStore::from_config(&config);
        assert_eq!(store.text(SettingKey::MqttBrokerHost), "broker.local");
        assert_eq!(store.port(SettingKey::SmtpHostPort), 587);
        assert_eq!(
            store.secret(SettingKey::SmtpPassword).open(store.codec()).unwrap(),
            "pw"
        );
    }

    #[test]
    fn set_rejects_wrong_kind() {
        let store = ConfigurationStore::new();
        let err = store
            .set(SettingKey::MqttBrokerPort, SettingValue::Text("1883".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unchanged_value_does_not_notify() {
        let store = Arc::new(ConfigurationStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = store.subscribe(&[SettingKey::MqttBrokerPort], move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!store.set(SettingKey::MqttBrokerPort, SettingValue::Port(1883)).unwrap());
        assert!(store.set(SettingKey::MqttBrokerPort, SettingValue::Port(8883)).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_subscribed_keys_notify() {
        let store = Arc::new(ConfigurationStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = store.subscribe(&[SettingKey::SmtpHostName], move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store
            .set(SettingKey::MqttBrokerHost, SettingValue::Text("b".into()))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store
            .set(SettingKey::SmtpHostName, SettingValue::Text("m".into()))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let store = Arc::new(ConfigurationStore::new());
        let sub = store.subscribe(&[SettingKey::SmtpHostName], |_, _| {});
        assert_eq!(store.observer_count(), 1);
        drop(sub);
        assert_eq!(store.observer_count(), 0);
    }

    #[tokio::test]
    async fn watch_streams_changes() {
        let store = ConfigurationStore::new();
        let mut changes = store.watch();

        store
            .set(SettingKey::MqttDefaultTopic, SettingValue::Text("obs".into()))
            .unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.key, SettingKey::MqttDefaultTopic);
        assert_eq!(change.value, SettingValue::Text("obs".into()));
    }
}
