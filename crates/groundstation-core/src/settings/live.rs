// # Live Settings Snapshots
//
// A [`LiveSettings<T>`] is a locally cached copy of the settings one
// trigger or instruction needs, kept current by a keyed subscription on
// the [`ConfigurationStore`]. Each change only rewrites the field named by
// the changed key.
//
// `execute` paths take [`LiveSettings::snapshot`] once at call start so a
// change arriving mid-send never produces a half-updated endpoint.

use super::{ConfigurationStore, SealedSecret, SettingKey, SettingValue, Subscription};
use parking_lot::RwLock;
use std::sync::Arc;

/// A group of settings that can be loaded from and kept in sync with the store
pub trait SettingsSnapshot: Clone + Send + Sync + 'static {
    /// Keys this snapshot subscribes to
    const KEYS: &'static [SettingKey];

    /// Read every field from the store
    fn load(store: &ConfigurationStore) -> Self;

    /// Apply a single changed setting
    ///
    /// Keys outside [`Self::KEYS`] and values of the wrong kind are ignored.
    fn apply(&mut self, key: SettingKey, value: &SettingValue);
}

/// Cached settings snapshot refreshed on change
pub struct LiveSettings<T: SettingsSnapshot> {
    current: Arc<RwLock<T>>,
    store: Arc<ConfigurationStore>,
    _subscription: Subscription,
}

impl<T: SettingsSnapshot> LiveSettings<T> {
    /// Load from the store and subscribe to the snapshot's keys
    pub fn attach(store: &Arc<ConfigurationStore>) -> Self {
        let current = Arc::new(RwLock::new(T::load(store)));

        // Re-read the key on every notification: callbacks of overlapping
        // writes may arrive out of order, the store never does
        let sink = current.clone();
        let source = Arc::downgrade(store);
        let subscription = store.subscribe(T::KEYS, move |key, _| {
            if let Some(store) = source.upgrade() {
                let latest = store.get(key);
                sink.write().apply(key, &latest);
            }
        });

        // Reload so a change landing between the first load and the
        // subscription is not lost
        *current.write() = T::load(store);

        Self {
            current,
            store: store.clone(),
            _subscription: subscription,
        }
    }

    /// Stable copy of the current values
    pub fn snapshot(&self) -> T {
        self.current.read().clone()
    }

    /// Store this snapshot is attached to
    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }
}

/// Cloning re-attaches: the clone owns an independent subscription
impl<T: SettingsSnapshot> Clone for LiveSettings<T> {
    fn clone(&self) -> Self {
        Self::attach(&self.store)
    }
}

impl<T: SettingsSnapshot + std::fmt::Debug> std::fmt::Debug for LiveSettings<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LiveSettings").field(&*self.current.read()).finish()
    }
}

fn apply_text(field: &mut String, value: &SettingValue) {
    if let Some(text) = value.as_text() {
        *field = text.to_string();
    }
}

fn apply_port(field: &mut u16, value: &SettingValue) {
    if let Some(port) = value.as_port() {
        *field = port;
    }
}

fn apply_secret(field: &mut SealedSecret, value: &SettingValue) {
    if let Some(secret) = value.as_secret() {
        *field = secret.clone();
    }
}

/// SMTP settings used by the email trigger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSettings {
    pub from_address: String,
    pub default_recipients: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SealedSecret,
}

impl SettingsSnapshot for EmailSettings {
    const KEYS: &'static [SettingKey] = &[
        SettingKey::SmtpFromAddress,
        SettingKey::SmtpDefaultRecipients,
        SettingKey::SmtpHostName,
        SettingKey::SmtpHostPort,
        SettingKey::SmtpUsername,
        SettingKey::SmtpPassword,
    ];

    fn load(store: &ConfigurationStore) -> Self {
        Self {
            from_address: store.text(SettingKey::SmtpFromAddress),
            default_recipients: store.text(SettingKey::SmtpDefaultRecipients),
            host: store.text(SettingKey::SmtpHostName),
            port: store.port(SettingKey::SmtpHostPort),
            username: store.text(SettingKey::SmtpUsername),
            password: store.secret(SettingKey::SmtpPassword),
        }
    }

    fn apply(&mut self, key: SettingKey, value: &SettingValue) {
        match key {
            SettingKey::SmtpFromAddress => apply_text(&mut self.from_address, value),
            SettingKey::SmtpDefaultRecipients => apply_text(&mut self.default_recipients, value),
            SettingKey::SmtpHostName => apply_text(&mut self.host, value),
            SettingKey::SmtpHostPort => apply_port(&mut self.port, value),
            SettingKey::SmtpUsername => apply_text(&mut self.username, value),
            SettingKey::SmtpPassword => apply_secret(&mut self.password, value),
            _ => {}
        }
    }
}

/// MQTT broker settings used by the broker trigger and publish instruction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: SealedSecret,
    pub password: SealedSecret,
    pub client_id: String,
    pub default_topic: String,
}

impl SettingsSnapshot for MqttSettings {
    const KEYS: &'static [SettingKey] = &[
        SettingKey::MqttBrokerHost,
        SettingKey::MqttBrokerPort,
        SettingKey::MqttBrokerUseTls,
        SettingKey::MqttUsername,
        SettingKey::MqttPassword,
        SettingKey::MqttClientId,
        SettingKey::MqttDefaultTopic,
    ];

    fn load(store: &ConfigurationStore) -> Self {
        Self {
            host: store.text(SettingKey::MqttBrokerHost),
            port: store.port(SettingKey::MqttBrokerPort),
            use_tls: store.flag(SettingKey::MqttBrokerUseTls),
            username: store.secret(SettingKey::MqttUsername),
            password: store.secret(SettingKey::MqttPassword),
            client_id: store.text(SettingKey::MqttClientId),
            default_topic: store.text(SettingKey::MqttDefaultTopic),
        }
    }

    fn apply(&mut self, key: SettingKey, value: &SettingValue) {
        match key {
            SettingKey::MqttBrokerHost => apply_text(&mut self.host, value),
            SettingKey::MqttBrokerPort => apply_port(&mut self.port, value),
            SettingKey::MqttBrokerUseTls => {
                if let Some(flag) = value.as_flag() {
                    self.use_tls = flag;
                }
            }
            SettingKey::MqttUsername => apply_secret(&mut self.username, value),
            SettingKey::MqttPassword => apply_secret(&mut self.password, value),
            SettingKey::MqttClientId => apply_text(&mut self.client_id, value),
            SettingKey::MqttDefaultTopic => apply_text(&mut self.default_topic, value),
            _ => {}
        }
    }
}

/// PWI3 controller endpoint used by the cooled-mirror wait
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pwi3Settings {
    pub address: String,
    pub port: u16,
    pub client_id: String,
}

impl SettingsSnapshot for Pwi3Settings {
    const KEYS: &'static [SettingKey] = &[
        SettingKey::Pwi3IpAddress,
        SettingKey::Pwi3Port,
        SettingKey::Pwi3ClientId,
    ];

    fn load(store: &ConfigurationStore) -> Self {
        Self {
            address: store.text(SettingKey::Pwi3IpAddress),
            port: store.port(SettingKey::Pwi3Port),
            client_id: store.text(SettingKey::Pwi3ClientId),
        }
    }

    fn apply(&mut self, key: SettingKey, value: &SettingValue) {
        match key {
            SettingKey::Pwi3IpAddress => apply_text(&mut self.address, value),
            SettingKey::Pwi3Port => apply_port(&mut self.port, value),
            SettingKey::Pwi3ClientId => apply_text(&mut self.client_id, value),
            _ => {}
        }
    }
}
