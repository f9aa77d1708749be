//! Plugin registry
//!
//! The registry maps stable kind identifiers to trigger and item factories,
//! and holds the transport and telemetry adapters those factories wire in.
//! Nothing is selected through hard-coded branches: hosts create plugins by
//! kind, and adapter crates register themselves.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use groundstation_core::{ConfigurationStore, PluginRegistry};
//! use std::sync::Arc;
//!
//! let store = Arc::new(ConfigurationStore::new());
//! let registry = PluginRegistry::new();
//! registry.register_builtin();
//!
//! // Adapter crates
//! groundstation_smtp::register(&registry);
//! groundstation_mqtt::register(&registry);
//!
//! let trigger = registry.create_trigger("failures_to_mqtt", &store)?;
//! ```
//!
//! ## Registration
//!
//! Adapter crates register during initialization:
//!
//! ```rust,ignore
//! pub fn register(registry: &PluginRegistry) {
//!     registry.register_channel(Arc::new(SmtpConnector::new()));
//! }
//! ```

use crate::error::{Error, Result};
use crate::item::{SendToMqtt, WaitForCooledMirror};
use crate::settings::ConfigurationStore;
use crate::traits::{
    ChannelConnector, ChannelKind, MirrorProbe, SensorRole, SequenceItem, SequenceTrigger,
    TemperatureSensor,
};
use crate::trigger::{FailuresToEmail, FailuresToMqtt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// What a factory gets to build a plugin instance
pub struct PluginContext<'a> {
    /// Store the new instance subscribes to
    pub store: &'a Arc<ConfigurationStore>,
    /// Registry for resolving adapters
    pub registry: &'a PluginRegistry,
}

/// Builds trigger instances of one kind
pub trait TriggerFactory: Send + Sync {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceTrigger>>;
}

/// Builds item instances of one kind
pub trait ItemFactory: Send + Sync {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceItem>>;
}

/// Plugin registry
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Factories run with no lock held.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered channel connectors
    channels: RwLock<HashMap<ChannelKind, Arc<dyn ChannelConnector>>>,

    /// Registered trigger factories
    triggers: RwLock<HashMap<String, Arc<dyn TriggerFactory>>>,

    /// Registered item factories
    items: RwLock<HashMap<String, Arc<dyn ItemFactory>>>,

    /// Telescope controller probe
    probe: RwLock<Option<Arc<dyn MirrorProbe>>>,

    /// Temperature-capable devices by role
    sensors: RwLock<HashMap<SensorRole, Arc<dyn TemperatureSensor>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel connector, replacing any previous one of its kind
    pub fn register_channel(&self, connector: Arc<dyn ChannelConnector>) {
        self.channels.write().insert(connector.kind(), connector);
    }

    /// Register a trigger factory
    ///
    /// # Parameters
    ///
    /// - `kind`: Stable kind identifier (e.g., "failures_to_email")
    /// - `factory`: Factory object for creating trigger instances
    pub fn register_trigger(&self, kind: impl Into<String>, factory: Arc<dyn TriggerFactory>) {
        self.triggers.write().insert(kind.into(), factory);
    }

    /// Register an item factory
    pub fn register_item(&self, kind: impl Into<String>, factory: Arc<dyn ItemFactory>) {
        self.items.write().insert(kind.into(), factory);
    }

    /// Register the telescope controller probe
    pub fn register_probe(&self, probe: Arc<dyn MirrorProbe>) {
        *self.probe.write() = Some(probe);
    }

    /// Register a temperature-capable device
    pub fn register_sensor(&self, role: SensorRole, sensor: Arc<dyn TemperatureSensor>) {
        self.sensors.write().insert(role, sensor);
    }

    /// Register the factories for every built-in trigger and item kind
    pub fn register_builtin(&self) {
        self.register_trigger(FailuresToEmail::KIND, Arc::new(FailuresToEmailFactory));
        self.register_trigger(FailuresToMqtt::KIND, Arc::new(FailuresToMqttFactory));
        self.register_item(SendToMqtt::KIND, Arc::new(SendToMqttFactory));
        self.register_item(WaitForCooledMirror::KIND, Arc::new(WaitForCooledMirrorFactory));
    }

    /// Connector for a channel
    pub fn channel(&self, kind: ChannelKind) -> Result<Arc<dyn ChannelConnector>> {
        self.channels
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("No connector registered for channel: {}", kind)))
    }

    /// Telescope controller probe
    pub fn probe(&self) -> Result<Arc<dyn MirrorProbe>> {
        self.probe
            .read()
            .clone()
            .ok_or_else(|| Error::config("No telescope probe registered"))
    }

    /// Device registered for a role, if any
    pub fn sensor(&self, role: SensorRole) -> Option<Arc<dyn TemperatureSensor>> {
        self.sensors.read().get(&role).cloned()
    }

    /// Create a trigger by kind
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SequenceTrigger>)`: Created trigger, subscribed to `store`
    /// - `Err(Error)`: If the kind is not registered or creation fails
    pub fn create_trigger(
        &self,
        kind: &str,
        store: &Arc<ConfigurationStore>,
    ) -> Result<Box<dyn SequenceTrigger>> {
        let factory = self
            .triggers
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown trigger kind: {}", kind)))?;

        factory.create(&PluginContext {
            store,
            registry: self,
        })
    }

    /// Create an item by kind
    pub fn create_item(
        &self,
        kind: &str,
        store: &Arc<ConfigurationStore>,
    ) -> Result<Box<dyn SequenceItem>> {
        let factory = self
            .items
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown item kind: {}", kind)))?;

        factory.create(&PluginContext {
            store,
            registry: self,
        })
    }

    /// List all registered trigger kinds
    pub fn list_triggers(&self) -> Vec<String> {
        self.triggers.read().keys().cloned().collect()
    }

    /// List all registered item kinds
    pub fn list_items(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }

    /// List all registered channels
    pub fn list_channels(&self) -> Vec<ChannelKind> {
        self.channels.read().keys().copied().collect()
    }

    /// Check if a trigger kind is registered
    pub fn has_trigger(&self, kind: &str) -> bool {
        self.triggers.read().contains_key(kind)
    }

    /// Check if an item kind is registered
    pub fn has_item(&self, kind: &str) -> bool {
        self.items.read().contains_key(kind)
    }
}

struct FailuresToEmailFactory;

impl TriggerFactory for FailuresToEmailFactory {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceTrigger>> {
        let connector = ctx.registry.channel(ChannelKind::Email)?;
        Ok(Box::new(FailuresToEmail::new(ctx.store, connector)))
    }
}

struct FailuresToMqttFactory;

impl TriggerFactory for FailuresToMqttFactory {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceTrigger>> {
        let connector = ctx.registry.channel(ChannelKind::Mqtt)?;
        Ok(Box::new(FailuresToMqtt::new(ctx.store, connector)))
    }
}

struct SendToMqttFactory;

impl ItemFactory for SendToMqttFactory {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceItem>> {
        let connector = ctx.registry.channel(ChannelKind::Mqtt)?;
        Ok(Box::new(SendToMqtt::new(ctx.store, connector)))
    }
}

struct WaitForCooledMirrorFactory;

impl ItemFactory for WaitForCooledMirrorFactory {
    fn create(&self, ctx: &PluginContext<'_>) -> Result<Box<dyn SequenceItem>> {
        let mut item = WaitForCooledMirror::new(ctx.store, ctx.registry.probe()?);

        if let Some(focuser) = ctx.registry.sensor(SensorRole::Focuser) {
            item = item.with_focuser(focuser);
        }
        if let Some(weather) = ctx.registry.sensor(SensorRole::Weather) {
            item = item.with_weather_source(weather);
        }

        Ok(Box::new(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration() {
        let registry = PluginRegistry::new();

        // Initially empty
        assert!(!registry.has_trigger("failures_to_email"));

        registry.register_builtin();

        assert!(registry.has_trigger("failures_to_email"));
        assert!(registry.has_trigger("failures_to_mqtt"));
        assert!(registry.has_item("send_to_mqtt"));
        assert!(registry.has_item("wait_for_cooled_mirror"));
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let registry = PluginRegistry::new();
        let store = Arc::new(ConfigurationStore::new());

        let result = registry.create_trigger("failures_to_pager", &store);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_connector_is_config_error() {
        let registry = PluginRegistry::new();
        registry.register_builtin();
        let store = Arc::new(ConfigurationStore::new());

        let result = registry.create_trigger("failures_to_mqtt", &store);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
