// # groundstation-core
//
// Core library for instruction-failure notifications and condition waits.
//
// ## Architecture Overview
//
// This library provides the pieces a host sequencer plugs in:
// - **ConfigurationStore**: Channel settings with keyed live updates
// - **SequenceTrigger**: Re-evaluated after every instruction; fires on failure
// - **ChannelConnector**: One transport capability shared by email and MQTT
// - **SequenceItem**: Standalone instructions (freeform publish, cooled-mirror wait)
// - **PluginRegistry**: Kind-keyed factories for triggers and items
// - **TriggerEngine**: Optional host-side driver for a set of triggers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from transport libraries
// 2. **Plugin-Based**: Triggers, items and adapters are registered by kind
// 3. **Library-First**: All core functionality can be used as a library
// 4. **No Retry**: A failed delivery is logged once and handed back unchanged
// 5. **Cancellable**: Every network step and every poll sleep honors the caller's token

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod item;
pub mod payload;
pub mod registry;
pub mod settings;
pub mod traits;
pub mod trigger;
pub mod validation;

// Re-export core types for convenience
pub use config::{EmailConfig, EngineConfig, GroundStationConfig, MqttConfig, Pwi3Config};
pub use engine::{EngineEvent, TriggerEngine, TriggerRun};
pub use error::{Error, Result};
pub use instruction::{InstructionOutcome, InstructionStatus};
pub use item::{AmbientTempSource, PollState, SendToMqtt, WaitForCooledMirror};
pub use registry::{PluginRegistry, PluginContext};
pub use settings::{ConfigurationStore, SettingChange, SettingKey, SettingValue, Subscription};
pub use traits::{
    ChannelConnector, ChannelKind, ChannelSession, MirrorProbe, SequenceItem, SequenceTrigger,
    TemperatureSensor, Validatable,
};
pub use trigger::{FailuresToEmail, FailuresToMqtt};

// Cancellation token used throughout the public API
pub use tokio_util::sync::CancellationToken;
