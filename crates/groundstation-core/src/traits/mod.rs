//! Core traits for the ground station system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ChannelConnector`] / [`ChannelSession`]: Notification transports
//! - [`MirrorProbe`] / [`TemperatureSensor`]: Device telemetry
//! - [`SequenceTrigger`] / [`SequenceItem`]: Plugins driven by the host sequencer

pub mod channel;
pub mod sequence;
pub mod telemetry;

pub use channel::{
    ChannelConnector, ChannelKind, ChannelSession, Credentials, Endpoint, MailMessage,
    OutboundMessage, PublishMessage, Qos, TransportSecurity,
};
pub use sequence::{
    ItemMetadata, SequenceItem, SequenceTrigger, Validatable, GROUND_STATION_CATEGORY,
    PLANEWAVE_CATEGORY,
};
pub use telemetry::{
    DeviceEndpoint, MirrorProbe, MirrorReport, SensorInfo, SensorRole, TemperatureSensor,
};
