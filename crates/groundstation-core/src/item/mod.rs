//! Standalone sequence instructions
//!
//! - [`SendToMqtt`]: one-shot freeform broker publish
//! - [`WaitForCooledMirror`]: condition-polling wait on mirror temperature

pub mod send_to_mqtt;
pub mod wait_for_cooled_mirror;

pub use send_to_mqtt::SendToMqtt;
pub use wait_for_cooled_mirror::{AmbientTempSource, PollState, WaitForCooledMirror};
