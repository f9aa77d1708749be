// # Telemetry Traits
//
// Device-side inputs for condition waits.
//
// - [`MirrorProbe`]: one request to the telescope controller's status
//   endpoint, returning mirror and ambient temperatures
// - [`TemperatureSensor`]: a connected device (focuser, weather station)
//   consulted for its temperature reading during validation
//
// ## Implementations
//
// - PWI3 HTTP status endpoint: `groundstation-pwi3` crate

use crate::error::Result;
use async_trait::async_trait;

/// Device endpoint queried by a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
    /// Sent as the `clientId` query parameter
    pub client_id: String,
}

/// Temperatures reported by the telescope controller, in degrees C
///
/// `None` means the controller did not report that value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MirrorReport {
    /// Primary mirror temperature
    pub primary: Option<f64>,
    /// Ambient temperature of the mirror delta-T sensor
    pub delta_t_ambient: Option<f64>,
    /// Ambient temperature of the electronic focus accessory
    pub efa_ambient: Option<f64>,
}

/// Samples the telescope controller once per call
#[async_trait]
pub trait MirrorProbe: Send + Sync {
    /// Issue one status request
    async fn sample(&self, endpoint: &DeviceEndpoint) -> Result<MirrorReport>;

    /// Probe name (for logging/debugging)
    fn probe_name(&self) -> &'static str;
}

/// Point-in-time reading from a temperature-capable device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorInfo {
    pub connected: bool,
    /// Degrees C; NaN when unavailable
    pub temperature: f64,
}

impl SensorInfo {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            temperature: f64::NAN,
        }
    }

    pub fn reading(temperature: f64) -> Self {
        Self {
            connected: true,
            temperature,
        }
    }
}

/// Device role consulted for an ambient temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorRole {
    Focuser,
    Weather,
}

impl SensorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorRole::Focuser => "focuser",
            SensorRole::Weather => "weather",
        }
    }
}

/// A device exposing connection state and a temperature
pub trait TemperatureSensor: Send + Sync {
    fn info(&self) -> SensorInfo;
}
