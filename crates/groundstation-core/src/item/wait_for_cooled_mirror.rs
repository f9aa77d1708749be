// # Wait For Cooled Mirror
//
// Blocks sequence progress until the primary mirror has cooled to within
// `max_ambient_delta_t` degrees of the selected ambient temperature.
//
// ## Poll loop
//
// ```text
//            ┌──────────── not yet ────────────┐
//            ▼                                 │
//   sample controller ──▶ evaluate ──▶ sleep poll_interval
//            │                │
//        cancelled         satisfied ──▶ Ok(())
//            ▼
//     Err(Cancelled)
// ```
//
// Both the request and the sleep race the cancellation token. There is no
// iteration cap: the loop ends only when satisfied, cancelled or the probe
// fails.

use crate::dispatch::cancellable;
use crate::error::Result;
use crate::settings::{ConfigurationStore, LiveSettings, Pwi3Settings};
use crate::traits::{
    DeviceEndpoint, ItemMetadata, MirrorProbe, MirrorReport, SensorInfo, SensorRole,
    SequenceItem, TemperatureSensor, Validatable, PLANEWAVE_CATEGORY,
};
use crate::validation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default interval between controller requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default allowed mirror-over-ambient difference, degrees C
pub const DEFAULT_MAX_AMBIENT_DELTA_T: f64 = 3.0;

/// Where the ambient temperature is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbientTempSource {
    /// Ambient sensor of the mirror delta-T heater controller
    #[default]
    DeltaT,
    /// Ambient sensor of the electronic focus accessory
    Efa,
    /// Connected focuser's temperature
    Focuser,
    /// Connected weather source's temperature
    WeatherSource,
}

impl std::fmt::Display for AmbientTempSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AmbientTempSource::DeltaT => "Delta T",
            AmbientTempSource::Efa => "EFA",
            AmbientTempSource::Focuser => "Focuser",
            AmbientTempSource::WeatherSource => "Weather Source",
        };
        f.write_str(s)
    }
}

/// Poller state after one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    /// Terminal
    Satisfied,
}

/// Condition-polling wait instruction
pub struct WaitForCooledMirror {
    metadata: ItemMetadata,
    ambient_source: AmbientTempSource,
    max_ambient_delta_t: f64,
    poll_interval: Duration,
    settings: LiveSettings<Pwi3Settings>,
    probe: Arc<dyn MirrorProbe>,
    focuser: Option<Arc<dyn TemperatureSensor>>,
    weather: Option<Arc<dyn TemperatureSensor>>,
    issues: Vec<String>,
}

impl WaitForCooledMirror {
    /// Registry kind identifier
    pub const KIND: &'static str = "wait_for_cooled_mirror";

    pub fn new(store: &Arc<ConfigurationStore>, probe: Arc<dyn MirrorProbe>) -> Self {
        Self {
            metadata: ItemMetadata::new(
                "Wait For Cooled Mirror",
                "When reached, this instruction does not exit until the primary mirror's temperature is within the specified difference from ambient",
                PLANEWAVE_CATEGORY,
                "ThermometerSVG",
            ),
            ambient_source: AmbientTempSource::default(),
            max_ambient_delta_t: DEFAULT_MAX_AMBIENT_DELTA_T,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settings: LiveSettings::attach(store),
            probe,
            focuser: None,
            weather: None,
            issues: Vec::new(),
        }
    }

    pub fn with_focuser(mut self, focuser: Arc<dyn TemperatureSensor>) -> Self {
        self.focuser = Some(focuser);
        self
    }

    pub fn with_weather_source(mut self, weather: Arc<dyn TemperatureSensor>) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn ambient_source(&self) -> AmbientTempSource {
        self.ambient_source
    }

    pub fn set_ambient_source(&mut self, source: AmbientTempSource) {
        self.ambient_source = source;
    }

    pub fn max_ambient_delta_t(&self) -> f64 {
        self.max_ambient_delta_t
    }

    pub fn set_max_ambient_delta_t(&mut self, delta: f64) {
        self.max_ambient_delta_t = delta;
    }

    fn sensor_info(&self, role: SensorRole) -> SensorInfo {
        let sensor = match role {
            SensorRole::Focuser => self.focuser.as_ref(),
            SensorRole::Weather => self.weather.as_ref(),
        };
        sensor.map(|s| s.info()).unwrap_or_else(SensorInfo::disconnected)
    }

    /// Ambient temperature for the selected source, if available
    fn ambient(&self, report: &MirrorReport) -> Option<f64> {
        let value = match self.ambient_source {
            AmbientTempSource::DeltaT => report.delta_t_ambient,
            AmbientTempSource::Efa => report.efa_ambient,
            AmbientTempSource::Focuser => Some(self.sensor_info(SensorRole::Focuser).temperature),
            AmbientTempSource::WeatherSource => {
                Some(self.sensor_info(SensorRole::Weather).temperature)
            }
        };
        value.filter(|t| t.is_finite())
    }

    /// Evaluate one controller report
    ///
    /// Satisfied when `primary - ambient <= max_ambient_delta_t`. Missing or
    /// non-finite readings keep the poller waiting.
    pub fn evaluate(&self, report: &MirrorReport) -> PollState {
        let primary = report.primary.filter(|t| t.is_finite());

        match (primary, self.ambient(report)) {
            (Some(primary), Some(ambient)) => {
                let delta = primary - ambient;
                debug!(
                    "Primary {:.2}C, ambient ({}) {:.2}C, delta {:.2}C, limit {:.2}C",
                    primary, self.ambient_source, ambient, delta, self.max_ambient_delta_t
                );
                if delta <= self.max_ambient_delta_t {
                    PollState::Satisfied
                } else {
                    PollState::Polling
                }
            }
            _ => {
                debug!("Mirror or ambient ({}) temperature not available", self.ambient_source);
                PollState::Polling
            }
        }
    }

    fn device_endpoint(&self) -> DeviceEndpoint {
        let settings = self.settings.snapshot();
        DeviceEndpoint {
            host: settings.address,
            port: settings.port,
            client_id: settings.client_id,
        }
    }
}

impl Validatable for WaitForCooledMirror {
    fn validate(&mut self) -> bool {
        let mut issues = validation::threshold_issues(self.max_ambient_delta_t);
        issues.extend(match self.ambient_source {
            AmbientTempSource::Focuser => {
                validation::sensor_issues(SensorRole::Focuser, &self.sensor_info(SensorRole::Focuser))
            }
            AmbientTempSource::WeatherSource => {
                validation::sensor_issues(SensorRole::Weather, &self.sensor_info(SensorRole::Weather))
            }
            AmbientTempSource::DeltaT | AmbientTempSource::Efa => Vec::new(),
        });
        self.issues = issues;
        self.issues.is_empty()
    }

    fn issues(&self) -> &[String] {
        &self.issues
    }
}

#[async_trait]
impl SequenceItem for WaitForCooledMirror {
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
        info!(
            "Waiting for primary mirror to cool within {:.1}C of {} ambient",
            self.max_ambient_delta_t, self.ambient_source
        );

        loop {
            // Endpoint re-read each iteration so settings changes apply
            let endpoint = self.device_endpoint();
            let report = cancellable(cancel, self.probe.sample(&endpoint)).await?;

            if self.evaluate(&report) == PollState::Satisfied {
                info!("Primary mirror has cooled");
                return Ok(());
            }

            cancellable(cancel, async {
                tokio::time::sleep(self.poll_interval).await;
                Ok(())
            })
            .await?;
        }
    }

    fn clone_boxed(&self) -> Box<dyn SequenceItem> {
        Box::new(self.clone())
    }
}

impl Clone for WaitForCooledMirror {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            ambient_source: self.ambient_source,
            max_ambient_delta_t: self.max_ambient_delta_t,
            poll_interval: self.poll_interval,
            settings: self.settings.clone(),
            probe: self.probe.clone(),
            focuser: self.focuser.clone(),
            weather: self.weather.clone(),
            issues: Vec::new(),
        }
    }
}

impl std::fmt::Display for WaitForCooledMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Category: {}, Item: WaitForCooledMirror", self.metadata.category)
    }
}
