// # PWI3 Telemetry Probe
//
// This crate provides the [`MirrorProbe`] for PlaneWave telescopes driven by
// PWI3. One call issues one HTTP GET against the controller's status page.
//
// ## Response Format
//
// The controller answers with one `key=value` pair per line. Only the
// temperature keys are read:
//
// - `temperature.primary`: primary mirror
// - `temperature.ambient`: ambient sensor paired with the mirror probe
// - `temperature.efa`: electronic focus accessory ambient
//
// Unknown keys, blank lines and unparseable values are ignored, so a
// controller that omits a temperature yields `None` for it.

use async_trait::async_trait;
use groundstation_core::traits::{DeviceEndpoint, MirrorProbe, MirrorReport};
use groundstation_core::{Error, PluginRegistry, Result};
use std::sync::Arc;
use std::time::Duration;

/// Default request timeout (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Status page path on the controller
const STATUS_PATH: &str = "/";

const PRIMARY_KEY: &str = "temperature.primary";
const AMBIENT_KEY: &str = "temperature.ambient";
const EFA_KEY: &str = "temperature.efa";

/// HTTP status probe for a PWI3 controller
pub struct Pwi3Probe {
    client: reqwest::Client,
}

impl Pwi3Probe {
    /// Create a probe with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

/// Status URL for an endpoint (without the query string)
pub fn status_url(endpoint: &DeviceEndpoint) -> String {
    format!("http://{}:{}{}", endpoint.host, endpoint.port, STATUS_PATH)
}

/// Parse a status page into a report
pub fn parse_status(body: &str) -> MirrorReport {
    let mut report = MirrorReport::default();

    for line in body.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let Ok(value) = value.trim().parse::<f64>() else {
            continue;
        };

        match key.trim() {
            PRIMARY_KEY => report.primary = Some(value),
            AMBIENT_KEY => report.delta_t_ambient = Some(value),
            EFA_KEY => report.efa_ambient = Some(value),
            _ => {}
        }
    }

    report
}

fn request_error(err: &reqwest::Error, endpoint: &DeviceEndpoint) -> Error {
    let code = if err.is_timeout() {
        "TimedOut"
    } else if err.is_connect() {
        "ConnectionRefused"
    } else {
        "Request"
    };

    Error::connection(endpoint.host.clone(), endpoint.port, code, err.to_string())
}

#[async_trait]
impl MirrorProbe for Pwi3Probe {
    async fn sample(&self, endpoint: &DeviceEndpoint) -> Result<MirrorReport> {
        let response = self
            .client
            .get(status_url(endpoint))
            .query(&[("clientId", endpoint.client_id.as_str())])
            .send()
            .await
            .map_err(|e| request_error(&e, endpoint))?;

        if !response.status().is_success() {
            return Err(Error::telemetry(format!(
                "PWI3 at {}:{} returned HTTP {}",
                endpoint.host,
                endpoint.port,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::telemetry(format!("Failed to read PWI3 status: {}", e)))?;

        let report = parse_status(&body);
        tracing::trace!("PWI3 status: {:?}", report);
        Ok(report)
    }

    fn probe_name(&self) -> &'static str {
        "pwi3"
    }
}

/// Register the PWI3 probe with a plugin registry
pub fn register(registry: &PluginRegistry) -> Result<()> {
    registry.register_probe(Arc::new(Pwi3Probe::new()?));
    Ok(())
}
