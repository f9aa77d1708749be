//! Test doubles and common utilities for contract tests
//!
//! These doubles record what the core asks of its adapters without doing
//! any network I/O.

#![allow(dead_code)]

use async_trait::async_trait;
use groundstation_core::error::{Error, Result};
use groundstation_core::traits::{
    ChannelConnector, ChannelKind, ChannelSession, Credentials, DeviceEndpoint, Endpoint,
    MirrorProbe, MirrorReport, OutboundMessage, SensorInfo, TemperatureSensor,
};
use groundstation_core::{ConfigurationStore, GroundStationConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made against a recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Connect(Endpoint),
    Authenticate(Credentials),
    Send(OutboundMessage),
    Disconnect,
    Abort,
}

/// Protocol stage a connector can be told to fail or stall at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Authenticate,
    Send,
    Disconnect,
}

/// How a stage misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Socket-level failure
    Refused,
    /// Credentials rejected
    Rejected,
    /// Unclassified transport failure
    Broken,
    /// Never completes
    Stall,
}

#[derive(Default)]
struct Script {
    stage: Option<(Stage, Fault)>,
}

/// A connector that records every protocol step
#[derive(Clone)]
pub struct RecordingConnector {
    kind: ChannelKind,
    steps: Arc<Mutex<Vec<Step>>>,
    script: Arc<Mutex<Script>>,
}

impl RecordingConnector {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            steps: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Make `stage` misbehave on every subsequent delivery
    pub fn fail_at(&self, stage: Stage, fault: Fault) {
        self.script.lock().unwrap().stage = Some((stage, fault));
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    /// Messages handed to `send`
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.steps()
            .into_iter()
            .filter_map(|s| match s {
                Step::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Endpoints handed to `connect`
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.steps()
            .into_iter()
            .filter_map(|s| match s {
                Step::Connect(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn fault_for(&self, stage: Stage) -> Option<Fault> {
        match self.script.lock().unwrap().stage {
            Some((s, fault)) if s == stage => Some(fault),
            _ => None,
        }
    }
}

async fn misbehave(fault: Fault, endpoint: &Endpoint, channel: ChannelKind) -> Error {
    match fault {
        Fault::Refused => Error::connection(
            endpoint.host.clone(),
            endpoint.port,
            "ConnectionRefused",
            "connection refused",
        ),
        Fault::Rejected => Error::auth(
            endpoint
                .credentials
                .as_ref()
                .map(|c| c.username.clone())
                .unwrap_or_default(),
            endpoint.host.clone(),
            endpoint.port,
        ),
        Fault::Broken => Error::transport(channel.as_str(), "broken pipe"),
        Fault::Stall => {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            Error::transport(channel.as_str(), "stalled")
        }
    }
}

#[async_trait]
impl ChannelConnector for RecordingConnector {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChannelSession>> {
        self.steps
            .lock()
            .unwrap()
            .push(Step::Connect(endpoint.clone()));

        if let Some(fault) = self.fault_for(Stage::Connect) {
            return Err(misbehave(fault, endpoint, self.kind).await);
        }

        Ok(Box::new(RecordingSession {
            connector: self.clone(),
            endpoint: endpoint.clone(),
        }))
    }
}

struct RecordingSession {
    connector: RecordingConnector,
    endpoint: Endpoint,
}

impl RecordingSession {
    fn record(&self, step: Step) {
        self.connector.steps.lock().unwrap().push(step);
    }

    async fn check(&self, stage: Stage) -> Result<()> {
        match self.connector.fault_for(stage) {
            Some(fault) => Err(misbehave(fault, &self.endpoint, self.connector.kind).await),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChannelSession for RecordingSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.record(Step::Authenticate(credentials.clone()));
        self.check(Stage::Authenticate).await
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        self.record(Step::Send(message.clone()));
        self.check(Stage::Send).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.record(Step::Disconnect);
        self.check(Stage::Disconnect).await
    }

    fn abort(&mut self) {
        self.record(Step::Abort);
    }
}

/// A probe that replays scripted reports and counts requests
///
/// After the script runs out, the last report repeats.
pub struct ScriptedProbe {
    reports: Mutex<Vec<MirrorReport>>,
    last: Mutex<MirrorReport>,
    calls: AtomicUsize,
    endpoints: Mutex<Vec<DeviceEndpoint>>,
}

impl ScriptedProbe {
    pub fn new(reports: Vec<MirrorReport>) -> Arc<Self> {
        let mut reports = reports;
        reports.reverse();
        Arc::new(Self {
            reports: Mutex::new(reports),
            last: Mutex::new(MirrorReport::default()),
            calls: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
        })
    }

    /// Same report forever
    pub fn constant(report: MirrorReport) -> Arc<Self> {
        Self::new(vec![report])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<DeviceEndpoint> {
        self.endpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl MirrorProbe for ScriptedProbe {
    async fn sample(&self, endpoint: &DeviceEndpoint) -> Result<MirrorReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.clone());

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.reports.lock().unwrap().pop() {
            *last = next;
        }
        Ok(*last)
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// A probe whose every request fails
pub struct FailingProbe;

#[async_trait]
impl MirrorProbe for FailingProbe {
    async fn sample(&self, endpoint: &DeviceEndpoint) -> Result<MirrorReport> {
        Err(Error::connection(
            endpoint.host.clone(),
            endpoint.port,
            "ConnectionRefused",
            "connection refused",
        ))
    }

    fn probe_name(&self) -> &'static str {
        "failing"
    }
}

/// A sensor with a fixed reading
pub struct FixedSensor(pub SensorInfo);

impl TemperatureSensor for FixedSensor {
    fn info(&self) -> SensorInfo {
        self.0
    }
}

/// Mirror report with delta-T ambient only
pub fn delta_t_report(primary: f64, ambient: f64) -> MirrorReport {
    MirrorReport {
        primary: Some(primary),
        delta_t_ambient: Some(ambient),
        efa_ambient: None,
    }
}

/// Store with a complete SMTP section
pub fn email_store() -> Arc<ConfigurationStore> {
    let mut config = GroundStationConfig::default();
    config.email.from_address = "scope@example.org".to_string();
    config.email.default_recipients = "observer@example.org".to_string();
    config.email.host = "mail.example.org".to_string();
    config.email.port = 587;
    Arc::new(ConfigurationStore::from_config(&config))
}

/// Store with a complete MQTT section
pub fn mqtt_store() -> Arc<ConfigurationStore> {
    let mut config = GroundStationConfig::default();
    config.mqtt.host = "broker.local".to_string();
    config.mqtt.port = 1883;
    config.mqtt.client_id = "groundstation".to_string();
    config.mqtt.default_topic = "observatory/failures".to_string();
    Arc::new(ConfigurationStore::from_config(&config))
}
