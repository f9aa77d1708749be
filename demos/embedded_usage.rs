//! Minimal embedding example for groundstation-core
//!
//! This example plays the part of a sequencer host: it wires console
//! channels and a simulated telescope into the library, reports a failed
//! instruction through both failure triggers, publishes a freeform message
//! and waits for a cooling mirror.

use groundstation_core::traits::{
    ChannelConnector, ChannelKind, ChannelSession, Credentials, DeviceEndpoint, Endpoint,
    MirrorProbe, MirrorReport, OutboundMessage,
};
use groundstation_core::{
    CancellationToken, ConfigurationStore, EngineConfig, FailuresToEmail, FailuresToMqtt,
    GroundStationConfig, InstructionOutcome, InstructionStatus, Result, SendToMqtt,
    SequenceItem, TriggerEngine, WaitForCooledMirror,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Channel that prints every protocol step
struct ConsoleConnector {
    kind: ChannelKind,
}

struct ConsoleSession {
    kind: ChannelKind,
}

#[async_trait::async_trait]
impl ChannelConnector for ConsoleConnector {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChannelSession>> {
        println!("[{}] connect {}:{}", self.kind.as_str(), endpoint.host, endpoint.port);
        Ok(Box::new(ConsoleSession { kind: self.kind }))
    }
}

#[async_trait::async_trait]
impl ChannelSession for ConsoleSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        println!("[{}] authenticate {}", self.kind.as_str(), credentials.username);
        Ok(())
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        match message {
            OutboundMessage::Mail(mail) => {
                println!("[email] to {}: {}\n{}", mail.to, mail.subject, mail.body)
            }
            OutboundMessage::Publish(publish) => {
                println!("[mqtt] {} <- {}", publish.topic, publish.payload)
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        println!("[{}] disconnect", self.kind.as_str());
        Ok(())
    }

    fn abort(&mut self) {
        println!("[{}] abort", self.kind.as_str());
    }
}

/// Mirror that cools by one degree per sample
struct CoolingMirror {
    samples: AtomicU32,
}

#[async_trait::async_trait]
impl MirrorProbe for CoolingMirror {
    async fn sample(&self, _endpoint: &DeviceEndpoint) -> Result<MirrorReport> {
        let n = self.samples.fetch_add(1, Ordering::SeqCst);
        let report = MirrorReport {
            primary: Some(16.0 - f64::from(n)),
            delta_t_ambient: Some(10.0),
            efa_ambient: None,
        };
        println!("[pwi3] primary {:?} ambient {:?}", report.primary, report.delta_t_ambient);
        Ok(report)
    }

    fn probe_name(&self) -> &'static str {
        "cooling-mirror"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded groundstation-core Example ===\n");

    let config = GroundStationConfig::from_json(
        r#"{
            "email": {
                "from_address": "scope@example.org",
                "default_recipients": "observer@example.org",
                "host": "mail.example.org"
            },
            "mqtt": {
                "host": "broker.local",
                "default_topic": "observatory/failures"
            },
            "pwi3": { "client_id": "demo" }
        }"#,
    )?;
    let store = Arc::new(ConfigurationStore::from_config(&config));
    let cancel = CancellationToken::new();

    let email: Arc<dyn ChannelConnector> = Arc::new(ConsoleConnector {
        kind: ChannelKind::Email,
    });
    let mqtt: Arc<dyn ChannelConnector> = Arc::new(ConsoleConnector {
        kind: ChannelKind::Mqtt,
    });

    println!("1. Building trigger engine...");
    let (mut engine, mut events) = TriggerEngine::new(&EngineConfig::default())?;
    engine.add_trigger(Box::new(FailuresToEmail::new(&store, email)));
    engine.add_trigger(Box::new(FailuresToMqtt::new(&store, mqtt.clone())));
    println!("   triggers valid: {}", engine.validate_all());

    println!("\n2. Reporting a failed slew...");
    let failed = InstructionOutcome::failed("Slew")
        .with_description("Slew the mount to the target coordinates")
        .with_attempts(3)
        .with_issue("timeout");
    let next = InstructionOutcome::new("Center", InstructionStatus::Pending);
    let runs = engine
        .after_instruction(Some(&failed), Some(&next), &cancel)
        .await;
    println!("   {} trigger(s) fired", runs.len());

    while let Ok(event) = events.try_recv() {
        println!("[event] {:?}", event);
    }

    println!("\n3. Publishing a freeform message...");
    let publish = SendToMqtt::new(&store, mqtt).with_payload("Imaging session started");
    publish.execute(&cancel).await?;

    println!("\n4. Waiting for the mirror to cool...");
    let wait = WaitForCooledMirror::new(
        &store,
        Arc::new(CoolingMirror {
            samples: AtomicU32::new(0),
        }),
    )
    .with_poll_interval(Duration::from_millis(50));
    wait.execute(&cancel).await?;

    println!("\n=== Embedding Successful ===");
    Ok(())
}
