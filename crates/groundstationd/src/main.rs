// # groundstationd - Ground Station Runner
//
// A thin command-line host for the ground station library. It runs exactly
// one action and exits:
//
// - `send-mqtt`: publish a freeform retained message to the broker
// - `report-failure`: feed a failed instruction to the email and MQTT
//   failure triggers, as a sequencer would after a failed step
// - `wait-cooled-mirror`: poll the PWI3 controller until the primary mirror
//   is within the allowed difference from ambient
//
// CRITICAL RULES:
// - This is a THIN integration layer ONLY
// - DO NOT add notification, polling or retry logic here
// - All of that MUST be in groundstation-core
//
// ## Configuration
//
// A JSON file may seed the settings; environment variables override it.
//
// ### General
// - `GS_CONFIG_FILE`: Path to a JSON configuration file (optional)
// - `GS_ACTION`: One of send-mqtt, report-failure, wait-cooled-mirror
// - `GS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ### Email
// - `GS_SMTP_HOST`, `GS_SMTP_PORT`, `GS_SMTP_USERNAME`, `GS_SMTP_PASSWORD`
// - `GS_SMTP_FROM`: Sender address
// - `GS_SMTP_RECIPIENTS`: Comma-separated default recipients
//
// ### MQTT
// - `GS_MQTT_HOST`, `GS_MQTT_PORT`, `GS_MQTT_USERNAME`, `GS_MQTT_PASSWORD`
// - `GS_MQTT_USE_TLS`: true/false
// - `GS_MQTT_CLIENT_ID`, `GS_MQTT_TOPIC`
//
// ### PWI3
// - `GS_PWI3_ADDRESS`, `GS_PWI3_PORT`, `GS_PWI3_CLIENT_ID`
//
// ### Action inputs
// - `GS_TOPIC`: Topic override for send-mqtt
// - `GS_PAYLOAD`: Message for send-mqtt
// - `GS_INSTRUCTION_NAME`, `GS_INSTRUCTION_DESCRIPTION`, `GS_INSTRUCTION_ATTEMPTS`
// - `GS_INSTRUCTION_ERRORS`: Semicolon-separated error reasons
// - `GS_NEXT_INSTRUCTION`: Name of the following instruction (optional)
// - `GS_AMBIENT_SOURCE`: delta_t, efa, focuser, weather_source
// - `GS_MAX_DELTA_T`: Allowed mirror-over-ambient difference in degrees C
//
// ## Example
//
// ```bash
// export GS_ACTION=report-failure
// export GS_SMTP_HOST=mail.example.org
// export GS_SMTP_FROM=scope@example.org
// export GS_SMTP_RECIPIENTS=observer@example.org
// export GS_MQTT_HOST=broker.local
// export GS_MQTT_TOPIC=observatory/failures
// export GS_INSTRUCTION_NAME=Slew
// export GS_INSTRUCTION_ERRORS="timeout"
//
// groundstationd
// ```

use anyhow::{Context, Result};
use groundstation_core::{
    AmbientTempSource, CancellationToken, ChannelKind, ConfigurationStore, EngineEvent,
    FailuresToEmail, FailuresToMqtt, GroundStationConfig, InstructionOutcome, InstructionStatus,
    PluginRegistry, SendToMqtt, SequenceItem, TriggerEngine, Validatable, WaitForCooledMirror,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum GroundStationExitCode {
    /// Action completed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// The action ran and failed
    ActionFailed = 2,
    /// Interrupted by SIGINT/SIGTERM
    Cancelled = 130,
}

impl From<GroundStationExitCode> for ExitCode {
    fn from(code: GroundStationExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Action selected by `GS_ACTION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    SendMqtt,
    ReportFailure,
    WaitCooledMirror,
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "send-mqtt" => Ok(Action::SendMqtt),
            "report-failure" => Ok(Action::ReportFailure),
            "wait-cooled-mirror" => Ok(Action::WaitCooledMirror),
            other => anyhow::bail!(
                "GS_ACTION '{}' is not supported. \
                Supported actions: send-mqtt, report-failure, wait-cooled-mirror",
                other
            ),
        }
    }
}

/// Runner configuration
struct Config {
    action: Action,
    settings: GroundStationConfig,
    topic: Option<String>,
    payload: String,
    instruction_name: String,
    instruction_description: String,
    instruction_attempts: u32,
    instruction_errors: Vec<String>,
    next_instruction: Option<String>,
    ambient_source: AmbientTempSource,
    max_delta_t: Option<f64>,
    log_level: String,
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is invalid ({}): {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

fn override_string(target: &mut String, name: &str) {
    if let Ok(value) = env::var(name) {
        *target = value;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, name: &str) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(value) = env_parse(name)? {
        *target = value;
    }
    Ok(())
}

fn parse_ambient_source(raw: &str) -> Result<AmbientTempSource> {
    match raw {
        "delta_t" => Ok(AmbientTempSource::DeltaT),
        "efa" => Ok(AmbientTempSource::Efa),
        "focuser" => Ok(AmbientTempSource::Focuser),
        "weather_source" => Ok(AmbientTempSource::WeatherSource),
        other => anyhow::bail!(
            "GS_AMBIENT_SOURCE '{}' is not valid. \
            Valid sources: delta_t, efa, focuser, weather_source",
            other
        ),
    }
}

impl Config {
    /// Load configuration from the optional file and environment variables
    fn from_env() -> Result<Self> {
        let mut settings = match env::var("GS_CONFIG_FILE") {
            Ok(path) => GroundStationConfig::from_file(&path)
                .with_context(|| format!("Failed to load GS_CONFIG_FILE {}", path))?,
            Err(_) => GroundStationConfig::default(),
        };

        override_string(&mut settings.email.host, "GS_SMTP_HOST");
        override_parsed(&mut settings.email.port, "GS_SMTP_PORT")?;
        override_string(&mut settings.email.username, "GS_SMTP_USERNAME");
        override_string(&mut settings.email.password, "GS_SMTP_PASSWORD");
        override_string(&mut settings.email.from_address, "GS_SMTP_FROM");
        override_string(&mut settings.email.default_recipients, "GS_SMTP_RECIPIENTS");

        override_string(&mut settings.mqtt.host, "GS_MQTT_HOST");
        override_parsed(&mut settings.mqtt.port, "GS_MQTT_PORT")?;
        override_parsed(&mut settings.mqtt.use_tls, "GS_MQTT_USE_TLS")?;
        override_string(&mut settings.mqtt.username, "GS_MQTT_USERNAME");
        override_string(&mut settings.mqtt.password, "GS_MQTT_PASSWORD");
        override_string(&mut settings.mqtt.client_id, "GS_MQTT_CLIENT_ID");
        override_string(&mut settings.mqtt.default_topic, "GS_MQTT_TOPIC");

        override_string(&mut settings.pwi3.address, "GS_PWI3_ADDRESS");
        override_parsed(&mut settings.pwi3.port, "GS_PWI3_PORT")?;
        override_string(&mut settings.pwi3.client_id, "GS_PWI3_CLIENT_ID");

        let action = env::var("GS_ACTION")
            .context("GS_ACTION is required. Set it via: export GS_ACTION=report-failure")?
            .parse()?;

        let ambient_source = match env::var("GS_AMBIENT_SOURCE") {
            Ok(raw) => parse_ambient_source(raw.trim())?,
            Err(_) => AmbientTempSource::default(),
        };

        Ok(Self {
            action,
            settings,
            topic: env::var("GS_TOPIC").ok(),
            payload: env::var("GS_PAYLOAD").unwrap_or_default(),
            instruction_name: env::var("GS_INSTRUCTION_NAME").unwrap_or_default(),
            instruction_description: env::var("GS_INSTRUCTION_DESCRIPTION").unwrap_or_default(),
            instruction_attempts: env_parse("GS_INSTRUCTION_ATTEMPTS")?.unwrap_or(1),
            instruction_errors: env::var("GS_INSTRUCTION_ERRORS")
                .unwrap_or_default()
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            next_instruction: env::var("GS_NEXT_INSTRUCTION")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            ambient_source,
            max_delta_t: env_parse("GS_MAX_DELTA_T")?,
            log_level: env::var("GS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate inputs the library cannot check itself
    fn validate(&self) -> Result<()> {
        if self.action == Action::ReportFailure && self.instruction_name.trim().is_empty() {
            anyhow::bail!(
                "GS_INSTRUCTION_NAME is required for report-failure. \
                Set it via: export GS_INSTRUCTION_NAME=Slew"
            );
        }

        if let Some(delta) = self.max_delta_t
            && !delta.is_finite()
        {
            anyhow::bail!("GS_MAX_DELTA_T must be a finite number. Got: {}", delta);
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return GroundStationExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return GroundStationExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GroundStationExitCode::ConfigError.into();
    }

    info!("Starting groundstationd ({:?})", config.action);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GroundStationExitCode::ConfigError.into();
        }
    };

    rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            match wait_for_shutdown().await {
                Ok(signal) => {
                    info!("Received shutdown signal: {}", signal);
                    watcher.cancel();
                }
                Err(e) => warn!("Shutdown signals unavailable: {}", e),
            }
        });

        match run(config, &cancel).await {
            Ok(()) => GroundStationExitCode::Success,
            Err(e) if cancel.is_cancelled() => {
                info!("Action cancelled: {}", e);
                GroundStationExitCode::Cancelled
            }
            Err(e) => {
                error!("Action failed: {:#}", e);
                GroundStationExitCode::ActionFailed
            }
        }
    })
    .into()
}

/// Register every adapter compiled into this binary
fn build_registry() -> Result<PluginRegistry> {
    let registry = PluginRegistry::new();
    registry.register_builtin();

    #[cfg(feature = "smtp")]
    {
        info!("Registering SMTP channel");
        groundstation_smtp::register(&registry);
    }

    #[cfg(feature = "mqtt")]
    {
        info!("Registering MQTT channel");
        groundstation_mqtt::register(&registry);
    }

    #[cfg(feature = "pwi3")]
    {
        info!("Registering PWI3 probe");
        groundstation_pwi3::register(&registry)?;
    }

    Ok(registry)
}

/// Validate an item and log its issues
fn ensure_valid(item: &mut dyn SequenceItem) -> Result<()> {
    if item.validate() {
        return Ok(());
    }

    for issue in item.issues() {
        error!("{}: {}", item.metadata().name, issue);
    }
    anyhow::bail!("{} is not ready to run", item.metadata().name)
}

async fn run(config: Config, cancel: &CancellationToken) -> Result<()> {
    let registry = build_registry()?;
    let store = Arc::new(ConfigurationStore::from_config(&config.settings));

    match config.action {
        Action::SendMqtt => {
            let mut item = SendToMqtt::new(&store, registry.channel(ChannelKind::Mqtt)?)
                .with_payload(config.payload);
            if let Some(topic) = config.topic {
                item.set_topic(topic);
            }

            ensure_valid(&mut item)?;
            item.execute(cancel).await?;
            info!("Published to {}", item.topic());
        }

        Action::ReportFailure => {
            let (mut engine, mut events) = TriggerEngine::new(&config.settings.engine)?;
            engine.add_trigger(Box::new(FailuresToEmail::new(
                &store,
                registry.channel(ChannelKind::Email)?,
            )));
            engine.add_trigger(Box::new(FailuresToMqtt::new(
                &store,
                registry.channel(ChannelKind::Mqtt)?,
            )));

            let reporter = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        EngineEvent::ValidationFailed { trigger, issues } => {
                            warn!("{} is misconfigured: {}", trigger, issues.join("; "))
                        }
                        EngineEvent::TriggerFired {
                            trigger,
                            instruction,
                        } => info!("{} fired for {}", trigger, instruction),
                        EngineEvent::NotificationSent { trigger } => {
                            info!("{} delivered", trigger)
                        }
                        EngineEvent::NotificationFailed { trigger, error } => {
                            warn!("{} failed: {}", trigger, error)
                        }
                    }
                }
            });

            engine.validate_all();

            let failed = InstructionOutcome::failed(config.instruction_name)
                .with_description(config.instruction_description)
                .with_attempts(config.instruction_attempts)
                .with_issues(config.instruction_errors);
            let next = config
                .next_instruction
                .map(|name| InstructionOutcome::new(name, InstructionStatus::Pending));

            let runs = engine
                .after_instruction(Some(&failed), next.as_ref(), cancel)
                .await;

            // Closing the sender lets the reporter drain and finish
            drop(engine);
            if let Err(e) = reporter.await {
                warn!("Event reporter stopped abnormally: {}", e);
            }

            let failures = runs.iter().filter(|r| r.result.is_err()).count();
            if failures > 0 {
                anyhow::bail!("{} of {} notification(s) failed", failures, runs.len());
            }
            info!("{} notification(s) sent", runs.len());
        }

        Action::WaitCooledMirror => {
            let mut item = WaitForCooledMirror::new(&store, registry.probe()?);
            item.set_ambient_source(config.ambient_source);
            if let Some(delta) = config.max_delta_t {
                item.set_max_ambient_delta_t(delta);
            }

            ensure_valid(&mut item)?;
            info!(
                "Waiting for mirror within {:.1} C of {}",
                item.max_ambient_delta_t(),
                item.ambient_source()
            );
            item.execute(cancel).await?;
            info!("Mirror has cooled");
        }
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse() {
        assert_eq!("send-mqtt".parse::<Action>().unwrap(), Action::SendMqtt);
        assert_eq!(
            "report-failure".parse::<Action>().unwrap(),
            Action::ReportFailure
        );
        assert_eq!(
            "wait-cooled-mirror".parse::<Action>().unwrap(),
            Action::WaitCooledMirror
        );
        assert!("reboot".parse::<Action>().is_err());
    }

    #[test]
    fn ambient_sources_parse() {
        assert_eq!(parse_ambient_source("efa").unwrap(), AmbientTempSource::Efa);
        assert_eq!(
            parse_ambient_source("weather_source").unwrap(),
            AmbientTempSource::WeatherSource
        );
        assert!(parse_ambient_source("sky").is_err());
    }
}
