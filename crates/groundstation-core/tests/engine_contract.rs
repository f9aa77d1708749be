//! Contract Test: Trigger Engine
//!
//! Constraints verified:
//! - Every trigger evaluates the same previous/next pair
//! - Only firing triggers execute, each exactly once (no retry)
//! - One trigger's failure does not stop the others
//! - Events report firing, delivery and validation problems
//! - A full event channel drops events instead of blocking
//!
//! If this test fails, the engine can lose or duplicate notifications.

mod common;

use common::*;
use groundstation_core::traits::ChannelKind;
use groundstation_core::{
    CancellationToken, EngineConfig, EngineEvent, FailuresToEmail, FailuresToMqtt,
    GroundStationConfig, InstructionOutcome, InstructionStatus, PluginRegistry, TriggerEngine,
};
use std::sync::Arc;
use std::time::Duration;

fn engine_with_both(
    email: &RecordingConnector,
    mqtt: &RecordingConnector,
    capacity: usize,
) -> (TriggerEngine, tokio::sync::mpsc::Receiver<EngineEvent>) {
    let config = EngineConfig {
        event_channel_capacity: capacity,
    };
    let (mut engine, rx) = TriggerEngine::new(&config).expect("engine construction succeeds");
    engine.add_trigger(Box::new(FailuresToEmail::new(&email_store(), Arc::new(email.clone()))));
    engine.add_trigger(Box::new(FailuresToMqtt::new(&mqtt_store(), Arc::new(mqtt.clone()))));
    (engine, rx)
}

#[tokio::test]
async fn failure_fires_every_other_channel_once() {
    let email = RecordingConnector::new(ChannelKind::Email);
    let mqtt = RecordingConnector::new(ChannelKind::Mqtt);
    let (mut engine, mut rx) = engine_with_both(&email, &mqtt, 16);

    let failed = InstructionOutcome::failed("Slew").with_attempts(2);
    let runs = engine
        .after_instruction(Some(&failed), None, &CancellationToken::new())
        .await;

    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.result.is_ok()));
    assert_eq!(email.sent().len(), 1);
    assert_eq!(mqtt.sent().len(), 1);

    assert_eq!(
        rx.recv().await,
        Some(EngineEvent::TriggerFired {
            trigger: "failures_to_email".to_string(),
            instruction: "Slew".to_string(),
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(EngineEvent::NotificationSent {
            trigger: "failures_to_email".to_string(),
        })
    );
}

#[tokio::test]
async fn own_channel_failure_fires_only_the_other_channel() {
    let email = RecordingConnector::new(ChannelKind::Email);
    let mqtt = RecordingConnector::new(ChannelKind::Mqtt);
    let (mut engine, _rx) = engine_with_both(&email, &mqtt, 16);

    let failed = InstructionOutcome::failed("Send to MQTT");
    let runs = engine
        .after_instruction(Some(&failed), None, &CancellationToken::new())
        .await;

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, "failures_to_email");
    assert!(mqtt.steps().is_empty());
}

#[tokio::test]
async fn success_fires_nothing() {
    let email = RecordingConnector::new(ChannelKind::Email);
    let mqtt = RecordingConnector::new(ChannelKind::Mqtt);
    let (mut engine, _rx) = engine_with_both(&email, &mqtt, 16);

    let done = InstructionOutcome::new("Slew", InstructionStatus::Succeeded);
    let runs = engine
        .after_instruction(Some(&done), None, &CancellationToken::new())
        .await;

    assert!(runs.is_empty());
    assert!(email.steps().is_empty());
    assert!(mqtt.steps().is_empty());
}

#[tokio::test]
async fn one_failure_does_not_stop_the_next_trigger_and_is_not_retried() {
    let email = RecordingConnector::new(ChannelKind::Email);
    email.fail_at(Stage::Connect, Fault::Refused);
    let mqtt = RecordingConnector::new(ChannelKind::Mqtt);
    let (mut engine, mut rx) = engine_with_both(&email, &mqtt, 16);

    let failed = InstructionOutcome::failed("Slew");
    let runs = engine
        .after_instruction(Some(&failed), None, &CancellationToken::new())
        .await;

    assert!(runs[0].result.is_err());
    assert!(runs[1].result.is_ok());
    assert_eq!(email.endpoints().len(), 1);

    let _fired = rx.recv().await;
    match rx.recv().await {
        Some(EngineEvent::NotificationFailed { trigger, error }) => {
            assert_eq!(trigger, "failures_to_email");
            assert!(error.contains("mail.example.org:587"));
        }
        other => panic!("expected NotificationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn full_event_channel_drops_instead_of_blocking() {
    let email = RecordingConnector::new(ChannelKind::Email);
    let mqtt = RecordingConnector::new(ChannelKind::Mqtt);
    let (mut engine, mut rx) = engine_with_both(&email, &mqtt, 1);

    let failed = InstructionOutcome::failed("Slew");
    let runs = tokio::time::timeout(
        Duration::from_secs(5),
        engine.after_instruction(Some(&failed), None, &CancellationToken::new()),
    )
    .await
    .expect("engine must not block on a full event channel");

    assert_eq!(runs.len(), 2);
    assert!(rx.recv().await.is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn validation_problems_are_reported() {
    let registry = PluginRegistry::new();
    registry.register_builtin();
    registry.register_channel(Arc::new(RecordingConnector::new(ChannelKind::Mqtt)));

    let store = Arc::new(groundstation_core::ConfigurationStore::from_config(
        &GroundStationConfig::default(),
    ));
    let trigger = registry
        .create_trigger("failures_to_mqtt", &store)
        .unwrap_or_else(|e| panic!("create failed: {e}"));

    let (mut engine, mut rx) = TriggerEngine::new(&EngineConfig::default()).unwrap();
    engine.add_trigger(trigger);

    assert!(!engine.validate_all());
    match rx.recv().await {
        Some(EngineEvent::ValidationFailed { trigger, issues }) => {
            assert_eq!(trigger, "failures_to_mqtt");
            assert_eq!(issues[0], "MQTT broker hostname or IP not configured");
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn settings_change_triggers_revalidation() {
    let store = mqtt_store();
    let (mut engine, mut rx) = TriggerEngine::new(&EngineConfig::default()).unwrap();
    engine.add_trigger(Box::new(FailuresToMqtt::new(
        &store,
        Arc::new(RecordingConnector::new(ChannelKind::Mqtt)),
    )));

    let cancel = CancellationToken::new();
    let watcher_store = store.clone();
    let watcher_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        engine
            .revalidate_on_change(&watcher_store, &watcher_cancel)
            .await;
    });

    // Let the watcher subscribe before changing anything
    tokio::time::sleep(Duration::from_millis(20)).await;
    store
        .set(
            groundstation_core::SettingKey::MqttBrokerHost,
            groundstation_core::SettingValue::Text(String::new()),
        )
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("revalidation event arrives");
    assert!(matches!(event, Some(EngineEvent::ValidationFailed { .. })));

    cancel.cancel();
    watcher.await.unwrap();
}
