//! Contract Test: Live Settings
//!
//! Constraints verified:
//! - A settings change reaches existing instances without re-creation
//! - A change rewrites only the field named by its key
//! - Clones keep their parameters and own an independent subscription
//! - Dropping an instance releases its subscription
//! - Out-of-order notifications still leave the snapshot at the stored value
//!
//! If this test fails, triggers can act on stale or mixed configuration.

mod common;

use common::*;
use groundstation_core::settings::{
    ConfigurationStore, LiveSettings, MqttSettings, SealedSecret, SettingKey, SettingValue,
};
use groundstation_core::traits::{ChannelKind, SequenceItem, SequenceTrigger, Validatable};
use groundstation_core::{FailuresToEmail, FailuresToMqtt, SendToMqtt};
use std::sync::Arc;
use tokio_stream::StreamExt;

#[test]
fn change_updates_only_the_named_field() {
    let store = mqtt_store();
    let live = LiveSettings::<MqttSettings>::attach(&store);
    let before = live.snapshot();

    store
        .set(SettingKey::MqttBrokerPort, SettingValue::Port(8883))
        .unwrap();

    let after = live.snapshot();
    assert_eq!(after.port, 8883);
    assert_eq!(
        MqttSettings {
            port: before.port,
            ..after
        },
        before
    );
}

#[test]
fn overlapping_writes_leave_snapshot_at_latest_value() {
    let store = mqtt_store();

    // Subscribed first, so it runs before the snapshot's callback. Writing
    // from inside the callback delivers 8883 to the snapshot before the
    // outer notification for 1884 arrives.
    let writer = store.clone();
    let _nested = store.subscribe(&[SettingKey::MqttBrokerPort], move |_, value| {
        if value.as_port() == Some(1884) {
            writer
                .set(SettingKey::MqttBrokerPort, SettingValue::Port(8883))
                .unwrap();
        }
    });
    let live = LiveSettings::<MqttSettings>::attach(&store);

    store
        .set(SettingKey::MqttBrokerPort, SettingValue::Port(1884))
        .unwrap();

    assert_eq!(store.port(SettingKey::MqttBrokerPort), 8883);
    assert_eq!(live.snapshot().port, 8883);
}

#[test]
fn unrelated_channel_changes_are_ignored() {
    let store = mqtt_store();
    let live = LiveSettings::<MqttSettings>::attach(&store);
    let before = live.snapshot();

    store
        .set(SettingKey::SmtpHostName, SettingValue::Text("mail".into()))
        .unwrap();

    assert_eq!(live.snapshot(), before);
}

#[test]
fn existing_trigger_sees_new_settings() {
    let store = email_store();
    let trigger = FailuresToEmail::new(&store, Arc::new(RecordingConnector::new(ChannelKind::Email)));

    store
        .set(SettingKey::SmtpHostName, SettingValue::Text("relay.example.org".into()))
        .unwrap();
    store.set_secret(SettingKey::SmtpPassword, "pw").unwrap();

    let settings = trigger.settings();
    assert_eq!(settings.host, "relay.example.org");
    assert_eq!(settings.password, SealedSecret::from_sealed("pw"));
}

#[test]
fn clone_preserves_parameters_and_metadata() {
    let store = mqtt_store();
    let mut trigger = FailuresToMqtt::new(&store, Arc::new(RecordingConnector::new(ChannelKind::Mqtt)));
    trigger.set_topic("observatory/custom");
    trigger.metadata_mut().name = "Alert dome crew".to_string();
    trigger.metadata_mut().description = "Custom description".to_string();

    let copy = trigger.clone_boxed();
    assert_eq!(copy.metadata(), trigger.metadata());
    assert_eq!(copy.kind(), FailuresToMqtt::KIND);
    assert_eq!(copy.to_string(), "Category: Ground Station, Item: FailuresToMqtt");

    let copy = trigger.clone();
    assert_eq!(copy.topic(), "observatory/custom");
}

#[test]
fn clone_owns_an_independent_subscription() {
    let store = mqtt_store();
    let original = SendToMqtt::new(&store, Arc::new(RecordingConnector::new(ChannelKind::Mqtt)));
    let baseline = store.observer_count();

    let copy = original.clone_boxed();
    assert_eq!(store.observer_count(), baseline + 1);

    drop(original);
    assert_eq!(store.observer_count(), baseline);

    // The copy keeps receiving changes after the original is gone
    store
        .set(SettingKey::MqttClientId, SettingValue::Text(" ".into()))
        .unwrap();
    let mut copy = copy;
    assert!(!copy.validate());
    assert_eq!(copy.issues(), ["MQTT client ID is invalid!"]);
}

#[test]
fn recipient_defaults_from_store_at_construction() {
    let store = email_store();
    let first = FailuresToEmail::new(&store, Arc::new(RecordingConnector::new(ChannelKind::Email)));

    store
        .set(
            SettingKey::SmtpDefaultRecipients,
            SettingValue::Text("night-crew@example.org".into()),
        )
        .unwrap();
    let second = FailuresToEmail::new(&store, Arc::new(RecordingConnector::new(ChannelKind::Email)));

    assert_eq!(first.recipient(), "observer@example.org");
    assert_eq!(second.recipient(), "night-crew@example.org");
}

#[tokio::test]
async fn watch_reports_changes_by_key() {
    let store = Arc::new(ConfigurationStore::new());
    let mut changes = store.watch();

    store
        .set(SettingKey::Pwi3Port, SettingValue::Port(8220))
        .unwrap();
    // Same value again: no second event
    store
        .set(SettingKey::Pwi3Port, SettingValue::Port(8220))
        .unwrap();
    store
        .set(SettingKey::Pwi3ClientId, SettingValue::Text("gs".into()))
        .unwrap();

    let first = changes.next().await.unwrap();
    let second = changes.next().await.unwrap();
    assert_eq!(first.key, SettingKey::Pwi3Port);
    assert_eq!(second.key, SettingKey::Pwi3ClientId);
}
