//! Configuration checks shared by triggers and items
//!
//! Each function returns the complete, ordered issue list for its inputs.
//! Callers replace their previous list with the result; nothing is patched.

use crate::settings::{EmailSettings, MqttSettings};
use crate::traits::{SensorInfo, SensorRole};

/// Temperature some focusers report when they have no sensor fitted
pub const FOCUSER_NO_SENSOR_TEMPERATURE: f64 = -127.0;

/// Ordered issue accumulator
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Vec<String>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` when `failed` holds
    pub fn check(&mut self, failed: bool, message: &str) -> &mut Self {
        if failed {
            self.issues.push(message.to_string());
        }
        self
    }

    /// Record `message` when `value` is empty or whitespace
    pub fn require(&mut self, value: &str, message: &str) -> &mut Self {
        self.check(value.trim().is_empty(), message)
    }

    pub fn finish(&mut self) -> Vec<String> {
        std::mem::take(&mut self.issues)
    }
}

/// Issues for an email trigger
pub fn email_issues(recipient: &str, settings: &EmailSettings) -> Vec<String> {
    IssueCollector::new()
        .require(recipient, "Email recipient is missing")
        .require(&settings.from_address, "Email from address is missing")
        .require(&settings.host, "SMTP server is not configured")
        .check(settings.port < 1, "SMTP port is invalid")
        .finish()
}

/// Issues for a broker publish to `topic`
pub fn broker_issues(topic: &str, settings: &MqttSettings) -> Vec<String> {
    IssueCollector::new()
        .require(&settings.host, "MQTT broker hostname or IP not configured")
        .require(&settings.client_id, "MQTT client ID is invalid!")
        .require(topic, "MQTT topic is missing")
        .finish()
}

/// Issues for a wait's allowed mirror-over-ambient difference
pub fn threshold_issues(max_ambient_delta_t: f64) -> Vec<String> {
    IssueCollector::new()
        .check(
            !max_ambient_delta_t.is_finite(),
            "Maximum ambient delta T must be a finite number",
        )
        .finish()
}

/// Issues for an ambient temperature read from a device
pub fn sensor_issues(role: SensorRole, info: &SensorInfo) -> Vec<String> {
    let mut issues = IssueCollector::new();

    match role {
        SensorRole::Focuser => {
            if !info.connected {
                issues.check(true, "Focuser is not connected");
            } else {
                issues.check(
                    !info.temperature.is_finite() || is_no_sensor(info.temperature),
                    "Temperature is not available",
                );
            }
        }
        SensorRole::Weather => {
            if !info.connected {
                issues.check(true, "Weather source is not connected");
            } else {
                issues.check(!info.temperature.is_finite(), "Temperature is not available");
            }
        }
    }

    issues.finish()
}

fn is_no_sensor(temperature: f64) -> bool {
    (temperature - FOCUSER_NO_SENSOR_TEMPERATURE).abs() < f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_email() -> EmailSettings {
        EmailSettings {
            from_address: "scope@example.org".to_string(),
            default_recipients: String::new(),
            host: "mail.example.org".to_string(),
            port: 587,
            username: String::new(),
            password: Default::default(),
        }
    }

    #[test]
    fn complete_email_settings_have_no_issues() {
        assert!(email_issues("me@example.org", &configured_email()).is_empty());
    }

    #[test]
    fn email_issues_are_ordered() {
        let settings = EmailSettings {
            port: 0,
            ..Default::default()
        };
        assert_eq!(
            email_issues("  ", &settings),
            vec![
                "Email recipient is missing",
                "Email from address is missing",
                "SMTP server is not configured",
                "SMTP port is invalid",
            ]
        );
    }

    #[test]
    fn broker_topic_checked_last() {
        let settings = MqttSettings {
            host: "broker".to_string(),
            client_id: "gs".to_string(),
            ..Default::default()
        };
        assert_eq!(broker_issues("", &settings), vec!["MQTT topic is missing"]);
    }

    #[test]
    fn threshold_must_be_finite() {
        assert!(threshold_issues(3.0).is_empty());
        assert!(threshold_issues(-1.5).is_empty());
        assert_eq!(threshold_issues(f64::NAN).len(), 1);
        assert_eq!(threshold_issues(f64::INFINITY).len(), 1);
    }

    #[test]
    fn focuser_sentinel_is_unavailable() {
        assert_eq!(
            sensor_issues(SensorRole::Focuser, &SensorInfo::reading(-127.0)),
            vec!["Temperature is not available"]
        );
        assert!(sensor_issues(SensorRole::Focuser, &SensorInfo::reading(-12.5)).is_empty());
    }

    #[test]
    fn focuser_nan_is_unavailable() {
        assert_eq!(
            sensor_issues(SensorRole::Focuser, &SensorInfo::reading(f64::NAN)),
            vec!["Temperature is not available"]
        );
    }

    #[test]
    fn disconnected_devices_report_connection_only() {
        assert_eq!(
            sensor_issues(SensorRole::Focuser, &SensorInfo::disconnected()),
            vec!["Focuser is not connected"]
        );
        assert_eq!(
            sensor_issues(SensorRole::Weather, &SensorInfo::disconnected()),
            vec!["Weather source is not connected"]
        );
    }

    #[test]
    fn weather_sentinel_is_a_real_reading() {
        assert!(sensor_issues(SensorRole::Weather, &SensorInfo::reading(-127.0)).is_empty());
    }
}
