//! Notification payloads
//!
//! Payloads are built fresh for each firing and never retained.
//!
//! - Email: plain-text subject and body
//! - Broker: a JSON [`FailureReport`]

use crate::instruction::InstructionOutcome;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Value of the `X-Mailer` header on failure emails
pub const MAILER: &str = "NINA";

/// One issue reported by the failed instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub reason: String,
}

/// JSON body published to the broker when an instruction fails
///
/// Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub name: String,
    pub description: String,
    pub attempts: u32,
    pub error_list: Vec<ErrorItem>,
}

impl FailureReport {
    /// Build from the failed instruction's own issues
    pub fn from_outcome(outcome: &InstructionOutcome) -> Self {
        Self {
            name: outcome.name.clone(),
            description: outcome.description.clone(),
            attempts: outcome.attempts,
            error_list: outcome
                .issues
                .iter()
                .map(|reason| ErrorItem {
                    reason: reason.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Subject line of a failure email
pub fn email_subject(failed: &InstructionOutcome) -> String {
    format!("Failure running {}!", failed.name)
}

/// Body of a failure email
///
/// The timestamp is passed in so callers control the clock.
pub fn email_body<Tz>(
    failed: &InstructionOutcome,
    next: Option<&InstructionOutcome>,
    now: &DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut body = format!(
        "Time: {}\nStatus: \"{}\" did not complete successfully after {} attempts!",
        now.format("%Y-%m-%d %H:%M:%S"),
        failed.name,
        failed.attempts
    );

    if let Some(next) = next {
        body.push_str(&format!("\nFollowing instruction: \"{}\"", next.name));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionStatus;
    use chrono::Utc;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn subject_names_failed_instruction() {
        let failed = InstructionOutcome::failed("Center After Drift");
        assert_eq!(email_subject(&failed), "Failure running Center After Drift!");
    }

    #[test]
    fn body_without_next_instruction() {
        let failed = InstructionOutcome::failed("Slew").with_attempts(2);
        assert_eq!(
            email_body(&failed, None, &noon()),
            "Time: 2024-03-09 12:00:00\nStatus: \"Slew\" did not complete successfully after 2 attempts!"
        );
    }

    #[test]
    fn body_mentions_following_instruction() {
        let failed = InstructionOutcome::failed("Slew").with_attempts(1);
        let next = InstructionOutcome::new("Take Exposure", InstructionStatus::Pending);
        let body = email_body(&failed, Some(&next), &noon());
        assert!(body.ends_with("\nFollowing instruction: \"Take Exposure\""));
    }

    #[test]
    fn report_without_issues_has_empty_error_list() {
        let report = FailureReport::from_outcome(&InstructionOutcome::failed("Park"));
        assert_eq!(
            report.to_json().unwrap(),
            r#"{"name":"Park","description":"","attempts":0,"error_list":[]}"#
        );
    }
}
