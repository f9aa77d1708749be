//! Failure triggers
//!
//! A failure trigger fires after an instruction that ended in
//! [`InstructionStatus::Failed`](crate::instruction::InstructionStatus),
//! unless that instruction belongs to the trigger's own channel.
//!
//! - [`FailuresToEmail`]: plain-text email over SMTP
//! - [`FailuresToMqtt`]: JSON report published to an MQTT broker

pub mod email;
pub mod mqtt;

pub use email::FailuresToEmail;
pub use mqtt::FailuresToMqtt;

use crate::instruction::InstructionOutcome;
use crate::traits::ChannelKind;
use tracing::debug;

/// Firing decision shared by every failure trigger
///
/// Holds only the most recent previous/next pair; each evaluation
/// overwrites both.
#[derive(Debug, Clone)]
pub struct FailureWatch {
    channel: ChannelKind,
    previous: Option<InstructionOutcome>,
    next: Option<InstructionOutcome>,
}

impl FailureWatch {
    pub fn new(channel: ChannelKind) -> Self {
        Self {
            channel,
            previous: None,
            next: None,
        }
    }

    /// Cache the pair and decide whether to fire
    pub fn evaluate(
        &mut self,
        previous: Option<&InstructionOutcome>,
        next: Option<&InstructionOutcome>,
    ) -> bool {
        self.previous = previous.cloned();
        self.next = next.cloned();

        let Some(previous) = previous else {
            debug!("{}: Previous item is absent, not firing", self.channel);
            return false;
        };

        if !previous.is_failed() {
            debug!(
                "{}: Previous item \"{}\" did not fail, not firing",
                self.channel, previous.name
            );
            return false;
        }

        let identifier = self.channel.self_identifier();
        if previous.name.to_lowercase().contains(identifier) {
            debug!(
                "{}: Previous item \"{}\" belongs to this channel, not firing",
                self.channel, previous.name
            );
            return false;
        }

        debug!(
            "{}: Previous item \"{}\" failed with {} issues, firing",
            self.channel,
            previous.name,
            previous.issues.len()
        );
        true
    }

    /// Outcome cached by the last evaluation
    pub fn previous(&self) -> Option<&InstructionOutcome> {
        self.previous.as_ref()
    }

    /// Following instruction cached by the last evaluation
    pub fn next(&self) -> Option<&InstructionOutcome> {
        self.next.as_ref()
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionStatus;

    #[test]
    fn absent_previous_never_fires() {
        let mut watch = FailureWatch::new(ChannelKind::Mqtt);
        let next = InstructionOutcome::new("Slew", InstructionStatus::Pending);
        assert!(!watch.evaluate(None, Some(&next)));
        assert!(watch.previous().is_none());
        assert_eq!(watch.next(), Some(&next));
    }

    #[test]
    fn evaluation_overwrites_cached_next() {
        let mut watch = FailureWatch::new(ChannelKind::Email);
        let failed = InstructionOutcome::failed("Slew");
        let next = InstructionOutcome::new("Expose", InstructionStatus::Pending);

        assert!(watch.evaluate(Some(&failed), Some(&next)));
        assert!(watch.evaluate(Some(&failed), None));
        assert!(watch.next().is_none());
    }

    #[test]
    fn self_exclusion_is_case_insensitive() {
        let mut watch = FailureWatch::new(ChannelKind::Email);
        assert!(!watch.evaluate(Some(&InstructionOutcome::failed("Send EMAIL report")), None));
        assert!(watch.evaluate(Some(&InstructionOutcome::failed("Send to MQTT")), None));
    }
}
