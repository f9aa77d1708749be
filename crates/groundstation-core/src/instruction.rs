//! Instruction outcomes supplied by the host sequencer
//!
//! An [`InstructionOutcome`] is an immutable snapshot of one sequence step
//! at the moment the host asks a trigger to evaluate it.

use serde::{Deserialize, Serialize};

/// Execution status of a sequence instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstructionStatus::Pending => "pending",
            InstructionStatus::Running => "running",
            InstructionStatus::Succeeded => "succeeded",
            InstructionStatus::Failed => "failed",
            InstructionStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Snapshot of a sequence instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionOutcome {
    /// Display name of the instruction
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Number of attempts made so far
    #[serde(default)]
    pub attempts: u32,
    /// Current status
    pub status: InstructionStatus,
    /// Issues reported by the instruction, in order
    #[serde(default)]
    pub issues: Vec<String>,
}

impl InstructionOutcome {
    /// Create an outcome with no description, attempts or issues
    pub fn new(name: impl Into<String>, status: InstructionStatus) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            attempts: 0,
            status,
            issues: Vec::new(),
        }
    }

    /// Shorthand for a failed instruction
    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, InstructionStatus::Failed)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issues.extend(issues.into_iter().map(Into::into));
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == InstructionStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_issues_in_order() {
        let outcome = InstructionOutcome::failed("Slew")
            .with_attempts(3)
            .with_issue("timeout")
            .with_issues(["mount not parked"]);

        assert!(outcome.is_failed());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.issues, vec!["timeout", "mount not parked"]);
    }

    #[test]
    fn status_deserializes_snake_case() {
        let outcome: InstructionOutcome =
            serde_json::from_str(r#"{"name":"Slew","status":"failed"}"#).unwrap();
        assert_eq!(outcome.status, InstructionStatus::Failed);
        assert!(outcome.issues.is_empty());
    }
}
