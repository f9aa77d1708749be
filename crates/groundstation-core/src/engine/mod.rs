//! Trigger engine
//!
//! The TriggerEngine is the host-side driver for a set of triggers:
//! - Validating every trigger before a run and after settings changes
//! - Evaluating every trigger after each completed instruction
//! - Executing the triggers that fire
//! - Reporting what happened on a bounded event channel
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ host sequencer   │─── (previous, next) ───┐
//! └──────────────────┘                        │
//!                                             ▼
//!                                    ┌────────────────┐
//!                                    │ TriggerEngine  │
//!                                    └────────────────┘
//!                                             │
//!         ┌───────────────────────────────────┼──────────────────────┐
//!         │                                   │                      │
//!         ▼                                   ▼                      ▼
//! ┌────────────────┐               ┌──────────────────┐      ┌─────────────┐
//! │ should_trigger │──── true ────▶│ execute          │      │   Events    │
//! │ (evaluate)     │               │ (deliver)        │      │  (notify)   │
//! └────────────────┘               └──────────────────┘      └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Host reports a completed instruction
//! 2. Each trigger evaluates the previous/next pair
//! 3. Firing triggers execute once, in registration order
//! 4. Failures are reported; nothing is retried

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::instruction::InstructionOutcome;
use crate::settings::ConfigurationStore;
use crate::traits::SequenceTrigger;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events emitted by the TriggerEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A trigger failed validation
    ValidationFailed {
        trigger: String,
        issues: Vec<String>,
    },

    /// A trigger decided to fire
    TriggerFired {
        trigger: String,
        instruction: String,
    },

    /// A fired trigger delivered its notification
    NotificationSent {
        trigger: String,
    },

    /// A fired trigger failed to deliver
    NotificationFailed {
        trigger: String,
        error: String,
    },
}

/// Outcome of one fired trigger
#[derive(Debug)]
pub struct TriggerRun {
    /// Kind identifier of the trigger
    pub trigger: String,
    /// Result of its `execute`
    pub result: Result<()>,
}

/// Host-side trigger driver
///
/// ## Lifecycle
///
/// 1. Create with [`TriggerEngine::new()`]
/// 2. Add triggers with [`TriggerEngine::add_trigger()`]
/// 3. Call [`TriggerEngine::validate_all()`] before the run
/// 4. Call [`TriggerEngine::after_instruction()`] after every instruction
///
/// ## Load Resistance
///
/// - **Bounded event channel**: Prevents unbounded memory growth
/// - **Event dropping**: When the channel is full, new events are dropped (logged)
/// - **No retry**: A failed delivery is reported once
pub struct TriggerEngine {
    /// Triggers in evaluation order
    triggers: Vec<Box<dyn SequenceTrigger>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl TriggerEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(config: &EngineConfig) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        if config.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be at least 1"));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            triggers: Vec::new(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    pub fn add_trigger(&mut self, trigger: Box<dyn SequenceTrigger>) {
        debug!("Adding trigger {}", trigger);
        self.triggers.push(trigger);
    }

    pub fn triggers(&self) -> &[Box<dyn SequenceTrigger>] {
        &self.triggers
    }

    /// Validate every trigger
    ///
    /// # Returns
    ///
    /// `true` if no trigger reported issues
    pub fn validate_all(&mut self) -> bool {
        let mut all_valid = true;

        for trigger in &mut self.triggers {
            if trigger.validate() {
                continue;
            }

            all_valid = false;
            let issues = trigger.issues().to_vec();
            warn!("{} has issues: {}", trigger, issues.join(", "));

            let event = EngineEvent::ValidationFailed {
                trigger: trigger.kind().to_string(),
                issues,
            };
            emit_event(&self.event_tx, event);
        }

        all_valid
    }

    /// Evaluate and run every trigger for a completed instruction
    ///
    /// Every trigger sees the same pair. Triggers that fire execute in
    /// order; a failure does not stop the remaining triggers, but
    /// cancellation does.
    ///
    /// # Returns
    ///
    /// One [`TriggerRun`] per trigger that fired
    pub async fn after_instruction(
        &mut self,
        previous: Option<&InstructionOutcome>,
        next: Option<&InstructionOutcome>,
        cancel: &CancellationToken,
    ) -> Vec<TriggerRun> {
        let mut runs = Vec::new();

        for trigger in &mut self.triggers {
            if !trigger.should_trigger(previous, next) {
                continue;
            }

            let kind = trigger.kind().to_string();
            let instruction = previous.map(|p| p.name.clone()).unwrap_or_default();
            info!("{} fired for \"{}\"", trigger, instruction);
            emit_event(
                &self.event_tx,
                EngineEvent::TriggerFired {
                    trigger: kind.clone(),
                    instruction,
                },
            );

            let result = trigger.execute(cancel).await;
            let event = match &result {
                Ok(()) => EngineEvent::NotificationSent {
                    trigger: kind.clone(),
                },
                Err(e) => EngineEvent::NotificationFailed {
                    trigger: kind.clone(),
                    error: e.to_string(),
                },
            };
            emit_event(&self.event_tx, event);

            let cancelled = result.as_ref().err().is_some_and(Error::is_cancelled);
            runs.push(TriggerRun {
                trigger: kind,
                result,
            });

            if cancelled {
                debug!("Cancelled, skipping remaining triggers");
                break;
            }
        }

        runs
    }

    /// Re-validate every trigger whenever a setting changes
    ///
    /// Runs until `cancel` fires.
    pub async fn revalidate_on_change(
        &mut self,
        store: &ConfigurationStore,
        cancel: &CancellationToken,
    ) {
        let mut changes = store.watch();

        loop {
            tokio::select! {
                Some(change) = changes.next() => {
                    debug!("Setting {} changed, revalidating", change.key);
                    self.validate_all();
                }

                _ = cancel.cancelled() => {
                    info!("Stopped watching settings");
                    break;
                }
            }
        }
    }
}

/// Emit an engine event
///
/// Logs a warning and drops the event if the channel is full.
fn emit_event(event_tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if event_tx.try_send(event).is_err() {
        warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
    }
}
