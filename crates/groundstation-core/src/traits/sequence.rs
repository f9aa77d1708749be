// # Sequence Plugin Traits
//
// Interfaces the host sequencer drives. Triggers are re-evaluated after
// every instruction; items are instructions in their own right.
//
// ## Host call order
//
// ```text
// validate() ── before the run and after every settings change
//
// for each completed instruction:
//     should_trigger(previous, next) ──true──▶ execute(cancel)
// ```

use crate::error::Result;
use crate::instruction::InstructionOutcome;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Category shown for notification plugins
pub const GROUND_STATION_CATEGORY: &str = "Ground Station";

/// Category shown for telescope plugins
pub const PLANEWAVE_CATEGORY: &str = "PlaneWave Tools";

/// Display metadata for a trigger or item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Icon resource key
    pub icon: String,
}

impl ItemMetadata {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            icon: icon.into(),
        }
    }
}

/// Something that checks its own configuration
///
/// `validate` recomputes the whole issue list and replaces the previous
/// one. Issues are never raised as errors.
pub trait Validatable {
    /// Recompute issues; `true` iff there are none
    fn validate(&mut self) -> bool;

    /// Issues found by the most recent [`Validatable::validate`]
    fn issues(&self) -> &[String];
}

/// A trigger the host re-evaluates after each instruction
#[async_trait]
pub trait SequenceTrigger: Validatable + Send + Sync + std::fmt::Display {
    /// Stable kind identifier used by the registry
    fn kind(&self) -> &'static str;

    fn metadata(&self) -> &ItemMetadata;

    fn metadata_mut(&mut self) -> &mut ItemMetadata;

    /// Decide whether to fire, caching `previous`/`next` for [`Self::execute`]
    fn should_trigger(
        &mut self,
        previous: Option<&InstructionOutcome>,
        next: Option<&InstructionOutcome>,
    ) -> bool;

    /// Deliver the notification for the cached outcome
    async fn execute(&self, cancel: &CancellationToken) -> Result<()>;

    /// Clone into an independent instance with its own settings subscription
    fn clone_boxed(&self) -> Box<dyn SequenceTrigger>;
}

/// A standalone sequence instruction
#[async_trait]
pub trait SequenceItem: Validatable + Send + Sync + std::fmt::Display {
    /// Stable kind identifier used by the registry
    fn kind(&self) -> &'static str;

    fn metadata(&self) -> &ItemMetadata;

    fn metadata_mut(&mut self) -> &mut ItemMetadata;

    async fn execute(&self, cancel: &CancellationToken) -> Result<()>;

    /// Clone into an independent instance with its own settings subscription
    fn clone_boxed(&self) -> Box<dyn SequenceItem>;
}
