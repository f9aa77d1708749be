// # Failures to Email
//
// Sends a plain-text email when a sequence instruction fails.
//
// SMTP settings come from a live snapshot of the configuration store. The
// recipient is per-instance and defaults to the store's default recipients
// at construction.

use super::FailureWatch;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::instruction::InstructionOutcome;
use crate::payload;
use crate::settings::{ConfigurationStore, EmailSettings, LiveSettings};
use crate::traits::{
    ChannelConnector, ChannelKind, Credentials, Endpoint, ItemMetadata, MailMessage,
    OutboundMessage, SequenceTrigger, TransportSecurity, Validatable, GROUND_STATION_CATEGORY,
};
use crate::validation;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Trigger that emails a failure report
pub struct FailuresToEmail {
    metadata: ItemMetadata,
    recipient: String,
    settings: LiveSettings<EmailSettings>,
    connector: Arc<dyn ChannelConnector>,
    watch: FailureWatch,
    issues: Vec<String>,
}

impl FailuresToEmail {
    /// Registry kind identifier
    pub const KIND: &'static str = "failures_to_email";

    pub fn new(store: &Arc<ConfigurationStore>, connector: Arc<dyn ChannelConnector>) -> Self {
        let settings = LiveSettings::<EmailSettings>::attach(store);
        let recipient = settings.snapshot().default_recipients;

        Self {
            metadata: ItemMetadata::new(
                "Failures to Email",
                "Sends an event via email when a sequence instruction fails",
                GROUND_STATION_CATEGORY,
                "Email_SVG",
            ),
            recipient,
            settings,
            connector,
            watch: FailureWatch::new(ChannelKind::Email),
            issues: Vec::new(),
        }
    }

    /// Comma-separated recipient list
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn set_recipient(&mut self, recipient: impl Into<String>) {
        self.recipient = recipient.into();
    }

    /// Current SMTP settings as seen by this instance
    pub fn settings(&self) -> EmailSettings {
        self.settings.snapshot()
    }

    fn endpoint(&self, settings: &EmailSettings) -> Result<Endpoint> {
        let endpoint = Endpoint::new(settings.host.clone(), settings.port)
            .with_security(TransportSecurity::Auto);

        // Authenticate only when both halves are present
        if settings.username.is_empty() || settings.password.is_empty() {
            return Ok(endpoint);
        }

        let password = settings.password.open(self.settings.store().codec())?;
        if password.is_empty() {
            return Ok(endpoint);
        }

        Ok(endpoint.with_credentials(Credentials::new(settings.username.clone(), password)))
    }

    fn message(
        &self,
        settings: &EmailSettings,
        failed: &InstructionOutcome,
        next: Option<&InstructionOutcome>,
    ) -> OutboundMessage {
        OutboundMessage::Mail(MailMessage {
            from: settings.from_address.clone(),
            to: self.recipient.clone(),
            subject: payload::email_subject(failed),
            body: payload::email_body(failed, next, &chrono::Local::now()),
            mailer: payload::MAILER.to_string(),
        })
    }
}

impl Validatable for FailuresToEmail {
    fn validate(&mut self) -> bool {
        self.issues = validation::email_issues(&self.recipient, &self.settings.snapshot());
        self.issues.is_empty()
    }

    fn issues(&self) -> &[String] {
        &self.issues
    }
}

#[async_trait]
impl SequenceTrigger for FailuresToEmail {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    fn should_trigger(
        &mut self,
        previous: Option<&InstructionOutcome>,
        next: Option<&InstructionOutcome>,
    ) -> bool {
        self.watch.evaluate(previous, next)
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        let failed = self
            .watch
            .previous()
            .ok_or_else(|| Error::invalid_input("No failed instruction to report"))?;

        let settings = self.settings.snapshot();
        let message = self.message(&settings, failed, self.watch.next());
        let endpoint = self.endpoint(&settings)?;

        info!("Emailing failure of \"{}\" to {}", failed.name, self.recipient);
        dispatch::deliver(self.connector.as_ref(), &endpoint, &message, cancel).await
    }

    fn clone_boxed(&self) -> Box<dyn SequenceTrigger> {
        Box::new(self.clone())
    }
}

/// Copies metadata and recipient; the clone gets its own subscription and
/// an empty evaluation cache
impl Clone for FailuresToEmail {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            recipient: self.recipient.clone(),
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            watch: FailureWatch::new(ChannelKind::Email),
            issues: Vec::new(),
        }
    }
}

impl std::fmt::Display for FailuresToEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Category: {}, Item: FailuresToEmail", self.metadata.category)
    }
}

impl std::fmt::Debug for FailuresToEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailuresToEmail")
            .field("metadata", &self.metadata)
            .field("recipient", &self.recipient)
            .field("settings", &self.settings)
            .field("issues", &self.issues)
            .finish()
    }
}
