//! The notification channel used to reach the client.
//!
//! Delivery failures are reported to the caller but never roll back
//! pipeline state; the orchestrator logs them and moves on.

use async_trait::async_trait;
use serde::Serialize;

use crate::delivery::email::EmailError;

/// One message to a client: recipient, template and template data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub to: String,
    pub template_id: String,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(to: impl Into<String>, template_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            to: to.into(),
            template_id: template_id.into(),
            data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No delivery channel is configured.
    #[error("Notifications are disabled")]
    Disabled,

    #[error("Unknown notification template '{0}'")]
    UnknownTemplate(String),

    /// Template data is missing a field the template needs.
    #[error("Template '{template}' requires '{field}'")]
    MissingField {
        template: &'static str,
        field: &'static str,
    },

    #[error(transparent)]
    Email(#[from] EmailError),
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier used when no mail server is configured.
///
/// Every send fails with [`NotifyError::Disabled`] so callers record the
/// message as undelivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notification.to,
            template = %notification.template_id,
            "Notifications disabled, message not sent",
        );
        Err(NotifyError::Disabled)
    }
}
