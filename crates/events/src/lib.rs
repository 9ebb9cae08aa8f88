//! Launchpad event bus and client notification channel.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the pipeline's domain event envelope.
//! - [`Notifier`]: the `send(to, template, data)` seam, with an SMTP
//!   implementation ([`EmailNotifier`]) and a [`DisabledNotifier`] used when
//!   no mail server is configured.

pub mod bus;
pub mod delivery;
pub mod notifier;
pub mod templates;

pub use bus::{event_types, EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, EmailError, EmailNotifier};
pub use notifier::{DisabledNotifier, Notification, Notifier, NotifyError};
