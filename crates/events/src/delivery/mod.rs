//! Transports behind the [`Notifier`](crate::notifier::Notifier) seam.

pub mod email;
