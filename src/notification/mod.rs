//! Outbound notifications
//!
//! The core never waits on delivery. Messages are handed to a
//! [`NotificationDispatcher`], whose background worker calls the configured
//! [`Notifier`] and reports failures on a separate channel.

mod dispatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use dispatcher::{NotificationDispatcher, NotificationFailure};

/// Template sent to a freshly registered account
pub const USER_WELCOME_TEMPLATE: &str = "user_welcome";

/// A message for one recipient, rendered by the transport from `template`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub template: String,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, template: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            recipient: recipient.into(),
            template: template.into(),
            data,
        }
    }
}

/// Notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Transport that only records messages in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            template = %notification.template,
            "Notification sent"
        );
        Ok(())
    }
}
