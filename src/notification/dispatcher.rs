//! Background delivery worker

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{Notification, Notifier};

/// A message the transport could not deliver
#[derive(Debug, Clone)]
pub struct NotificationFailure {
    pub notification: Notification,
    pub reason: String,
}

/// Fire-and-forget handle onto the delivery worker
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the worker on the current runtime
    ///
    /// The returned receiver yields every failed delivery; dropping it is fine.
    pub fn spawn(
        notifier: Arc<dyn Notifier>,
        capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<NotificationFailure>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(notifier, rx, failures_tx));

        (Self { tx }, failures_rx)
    }

    /// Queue `notification` without waiting; drops it when the queue is full
    pub fn dispatch(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    recipient = %dropped.recipient,
                    template = %dropped.template,
                    "Notification queue full, dropping message"
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::warn!(
                    recipient = %dropped.recipient,
                    template = %dropped.template,
                    "Notification worker stopped, dropping message"
                );
            }
        }
    }
}

async fn run_worker(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::Receiver<Notification>,
    failures: mpsc::UnboundedSender<NotificationFailure>,
) {
    tracing::debug!("Notification worker started");

    while let Some(notification) = rx.recv().await {
        let notifier = Arc::clone(&notifier);
        let message = notification.clone();

        // A panicking transport only takes down its own task
        let outcome = tokio::spawn(async move { notifier.send(&message).await }).await;

        let reason = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{:#}", e),
            Err(join_err) if join_err.is_panic() => "notifier panicked".to_string(),
            Err(join_err) => join_err.to_string(),
        };

        tracing::error!(
            recipient = %notification.recipient,
            template = %notification.template,
            reason = %reason,
            "Failed to deliver notification"
        );
        let _ = failures.send(NotificationFailure {
            notification,
            reason,
        });
    }

    tracing::debug!("Notification worker stopped");
}
